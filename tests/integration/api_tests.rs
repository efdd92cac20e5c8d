//! API client behavior against a mock aggregator

use crate::common::{product_body, rejected_body, TestEnv};
use aisle_sweep::api::{ApiClient, ApiError, ApiRequest};
use aisle_sweep::retailer::Retailer;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

fn client(env: &TestEnv, retailer: Retailer) -> ApiClient {
    let config = env.config();
    ApiClient::new(
        config.profile_for(retailer),
        config.api_key_for(retailer).unwrap(),
        &config.api,
    )
    .unwrap()
}

fn product_request() -> ApiRequest {
    ApiRequest::Product {
        url: "https://www.homedepot.com/p/item-1/1001".to_string(),
    }
}

async fn request_count(env: &TestEnv) -> usize {
    env.server.received_requests().await.unwrap().len()
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let env = TestEnv::start().await;

    Mock::given(method("GET"))
        .and(path("/request"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&env.server)
        .await;

    Mock::given(method("GET"))
        .and(path("/request"))
        .respond_with(ResponseTemplate::new(200).set_body_json(product_body("Stud", 3.98)))
        .mount(&env.server)
        .await;

    let response = client(&env, Retailer::HomeDepot)
        .request(&product_request())
        .await
        .expect("Request should succeed after retries");

    assert_eq!(response.product().unwrap()["title"], "Stud");
    assert_eq!(request_count(&env).await, 3);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let env = TestEnv::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&env.server)
        .await;

    let result = client(&env, Retailer::HomeDepot)
        .request(&product_request())
        .await;

    match result {
        Err(ApiError::RetriesExhausted {
            status, attempts, ..
        }) => {
            assert_eq!(status, 429);
            assert_eq!(attempts, 3);
        }
        other => panic!("Expected RetriesExhausted, got {:?}", other),
    }
    assert_eq!(request_count(&env).await, 3);
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let env = TestEnv::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such product"))
        .mount(&env.server)
        .await;

    let result = client(&env, Retailer::HomeDepot)
        .request(&product_request())
        .await;

    assert!(matches!(result, Err(ApiError::Status { status: 404, .. })));
    assert_eq!(request_count(&env).await, 1);
}

#[tokio::test]
async fn test_unauthorized_carries_vendor_message() {
    let env = TestEnv::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"request_info": {"success": false, "message": "Invalid api_key"}})),
        )
        .mount(&env.server)
        .await;

    let result = client(&env, Retailer::HomeDepot)
        .request(&product_request())
        .await;

    match result {
        Err(ApiError::Unauthorized { message }) => assert_eq!(message, "Invalid api_key"),
        other => panic!("Expected Unauthorized, got {:?}", other),
    }
}

#[tokio::test]
async fn test_envelope_rejection() {
    let env = TestEnv::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rejected_body("Out of credits")))
        .mount(&env.server)
        .await;

    let result = client(&env, Retailer::Lowes).request(&product_request()).await;

    match result {
        Err(e @ ApiError::Rejected { .. }) => {
            assert!(e.is_rejection());
            assert!(e.to_string().contains("Out of credits"));
        }
        other => panic!("Expected Rejected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_low_credit_still_succeeds() {
    let env = TestEnv::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "request_info": {"success": true, "credits_remaining": 3},
            "product": {"title": "Stud"}
        })))
        .mount(&env.server)
        .await;

    let response = client(&env, Retailer::HomeDepot)
        .request(&product_request())
        .await
        .expect("Low credits must not fail the call");

    assert_eq!(response.envelope.credits_remaining, Some(3));
}

#[tokio::test]
async fn test_request_parameters() {
    let env = TestEnv::start().await;

    Mock::given(method("GET"))
        .and(path("/request"))
        .and(query_param("api_key", "test-key"))
        .and(query_param("type", "search"))
        .and(query_param("search_term", "*"))
        .and(query_param("category", "4294857975"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"search_results": []})),
        )
        .expect(1)
        .mount(&env.server)
        .await;

    let request = ApiRequest::Category {
        category_id: "4294857975".to_string(),
        page: 2,
        sort_by: None,
    };
    client(&env, Retailer::Lowes)
        .request(&request)
        .await
        .expect("Category request should match the Lowe's search-filter form");
}
