//! End-to-end job runs against a mock aggregator

use crate::common::{
    hd_links, join, log_contains, product_body, read_csv, rejected_body, search_page, TestEnv,
};
use aisle_sweep::config::Config;
use aisle_sweep::job::{Completion, JobController, JobInput, JobSpec, JobStatus};
use aisle_sweep::output::ColumnMapping;
use aisle_sweep::retailer::Retailer;
use aisle_sweep::storage::open_store;
use aisle_sweep::HarvestError;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

fn search_spec(term: &str, max_pages: u32) -> JobSpec {
    JobSpec::new(
        Retailer::HomeDepot,
        JobInput::SearchTerms(vec![term.to_string()]),
    )
    .with_max_pages(max_pages)
}

async fn mount_search_page(env: &TestEnv, term: &str, page: u32, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/request"))
        .and(query_param("type", "search"))
        .and(query_param("search_term", term))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&env.server)
        .await;
}

async fn mount_products(env: &TestEnv, delay: Option<Duration>) {
    let mut response = ResponseTemplate::new(200).set_body_json(product_body("Board", 3.98));
    if let Some(delay) = delay {
        response = response.set_delay(delay);
    }
    Mock::given(method("GET"))
        .and(path("/request"))
        .and(query_param("type", "product"))
        .respond_with(response)
        .mount(&env.server)
        .await;
}

async fn product_requests(env: &TestEnv) -> usize {
    env.server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.query().is_some_and(|q| q.contains("type=product")))
        .count()
}

async fn wait_until<F>(controller: &JobController, job_id: u64, condition: F)
where
    F: Fn(&aisle_sweep::JobSnapshot) -> bool,
{
    let mut rx = controller.subscribe(job_id).unwrap();
    tokio::time::timeout(Duration::from_secs(10), rx.wait_for(|s| condition(s)))
        .await
        .expect("Condition not reached in time")
        .expect("Job channel closed");
}

fn artifact(controller: &JobController, job_id: u64, name: &str) -> std::path::PathBuf {
    let path = controller.artifact_path(job_id, name).unwrap();
    assert!(path.exists(), "Artifact {} should exist", path.display());
    path
}

#[tokio::test]
async fn test_search_job_writes_template_csv() {
    let env = TestEnv::start().await;
    mount_search_page(&env, "2x4 lumber", 1, search_page(&hd_links(1..=3))).await;
    mount_products(&env, None).await;

    let controller = JobController::new(env.config());
    let id = controller.start(search_spec("2x4 lumber", 1)).unwrap();
    let finished = join(&controller, id).await;

    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.completion, Some(Completion::Exhausted));
    assert!(!finished.stop_requested);
    assert_eq!(finished.item_progress.total, 3);
    assert_eq!(finished.item_progress.current, 3);
    assert_eq!(finished.products_collected, 3);
    assert!(log_contains(&finished, "Found 3 unique product URLs"));
    assert_eq!(finished.artifacts.len(), 1);

    let name = &finished.artifacts[0];
    assert!(name.starts_with("homedepot_results_"));
    assert!(name.ends_with(".csv"));

    let (headers, rows) = read_csv(&artifact(&controller, id, name));
    assert_eq!(headers[0], "Purchase Price");
    assert_eq!(headers.last().map(String::as_str), Some("Item Name"));
    assert_eq!(rows.len(), 3);

    let url_col = headers.iter().position(|h| h == "URL").unwrap();
    let name_col = headers.iter().position(|h| h == "Item Name").unwrap();
    let markup_col = headers.iter().position(|h| h == "Markup").unwrap();
    assert_eq!(rows[0][url_col], "https://www.homedepot.com/p/item-1/1001");
    assert_eq!(rows[0][name_col], "Board");
    assert_eq!(rows[0][markup_col], "43%");
}

#[tokio::test]
async fn test_progress_never_moves_backwards() {
    let env = TestEnv::start().await;
    mount_search_page(&env, "joists", 1, search_page(&hd_links(1..=2))).await;
    mount_search_page(&env, "joists", 2, search_page(&hd_links(3..=4))).await;
    mount_search_page(&env, "hangers", 1, search_page(&hd_links(5..=6))).await;
    mount_search_page(&env, "hangers", 2, search_page(&[])).await;
    mount_products(&env, None).await;

    let spec = JobSpec::new(
        Retailer::HomeDepot,
        JobInput::SearchTerms(vec!["joists".to_string(), "hangers".to_string()]),
    )
    .with_max_pages(2);

    let controller = JobController::new(env.config());
    let id = controller.start(spec).unwrap();
    let mut rx = controller.subscribe(id).unwrap();

    let mut seen = Vec::new();
    let finished = tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let snapshot = rx.borrow_and_update().clone();
            seen.push((snapshot.page_progress, snapshot.item_progress));
            if snapshot.is_terminal() {
                return snapshot;
            }
            if rx.changed().await.is_err() {
                return controller.status(id).unwrap();
            }
        }
    })
    .await
    .expect("Job did not finish in time");

    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.products_collected, 6);

    for (pages, items) in &seen {
        assert!(pages.current <= pages.total, "{:?}", pages);
        assert!(items.current <= items.total, "{:?}", items);
    }
    for pair in seen.windows(2) {
        let (before, after) = (&pair[0], &pair[1]);
        assert!(after.0.current >= before.0.current, "page progress went back: {:?}", pair);
        assert!(after.1.current >= before.1.current, "item progress went back: {:?}", pair);
    }

    let (pages, items) = seen.last().unwrap();
    assert_eq!(pages.current, 4);
    assert_eq!(pages.total, 4);
    assert_eq!(items.current, 6);
    assert_eq!(items.total, 6);
}

#[tokio::test]
async fn test_rejected_page_keeps_earlier_pages() {
    let env = TestEnv::start().await;
    mount_search_page(&env, "drywall", 1, search_page(&hd_links(1..=2))).await;
    mount_search_page(&env, "drywall", 2, rejected_body("Out of credits")).await;
    mount_search_page(&env, "drywall", 3, search_page(&hd_links(3..=4))).await;
    mount_products(&env, None).await;

    let controller = JobController::new(env.config());
    let id = controller.start(search_spec("drywall", 3)).unwrap();
    let finished = join(&controller, id).await;

    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.products_collected, 2);
    assert!(log_contains(&finished, "ERROR:"));
    assert!(log_contains(&finished, "Out of credits"));

    let (_, rows) = read_csv(&artifact(&controller, id, &finished.artifacts[0]));
    assert_eq!(rows.len(), 2);
    assert_eq!(product_requests(&env).await, 2);
}

#[tokio::test]
async fn test_query_variants_are_fetched_once() {
    let env = TestEnv::start().await;
    let links = vec![
        "https://www.homedepot.com/p/item-1/1001?ref=1".to_string(),
        "https://www.homedepot.com/p/item-1/1001?ref=2#reviews".to_string(),
        "/p/item-1/1001".to_string(),
    ];
    mount_search_page(&env, "stud", 1, search_page(&links)).await;
    mount_products(&env, None).await;

    let controller = JobController::new(env.config());
    let id = controller.start(search_spec("stud", 1)).unwrap();
    let finished = join(&controller, id).await;

    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.products_collected, 1);
    assert!(log_contains(&finished, "Found 1 unique product URLs"));
    assert_eq!(product_requests(&env).await, 1);
}

#[tokio::test]
async fn test_max_products_spans_search_terms() {
    let env = TestEnv::start().await;
    mount_search_page(&env, "nails", 1, search_page(&hd_links(1..=3))).await;
    mount_search_page(&env, "screws", 1, search_page(&hd_links(4..=6))).await;
    mount_products(&env, None).await;

    let spec = JobSpec::new(
        Retailer::HomeDepot,
        JobInput::SearchTerms(vec!["nails".to_string(), "screws".to_string()]),
    )
    .with_max_pages(1)
    .with_max_products(Some(4));

    let controller = JobController::new(env.config());
    let id = controller.start(spec).unwrap();
    let finished = join(&controller, id).await;

    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.products_collected, 4);
    assert_eq!(product_requests(&env).await, 4);
}

#[tokio::test]
async fn test_graceful_stop_saves_collected_products() {
    let env = TestEnv::start().await;
    mount_search_page(&env, "plywood", 1, search_page(&hd_links(1..=5))).await;
    mount_products(&env, None).await;

    let mut config = env.config();
    config.crawler.item_delay_ms = 300;

    let controller = JobController::new(config);
    let id = controller.start(search_spec("plywood", 1)).unwrap();

    wait_until(&controller, id, |s| s.item_progress.current >= 2).await;
    controller.request_stop(id).unwrap();
    let finished = join(&controller, id).await;

    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.completion, Some(Completion::StoppedEarly));
    assert!(finished.stop_requested);
    assert_eq!(finished.products_collected, 2);

    let (_, rows) = read_csv(&artifact(&controller, id, &finished.artifacts[0]));
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn test_cancel_abandons_job() {
    let env = TestEnv::start().await;
    mount_search_page(&env, "pavers", 1, search_page(&hd_links(1..=3))).await;
    mount_products(&env, Some(Duration::from_secs(5))).await;

    let controller = JobController::new(env.config());
    let id = controller.start(search_spec("pavers", 1)).unwrap();

    wait_until(&controller, id, |s| s.item_progress.total > 0).await;
    let finished = tokio::time::timeout(Duration::from_secs(3), controller.cancel(id))
        .await
        .expect("Cancel should not wait for in-flight requests")
        .unwrap();

    assert_eq!(finished.status, JobStatus::Cancelled);
    assert!(finished.artifacts.is_empty());
    assert!(finished.finished_at.is_some());

    // Stop after a terminal state is a no-op
    controller.request_stop(id).unwrap();
    assert_eq!(controller.status(id).unwrap().status, JobStatus::Cancelled);
}

#[tokio::test]
async fn test_pool_rejects_when_saturated() {
    let env = TestEnv::start().await;
    mount_search_page(&env, "tile", 1, search_page(&hd_links(1..=2))).await;
    mount_products(&env, Some(Duration::from_secs(5))).await;

    let mut config = env.config();
    config.pool.max_concurrent_jobs = 1;
    config.pool.max_queued_jobs = 1;

    let controller = JobController::new(config);
    let first = controller.start(search_spec("tile", 1)).unwrap();
    let second = controller.start(search_spec("tile", 1)).unwrap();

    let third = controller.start(search_spec("tile", 1));
    assert!(matches!(third, Err(HarvestError::PoolSaturated { limit: 2 })));

    // One job holds the only slot while the other waits
    let statuses = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let a = controller.status(first).unwrap().status;
            let b = controller.status(second).unwrap().status;
            if a == JobStatus::Running || b == JobStatus::Running {
                return (a, b);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("Neither job started running");
    assert!(matches!(
        statuses,
        (JobStatus::Running, JobStatus::Pending) | (JobStatus::Pending, JobStatus::Running)
    ));

    controller.cancel(first).await.unwrap();
    controller.cancel(second).await.unwrap();
    assert_eq!(controller.list().len(), 2);
}

#[tokio::test]
async fn test_unknown_column_falls_back_to_last_resort_writer() {
    let env = TestEnv::start().await;
    mount_search_page(&env, "mulch", 1, search_page(&hd_links(1..=2))).await;
    mount_products(&env, None).await;

    let columns = ColumnMapping::new(vec![
        ("title".to_string(), "Name".to_string()),
        ("colour".to_string(), "Colour".to_string()),
    ]);
    let spec = search_spec("mulch", 1).with_columns(columns);

    let controller = JobController::new(env.config());
    let id = controller.start(spec).unwrap();
    let finished = join(&controller, id).await;

    assert_eq!(finished.status, JobStatus::Completed);
    assert!(log_contains(&finished, "last-resort writer"));

    let (headers, rows) = read_csv(&artifact(&controller, id, &finished.artifacts[0]));
    assert!(headers.iter().any(|h| h == "title"));
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn test_unrecognized_payload_completes_without_products() {
    let env = TestEnv::start().await;
    mount_search_page(
        &env,
        "gravel",
        1,
        json!({"request_info": {"success": true}, "oddities": []}),
    )
    .await;

    let controller = JobController::new(env.config());
    let id = controller.start(search_spec("gravel", 2)).unwrap();
    let finished = join(&controller, id).await;

    assert_eq!(finished.status, JobStatus::Completed);
    assert!(log_contains(&finished, "no data for this step"));
    assert!(log_contains(&finished, "No products found to save"));
    assert!(finished.artifacts.is_empty());
}

#[tokio::test]
async fn test_lowes_category_builds_urls_from_item_ids() {
    let env = TestEnv::start().await;
    Mock::given(method("GET"))
        .and(path("/request"))
        .and(query_param("type", "search"))
        .and(query_param("search_term", "*"))
        .and(query_param("category", "4294857975"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "request_info": {"success": true},
            "search_results": [
                {"product": {"item_id": "1000074211", "title": "2x4 Stud"}},
                {"product": {"item_id": 1000074212, "title": "2x6 Stud"}}
            ],
            "pagination": {"total_pages": 1, "current_page": 1}
        })))
        .mount(&env.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/request"))
        .and(query_param("type", "product"))
        .and(query_param("url", "https://www.lowes.com/pd/2x4-stud/1000074211"))
        .respond_with(ResponseTemplate::new(200).set_body_json(product_body("2x4 Stud", 4.12)))
        .expect(1)
        .mount(&env.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/request"))
        .and(query_param("type", "product"))
        .and(query_param("url", "https://www.lowes.com/pd/2x6-stud/1000074212"))
        .respond_with(ResponseTemplate::new(200).set_body_json(product_body("2x6 Stud", 6.48)))
        .expect(1)
        .mount(&env.server)
        .await;

    let spec = JobSpec::new(Retailer::Lowes, JobInput::Category("4294857975".to_string()))
        .with_max_pages(3);

    let controller = JobController::new(env.config());
    let id = controller.start(spec).unwrap();
    let finished = join(&controller, id).await;

    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.products_collected, 2);
    assert!(finished.artifacts[0].starts_with("lowes_results_"));
}

#[tokio::test]
async fn test_url_list_job_skips_foreign_urls() {
    let env = TestEnv::start().await;
    mount_products(&env, None).await;

    let spec = JobSpec::new(
        Retailer::HomeDepot,
        JobInput::UrlList(vec![
            "https://www.homedepot.com/p/item-1/1001".to_string(),
            "https://www.lowes.com/pd/stud/1000074211".to_string(),
            "https://www.homedepot.com/p/item-1/1001?ref=dup".to_string(),
        ]),
    );

    let controller = JobController::new(env.config());
    let id = controller.start(spec).unwrap();
    let finished = join(&controller, id).await;

    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.products_collected, 1);
    assert!(log_contains(&finished, "Skipping URL"));
}

#[tokio::test]
async fn test_history_survives_restart() {
    let env = TestEnv::start().await;
    mount_search_page(&env, "rebar", 1, search_page(&hd_links(1..=2))).await;
    mount_products(&env, None).await;

    let config: Config = env.config();
    let db_path = config.output.database_path.clone();

    let first_id = {
        let store = open_store(Path::new(&db_path)).unwrap();
        let controller =
            JobController::with_history(config.clone(), store, Some("abc123".to_string()))
                .unwrap();
        let id = controller.start(search_spec("rebar", 1)).unwrap();
        join(&controller, id).await;
        id
    };

    let store = open_store(Path::new(&db_path)).unwrap();
    let controller = JobController::with_history(config, store, None).unwrap();

    let restored = controller.status(first_id).unwrap();
    assert_eq!(restored.status, JobStatus::Completed);
    assert_eq!(restored.products_collected, 2);
    assert_eq!(restored.config_hash.as_deref(), Some("abc123"));
    assert!(log_contains(&restored, "Found 2 unique product URLs"));

    let name = restored.artifacts[0].clone();
    assert!(controller.artifact_path(first_id, &name).unwrap().exists());
    assert!(matches!(
        controller.artifact_path(first_id, "missing.csv"),
        Err(HarvestError::ArtifactNotFound { .. })
    ));

    let next = controller
        .start(search_spec("rebar", 1))
        .unwrap();
    assert_eq!(next, first_id + 1);
    join(&controller, next).await;
}
