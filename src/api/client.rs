//! HTTP client for the aggregator API
//!
//! One client serves every retailer; the [`RetailerProfile`] supplies the
//! endpoint and the category call style.

use super::envelope::{ApiResponse, Envelope};
use super::{ApiError, ApiResult};
use crate::config::ApiConfig;
use crate::retailer::{CategoryMode, RetailerProfile};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// Statuses retried by [`RetryPolicy`]
pub const TRANSIENT_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Backoff base in seconds
    pub backoff_factor: f64,
}

/// Longest sleep between two attempts
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_factor: 0.5,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ApiConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_factor: config.backoff_factor,
        }
    }

    /// Returns true when a response with `status` to a `method` call may be retried
    pub fn is_retryable(&self, method: &Method, status: StatusCode) -> bool {
        *method == Method::GET && TRANSIENT_STATUSES.contains(&status.as_u16())
    }

    /// Sleep before retry number `retry` (1-based): `factor * 2^(retry-1)` seconds
    ///
    /// Capped at [`MAX_BACKOFF`]; a negative or non-finite factor gives no delay.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        let secs = self.backoff_factor * f64::from(1u32 << exponent);
        if secs.is_nan() || secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(secs)
            .map(|delay| delay.min(MAX_BACKOFF))
            .unwrap_or(MAX_BACKOFF)
    }
}

/// One API call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiRequest {
    /// Product detail by product page URL
    Product { url: String },

    /// Product detail by item id
    ProductById { item_id: String },

    /// One page of keyword search results
    Search {
        term: String,
        page: u32,
        sort_by: Option<String>,
    },

    /// One page of a category listing
    Category {
        category_id: String,
        page: u32,
        sort_by: Option<String>,
    },
}

impl ApiRequest {
    /// Query parameters for this call, excluding the API key
    pub fn query(&self, category_mode: CategoryMode) -> Vec<(&'static str, String)> {
        match self {
            Self::Product { url } => vec![("type", "product".to_string()), ("url", url.clone())],
            Self::ProductById { item_id } => vec![
                ("type", "product".to_string()),
                ("item_id", item_id.clone()),
            ],
            Self::Search {
                term,
                page,
                sort_by,
            } => {
                let mut params = vec![
                    ("type", "search".to_string()),
                    ("search_term", term.clone()),
                    ("page", page.to_string()),
                ];
                if let Some(sort) = sort_by {
                    params.push(("sort_by", sort.clone()));
                }
                params
            }
            Self::Category {
                category_id,
                page,
                sort_by,
            } => {
                let mut params = match category_mode {
                    CategoryMode::Native => vec![
                        ("type", "category".to_string()),
                        ("category_id", category_id.clone()),
                    ],
                    CategoryMode::SearchFilter => vec![
                        ("type", "search".to_string()),
                        ("search_term", "*".to_string()),
                        ("category", category_id.clone()),
                    ],
                };
                params.push(("page", page.to_string()));
                if let Some(sort) = sort_by {
                    params.push(("sort_by", sort.clone()));
                }
                params
            }
        }
    }

    /// Short description for logs and errors; never includes the key
    pub fn describe(&self) -> String {
        match self {
            Self::Product { url } => format!("product {}", url),
            Self::ProductById { item_id } => format!("product item {}", item_id),
            Self::Search { term, page, .. } => format!("search '{}' page {}", term, page),
            Self::Category {
                category_id, page, ..
            } => format!("category {} page {}", category_id, page),
        }
    }
}

/// Rate-limited client bound to one retailer and API key
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    profile: RetailerProfile,
    api_key: String,
    retry: RetryPolicy,
    low_credit_threshold: u64,
}

/// Builds the underlying HTTP client
///
/// # Arguments
///
/// * `config` - Outbound API settings (timeouts)
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &ApiConfig) -> Result<Client, reqwest::Error> {
    let user_agent = format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.timeout_secs.min(10)))
        .gzip(true)
        .brotli(true)
        .build()
}

impl ApiClient {
    /// Creates a client for `profile` authenticated with `api_key`
    pub fn new(
        profile: RetailerProfile,
        api_key: impl Into<String>,
        config: &ApiConfig,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: build_http_client(config)?,
            profile,
            api_key: api_key.into(),
            retry: RetryPolicy::from_config(config),
            low_credit_threshold: config.low_credit_threshold,
        })
    }

    pub fn profile(&self) -> &RetailerProfile {
        &self.profile
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Performs one API call with retry
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | HTTP 429/500/502/503/504 | Retry with backoff until the budget is spent |
    /// | HTTP 401 | Immediate → `Unauthorized` with the vendor message |
    /// | Other non-2xx | Immediate → `Status` |
    /// | `request_info.success == false` | Immediate → `Rejected` |
    /// | Timeout / connection error | Immediate → `Timeout` / `Network` |
    pub async fn request(&self, request: &ApiRequest) -> ApiResult<ApiResponse> {
        let description = request.describe();
        let mut params = vec![("api_key", self.api_key.clone())];
        params.extend(request.query(self.profile.category_mode));

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            tracing::debug!("{} {} (attempt {})", self.profile.retailer, description, attempt);

            let response = self
                .http
                .request(Method::GET, &self.profile.endpoint)
                .query(&params)
                .send()
                .await
                .map_err(|e| classify_send_error(&description, e))?;

            let status = response.status();

            if self.retry.is_retryable(&Method::GET, status) && attempt <= self.retry.max_retries {
                let delay = self.retry.delay_for(attempt);
                tracing::warn!(
                    "HTTP {} for {}, retrying in {:.2}s ({}/{})",
                    status.as_u16(),
                    description,
                    delay.as_secs_f64(),
                    attempt,
                    self.retry.max_retries
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            let body = response
                .text()
                .await
                .map_err(|e| classify_send_error(&description, e))?;

            if status == StatusCode::UNAUTHORIZED {
                let message = vendor_message(&body)
                    .unwrap_or_else(|| "Invalid API key".to_string());
                return Err(ApiError::Unauthorized { message });
            }

            if TRANSIENT_STATUSES.contains(&status.as_u16()) {
                return Err(ApiError::RetriesExhausted {
                    request: description,
                    status: status.as_u16(),
                    attempts: attempt,
                });
            }

            if !status.is_success() {
                let message = vendor_message(&body).unwrap_or_else(|| snippet(&body));
                return Err(ApiError::Status {
                    request: description,
                    status: status.as_u16(),
                    message,
                });
            }

            let value: Value = serde_json::from_str(&body).map_err(|e| ApiError::Decode {
                request: description.clone(),
                message: e.to_string(),
            })?;

            let response = ApiResponse::new(value);
            self.check_envelope(&response.envelope)?;
            return Ok(response);
        }
    }

    fn check_envelope(&self, envelope: &Envelope) -> ApiResult<()> {
        if !envelope.is_success() {
            return Err(ApiError::Rejected {
                message: envelope.message_or_default(),
            });
        }

        if envelope.is_low_on_credits(self.low_credit_threshold) {
            tracing::warn!(
                "{} API credits running low: {} remaining",
                self.profile.retailer,
                envelope.credits_remaining.unwrap_or_default()
            );
        }

        Ok(())
    }
}

fn classify_send_error(request: &str, error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::Timeout {
            request: request.to_string(),
        }
    } else {
        ApiError::Network {
            request: request.to_string(),
            source: error,
        }
    }
}

/// Extracts `request_info.message` from an error body
fn vendor_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let envelope = Envelope::from_body(&value);
    envelope.message.filter(|m| !m.is_empty())
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    trimmed.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retailer::RetailerProfile;

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_secs(2));
    }

    #[test]
    fn test_backoff_is_capped() {
        let huge = RetryPolicy {
            max_retries: 3,
            backoff_factor: 1e20,
        };
        assert_eq!(huge.delay_for(1), MAX_BACKOFF);
        assert_eq!(huge.delay_for(3), MAX_BACKOFF);

        let infinite = RetryPolicy {
            max_retries: 3,
            backoff_factor: f64::INFINITY,
        };
        assert_eq!(infinite.delay_for(2), MAX_BACKOFF);

        let none = RetryPolicy {
            max_retries: 3,
            backoff_factor: 0.0,
        };
        assert_eq!(none.delay_for(5), Duration::ZERO);
    }

    #[test]
    fn test_only_get_transient_is_retryable() {
        let policy = RetryPolicy::default();
        assert!(policy.is_retryable(&Method::GET, StatusCode::SERVICE_UNAVAILABLE));
        assert!(policy.is_retryable(&Method::GET, StatusCode::TOO_MANY_REQUESTS));
        assert!(!policy.is_retryable(&Method::GET, StatusCode::NOT_FOUND));
        assert!(!policy.is_retryable(&Method::GET, StatusCode::UNAUTHORIZED));
        assert!(!policy.is_retryable(&Method::POST, StatusCode::SERVICE_UNAVAILABLE));
    }

    #[test]
    fn test_search_query() {
        let request = ApiRequest::Search {
            term: "2x4 lumber".to_string(),
            page: 2,
            sort_by: Some("best_seller".to_string()),
        };
        let query = request.query(CategoryMode::Native);
        assert_eq!(
            query,
            vec![
                ("type", "search".to_string()),
                ("search_term", "2x4 lumber".to_string()),
                ("page", "2".to_string()),
                ("sort_by", "best_seller".to_string()),
            ]
        );
    }

    #[test]
    fn test_category_query_follows_mode() {
        let request = ApiRequest::Category {
            category_id: "N-5yc1vZbqm1".to_string(),
            page: 1,
            sort_by: None,
        };

        let native = request.query(RetailerProfile::home_depot().category_mode);
        assert!(native.contains(&("type", "category".to_string())));
        assert!(native.contains(&("category_id", "N-5yc1vZbqm1".to_string())));

        let filter = request.query(RetailerProfile::lowes().category_mode);
        assert!(filter.contains(&("type", "search".to_string())));
        assert!(filter.contains(&("search_term", "*".to_string())));
        assert!(filter.contains(&("category", "N-5yc1vZbqm1".to_string())));
    }

    #[test]
    fn test_describe_omits_key() {
        let request = ApiRequest::Product {
            url: "https://www.homedepot.com/p/a/1".to_string(),
        };
        assert_eq!(request.describe(), "product https://www.homedepot.com/p/a/1");
    }

    #[test]
    fn test_vendor_message() {
        let body = r#"{"request_info": {"success": false, "message": "Invalid api_key"}}"#;
        assert_eq!(vendor_message(body), Some("Invalid api_key".to_string()));
        assert_eq!(vendor_message("not json"), None);
    }
}
