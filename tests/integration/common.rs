//! Shared fixtures for integration tests

use aisle_sweep::config::{parse_config, Config};
use aisle_sweep::job::{JobController, JobSnapshot};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::MockServer;

/// A mock aggregator plus a scratch output directory
pub struct TestEnv {
    pub server: MockServer,
    pub dir: TempDir,
}

impl TestEnv {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// Configuration pointing both retailers at the mock server
    pub fn config(&self) -> Config {
        let dir = self.dir.path().display();
        let endpoint = format!("{}/request", self.server.uri());

        parse_config(&format!(
            r#"
[api]
timeout-secs = 5
max-retries = 2
backoff-factor = 0.0

[crawler]
page-delay-ms = 0
item-delay-ms = 0
max-pages = 3

[output]
directory = "{dir}/out"
database-path = "{dir}/jobs.db"

[[retailer]]
name = "home-depot"
api-key = "test-key"
endpoint = "{endpoint}"

[[retailer]]
name = "lowes"
api-key = "test-key"
endpoint = "{endpoint}"
"#
        ))
        .expect("Failed to parse test config")
    }
}

/// A flat search page whose listings link to `links`
pub fn search_page(links: &[String]) -> Value {
    json!({
        "request_info": {"success": true, "credits_remaining": 500},
        "search_results": links
            .iter()
            .map(|link| json!({"product": {"link": link}}))
            .collect::<Vec<_>>()
    })
}

/// Home Depot product URLs `/p/item-<n>/<1000+n>` for `range`
pub fn hd_links(range: std::ops::RangeInclusive<u32>) -> Vec<String> {
    range
        .map(|n| format!("https://www.homedepot.com/p/item-{}/{}", n, 1000 + n))
        .collect()
}

pub fn product_body(title: &str, price: f64) -> Value {
    json!({
        "request_info": {"success": true, "credits_remaining": 499},
        "product": {
            "title": title,
            "brand": "Acme",
            "store_sku": "161640",
            "description": "Kiln dried",
            "buybox_winner": {"price": price, "currency": "USD"},
            "images": [{"link": "https://images.example.com/1.jpg"}],
            "specifications": [{"name": "Material", "value": "Wood"}]
        }
    })
}

pub fn rejected_body(message: &str) -> Value {
    json!({"request_info": {"success": false, "message": message}})
}

/// Waits for a job to finish, failing the test after 30 seconds
pub async fn join(controller: &JobController, job_id: u64) -> JobSnapshot {
    tokio::time::timeout(Duration::from_secs(30), controller.join(job_id))
        .await
        .expect("Job did not finish in time")
        .expect("Join failed")
}

/// Reads a CSV artifact into its header and rows
pub fn read_csv(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path).expect("Failed to open artifact");
    let headers = reader
        .headers()
        .expect("Missing header row")
        .iter()
        .map(String::from)
        .collect();
    let rows = reader
        .records()
        .map(|r| r.expect("Bad CSV row").iter().map(String::from).collect())
        .collect();
    (headers, rows)
}

pub fn log_contains(snapshot: &JobSnapshot, needle: &str) -> bool {
    snapshot.log.iter().any(|line| line.message.contains(needle))
}
