use crate::output::{ColumnMapping, OutputMode};
use crate::retailer::{Retailer, RetailerProfile};
use crate::HarvestError;
use serde::Deserialize;

/// Main configuration structure for Aisle-Sweep
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub retailer: Vec<RetailerEntry>,
    /// Template columns, in output order; empty means the default template
    #[serde(default)]
    pub column: Vec<ColumnEntry>,
}

/// Outbound API behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Per-call timeout (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Retries after the first attempt for transient statuses
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Backoff base in seconds; retry `n` sleeps `factor * 2^(n-1)`
    #[serde(rename = "backoff-factor")]
    pub backoff_factor: f64,

    /// Warn when the vendor reports fewer credits than this
    #[serde(rename = "low-credit-threshold")]
    pub low_credit_threshold: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            backoff_factor: 0.5,
            low_credit_threshold: 10,
        }
    }
}

/// Crawl pacing and default limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Delay between search/category pages (milliseconds)
    #[serde(rename = "page-delay-ms")]
    pub page_delay_ms: u64,

    /// Delay between product detail requests (milliseconds)
    #[serde(rename = "item-delay-ms")]
    pub item_delay_ms: u64,

    /// Default page limit per input when a job does not set one
    #[serde(rename = "max-pages")]
    pub max_pages: u32,

    /// Default product limit; 0 means unlimited
    #[serde(rename = "max-products")]
    pub max_products: usize,

    #[serde(rename = "sort-by")]
    pub sort_by: Option<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            page_delay_ms: 1500,
            item_delay_ms: 1000,
            max_pages: 5,
            max_products: 0,
            sort_by: None,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root directory for job directories
    pub directory: String,

    /// Path to the SQLite job history
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Archive raw vendor payloads under each job's `raw/` directory
    #[serde(rename = "save-raw")]
    pub save_raw: bool,

    pub format: OutputMode,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: "./data".to_string(),
            database_path: "./data/jobs.db".to_string(),
            save_raw: true,
            format: OutputMode::Template,
        }
    }
}

/// Worker pool limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Jobs allowed to run at once
    #[serde(rename = "max-concurrent-jobs")]
    pub max_concurrent_jobs: usize,

    /// Jobs allowed to wait for a slot before `start` rejects
    #[serde(rename = "max-queued-jobs")]
    pub max_queued_jobs: usize,

    /// Finished jobs kept in memory; older ones live only in the history
    #[serde(rename = "retain-finished")]
    pub retain_finished: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            max_queued_jobs: 16,
            retain_finished: 100,
        }
    }
}

/// Credentials and endpoint override for one retailer
#[derive(Debug, Clone, Deserialize)]
pub struct RetailerEntry {
    /// Retailer name (`home-depot` or `lowes`)
    pub name: String,

    /// Literal API key
    #[serde(rename = "api-key")]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: Option<String>,

    /// Replaces the built-in endpoint
    pub endpoint: Option<String>,
}

/// One template column
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnEntry {
    /// Canonical field name (e.g. `sku`, `spec:Material`)
    pub field: String,

    /// Header written to the CSV
    pub header: String,
}

impl Config {
    /// Returns the template mapping configured by `[[column]]` entries
    pub fn column_mapping(&self) -> ColumnMapping {
        if self.column.is_empty() {
            return ColumnMapping::default_template();
        }
        ColumnMapping::new(
            self.column
                .iter()
                .map(|c| (c.field.clone(), c.header.clone()))
                .collect(),
        )
    }

    /// Returns the default product limit as an option
    pub fn max_products(&self) -> Option<usize> {
        match self.crawler.max_products {
            0 => None,
            n => Some(n),
        }
    }

    /// Returns the retailer entry configured for `retailer`, if any
    pub fn retailer_entry(&self, retailer: Retailer) -> Option<&RetailerEntry> {
        self.retailer
            .iter()
            .find(|entry| entry.name.parse::<Retailer>().ok() == Some(retailer))
    }

    /// Builds the profile for `retailer`, applying any endpoint override
    pub fn profile_for(&self, retailer: Retailer) -> RetailerProfile {
        let profile = retailer.profile();
        match self.retailer_entry(retailer).and_then(|e| e.endpoint.clone()) {
            Some(endpoint) => profile.with_endpoint(endpoint),
            None => profile,
        }
    }

    /// Resolves the API key for `retailer`
    ///
    /// A literal `api-key` wins over `api-key-env`.
    pub fn api_key_for(&self, retailer: Retailer) -> Result<String, HarvestError> {
        let entry = self
            .retailer_entry(retailer)
            .ok_or_else(|| HarvestError::MissingApiKey(retailer.to_string()))?;

        if let Some(key) = entry.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Ok(key.clone());
        }

        entry
            .api_key_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| HarvestError::MissingApiKey(retailer.to_string()))
    }
}
