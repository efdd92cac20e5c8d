//! Aisle-Sweep: a catalog harvesting engine
//!
//! This crate crawls a paginated product-catalog aggregator API, collects
//! deduplicated product URLs, fetches per-product details, and writes the
//! results as CSV. Every crawl runs as a job with its own lifecycle, log, and
//! graceful-stop support.

pub mod api;
pub mod config;
pub mod crawler;
pub mod job;
pub mod output;
pub mod retailer;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Aisle-Sweep operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("API error: {0}")]
    Api(#[from] api::ApiError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid job spec: {0}")]
    InvalidSpec(String),

    #[error("Job {0} not found")]
    JobNotFound(u64),

    #[error("Job {job_id} has no artifact named {name}")]
    ArtifactNotFound { job_id: u64, name: String },

    #[error("Worker pool is saturated ({limit} jobs pending or running)")]
    PoolSaturated { limit: usize },

    #[error("No API key configured for retailer {0}")]
    MissingApiKey(String),

    #[error("Worker for job {job_id} panicked: {message}")]
    WorkerPanicked { job_id: u64, message: String },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Unknown retailer: {0}")]
    UnknownRetailer(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Not a product URL for {retailer}: {url}")]
    NotAProduct { retailer: String, url: String },
}

/// Result type alias for Aisle-Sweep operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use job::{JobController, JobInput, JobSnapshot, JobSpec, JobStatus};
pub use retailer::{Retailer, RetailerProfile};
pub use crate::url::{canonicalize, ProductUrlSet};
