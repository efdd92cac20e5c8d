//! Job specification and snapshot types

use crate::output::{ColumnMapping, OutputMode};
use crate::retailer::Retailer;
use crate::HarvestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a job crawls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum JobInput {
    /// Keyword searches, crawled one after another
    SearchTerms(Vec<String>),
    /// One category id
    Category(String),
    /// Product URLs supplied directly; pagination is skipped
    UrlList(Vec<String>),
}

impl JobInput {
    /// Short human-readable summary for logs and history listings
    pub fn describe(&self) -> String {
        match self {
            Self::SearchTerms(terms) => format!("search: {}", terms.join(", ")),
            Self::Category(id) => format!("category: {}", id),
            Self::UrlList(urls) => format!("{} urls", urls.len()),
        }
    }
}

/// Immutable description of one job
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub retailer: Retailer,
    pub input: JobInput,

    /// Page limit per search term or category (>= 1)
    pub max_pages: u32,

    /// Product limit across the whole job; `None` is unlimited
    pub max_products: Option<usize>,

    pub sort_by: Option<String>,
    pub columns: ColumnMapping,
    pub output_mode: OutputMode,
}

impl JobSpec {
    pub fn new(retailer: Retailer, input: JobInput) -> Self {
        Self {
            retailer,
            input,
            max_pages: 5,
            max_products: None,
            sort_by: None,
            columns: ColumnMapping::default_template(),
            output_mode: OutputMode::Template,
        }
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_max_products(mut self, max_products: Option<usize>) -> Self {
        self.max_products = max_products;
        self
    }

    pub fn with_sort_by(mut self, sort_by: Option<String>) -> Self {
        self.sort_by = sort_by;
        self
    }

    pub fn with_columns(mut self, columns: ColumnMapping) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self
    }

    pub fn limits(&self) -> JobLimits {
        JobLimits {
            max_pages: self.max_pages,
            max_products: self.max_products,
            sort_by: self.sort_by.clone(),
            output_mode: self.output_mode,
        }
    }

    /// Checks limits and input before a job is created
    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.max_pages < 1 {
            return Err(HarvestError::InvalidSpec(
                "max_pages must be at least 1".to_string(),
            ));
        }

        if self.max_products == Some(0) {
            return Err(HarvestError::InvalidSpec(
                "max_products must be at least 1 when set".to_string(),
            ));
        }

        let empty = match &self.input {
            JobInput::SearchTerms(terms) => terms.iter().all(|t| t.trim().is_empty()),
            JobInput::Category(id) => id.trim().is_empty(),
            JobInput::UrlList(urls) => urls.is_empty(),
        };
        if empty {
            return Err(HarvestError::InvalidSpec(format!(
                "job input is empty ({})",
                self.input.describe()
            )));
        }

        Ok(())
    }
}

/// Lifecycle status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    /// Running with a stop requested
    Stopping,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "stopping" => Some(Self::Stopping),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// How a completed job ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// Every input was crawled to its natural end or limit
    Exhausted,
    /// A stop request ended the job; collected products were saved
    StoppedEarly,
}

impl Completion {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Exhausted => "exhausted",
            Self::StoppedEarly => "stopped_early",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "exhausted" => Some(Self::Exhausted),
            "stopped_early" => Some(Self::StoppedEarly),
            _ => None,
        }
    }
}

/// A progress counter; `current` never exceeds `total`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    pub percentage: f64,
}

impl Progress {
    pub fn new(current: usize, total: usize) -> Self {
        let current = current.min(total);
        let percentage = if total == 0 {
            0.0
        } else {
            (current as f64 / total as f64 * 1000.0).round() / 10.0
        };
        Self {
            current,
            total,
            percentage,
        }
    }
}

/// One timestamped job log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub at: DateTime<Utc>,
    pub message: String,
}

impl LogLine {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            message: message.into(),
        }
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at.format("%Y-%m-%d %H:%M:%S"), self.message)
    }
}

/// The limits a job was started with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobLimits {
    pub max_pages: u32,
    pub max_products: Option<usize>,
    pub sort_by: Option<String>,
    pub output_mode: OutputMode,
}

impl Default for JobLimits {
    fn default() -> Self {
        Self {
            max_pages: 5,
            max_products: None,
            sort_by: None,
            output_mode: OutputMode::Template,
        }
    }
}

impl fmt::Display for JobLimits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "max {} pages", self.max_pages)?;
        match self.max_products {
            Some(limit) => write!(f, ", max {} products", limit)?,
            None => f.write_str(", unlimited products")?,
        }
        if let Some(sort) = &self.sort_by {
            write!(f, ", sorted by {}", sort)?;
        }
        write!(f, ", {} output", self.output_mode)
    }
}

/// Point-in-time view of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: u64,
    pub retailer: Retailer,
    pub input: JobInput,
    pub limits: JobLimits,
    pub status: JobStatus,

    /// Set only for completed jobs
    pub completion: Option<Completion>,

    pub stop_requested: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub page_progress: Progress,
    pub item_progress: Progress,
    pub products_collected: usize,
    pub log: Vec<LogLine>,

    /// Artifact file names, relative to the job's results directory
    pub artifacts: Vec<String>,

    pub error: Option<String>,
    pub config_hash: Option<String>,
}

impl JobSnapshot {
    pub fn pending(id: u64, spec: &JobSpec, config_hash: Option<String>) -> Self {
        Self {
            id,
            retailer: spec.retailer,
            input: spec.input.clone(),
            limits: spec.limits(),
            status: JobStatus::Pending,
            completion: None,
            stop_requested: false,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            page_progress: Progress::default(),
            item_progress: Progress::default(),
            products_collected: 0,
            log: Vec::new(),
            artifacts: Vec::new(),
            error: None,
            config_hash,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
