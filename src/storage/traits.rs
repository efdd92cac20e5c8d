//! Storage traits and error types
//!
//! This module defines the trait interface for job history backends and
//! associated error types.

use crate::job::JobSnapshot;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Job not found in history: {0}")]
    JobNotFound(u64),

    #[error("Corrupt history row for job {job_id}: {message}")]
    Corrupt { job_id: u64, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for job history backends
pub trait JobStore {
    /// Inserts or replaces a job, its log, and its artifact names
    fn record_job(&mut self, snapshot: &JobSnapshot) -> StorageResult<()>;

    /// Loads one job with its full log
    fn load_job(&self, job_id: u64) -> StorageResult<JobSnapshot>;

    /// Loads the most recent jobs, newest first
    fn recent_jobs(&self, limit: usize) -> StorageResult<Vec<JobSnapshot>>;

    /// Highest job id ever recorded, or 0
    fn max_job_id(&self) -> StorageResult<u64>;

    /// Marks every job still pending, running, or stopping as failed
    ///
    /// Called when a new process takes over the history; returns the ids
    /// that were left unfinished by a previous process.
    fn fail_interrupted(&mut self) -> StorageResult<Vec<u64>>;
}
