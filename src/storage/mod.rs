//! Storage module for the job history
//!
//! This module handles all database operations for job persistence:
//! - SQLite database initialization and schema management
//! - Recording job snapshots with their logs and artifact names
//! - Reloading jobs evicted from memory or left by earlier processes
//! - Keeping job ids monotonic across restarts

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteJobStore;
pub use traits::{JobStore, StorageError, StorageResult};

use std::path::Path;

/// Opens or creates the job history database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteJobStore)` - Successfully opened history
/// * `Err(StorageError)` - Failed to open the database
pub fn open_store(path: &Path) -> StorageResult<SqliteJobStore> {
    SqliteJobStore::new(path)
}
