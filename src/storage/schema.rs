//! Database schema definitions
//!
//! This module contains the SQL schema for the job history database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per job, rewritten on every recorded transition
CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY,
    retailer TEXT NOT NULL,
    input TEXT NOT NULL,
    limits TEXT,
    status TEXT NOT NULL,
    completion TEXT,
    stop_requested INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    started_at TEXT,
    finished_at TEXT,
    pages_current INTEGER NOT NULL DEFAULT 0,
    pages_total INTEGER NOT NULL DEFAULT 0,
    items_current INTEGER NOT NULL DEFAULT 0,
    items_total INTEGER NOT NULL DEFAULT 0,
    products_collected INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    config_hash TEXT
);

CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);

-- Append-only job log
CREATE TABLE IF NOT EXISTS job_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id INTEGER NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    logged_at TEXT NOT NULL,
    message TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_job_log_job ON job_log(job_id);

-- Files produced by a job
CREATE TABLE IF NOT EXISTS artifacts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id INTEGER NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    UNIQUE(job_id, name)
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
