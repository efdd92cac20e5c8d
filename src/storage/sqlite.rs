//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the JobStore trait.

use crate::job::{Completion, JobInput, JobLimits, JobSnapshot, JobStatus, LogLine, Progress};
use crate::retailer::Retailer;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{JobStore, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// Error text for jobs a previous process never finished
const INTERRUPTED: &str = "interrupted";

/// SQLite job history backend
pub struct SqliteJobStore {
    conn: Connection,
}

impl SqliteJobStore {
    /// Opens or creates the history database at `path`
    ///
    /// Parent directories are created when missing.
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn load_log(&self, job_id: u64) -> StorageResult<Vec<LogLine>> {
        let mut stmt = self
            .conn
            .prepare("SELECT logged_at, message FROM job_log WHERE job_id = ?1 ORDER BY id")?;

        let rows = stmt
            .query_map(params![job_id as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(at, message)| {
                Ok(LogLine {
                    at: parse_time(job_id, &at)?,
                    message,
                })
            })
            .collect()
    }

    fn load_artifacts(&self, job_id: u64) -> StorageResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM artifacts WHERE job_id = ?1 ORDER BY id")?;

        let names = stmt
            .query_map(params![job_id as i64], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(names)
    }
}

/// Raw `jobs` row before text columns are decoded
struct JobRow {
    id: i64,
    retailer: String,
    input: String,
    status: String,
    completion: Option<String>,
    stop_requested: bool,
    created_at: String,
    started_at: Option<String>,
    finished_at: Option<String>,
    pages: (i64, i64),
    items: (i64, i64),
    products_collected: i64,
    error: Option<String>,
    config_hash: Option<String>,
    limits: Option<String>,
}

const JOB_COLUMNS: &str = "id, retailer, input, status, completion, stop_requested, created_at, \
     started_at, finished_at, pages_current, pages_total, items_current, items_total, \
     products_collected, error, config_hash, limits";

impl JobRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            retailer: row.get(1)?,
            input: row.get(2)?,
            status: row.get(3)?,
            completion: row.get(4)?,
            stop_requested: row.get(5)?,
            created_at: row.get(6)?,
            started_at: row.get(7)?,
            finished_at: row.get(8)?,
            pages: (row.get(9)?, row.get(10)?),
            items: (row.get(11)?, row.get(12)?),
            products_collected: row.get(13)?,
            error: row.get(14)?,
            config_hash: row.get(15)?,
            limits: row.get(16)?,
        })
    }

    fn into_snapshot(self, log: Vec<LogLine>, artifacts: Vec<String>) -> StorageResult<JobSnapshot> {
        let job_id = self.id as u64;
        let corrupt = |message: String| StorageError::Corrupt { job_id, message };

        let retailer: Retailer = self
            .retailer
            .parse()
            .map_err(|_| corrupt(format!("unknown retailer '{}'", self.retailer)))?;
        let input: JobInput = serde_json::from_str(&self.input)?;
        let limits: JobLimits = match self.limits.as_deref() {
            Some(text) => serde_json::from_str(text)?,
            None => JobLimits::default(),
        };
        let status = JobStatus::from_db_string(&self.status)
            .ok_or_else(|| corrupt(format!("unknown status '{}'", self.status)))?;
        let completion = match self.completion.as_deref() {
            Some(text) => Some(
                Completion::from_db_string(text)
                    .ok_or_else(|| corrupt(format!("unknown completion '{}'", text)))?,
            ),
            None => None,
        };

        Ok(JobSnapshot {
            id: job_id,
            retailer,
            input,
            limits,
            status,
            completion,
            stop_requested: self.stop_requested,
            created_at: parse_time(job_id, &self.created_at)?,
            started_at: parse_optional_time(job_id, self.started_at.as_deref())?,
            finished_at: parse_optional_time(job_id, self.finished_at.as_deref())?,
            page_progress: Progress::new(self.pages.0 as usize, self.pages.1 as usize),
            item_progress: Progress::new(self.items.0 as usize, self.items.1 as usize),
            products_collected: self.products_collected as usize,
            log,
            artifacts,
            error: self.error,
            config_hash: self.config_hash,
        })
    }
}

fn parse_time(job_id: u64, text: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt {
            job_id,
            message: format!("bad timestamp '{}': {}", text, e),
        })
}

fn parse_optional_time(job_id: u64, text: Option<&str>) -> StorageResult<Option<DateTime<Utc>>> {
    text.map(|t| parse_time(job_id, t)).transpose()
}

impl JobStore for SqliteJobStore {
    fn record_job(&mut self, snapshot: &JobSnapshot) -> StorageResult<()> {
        let id = snapshot.id as i64;
        let input = serde_json::to_string(&snapshot.input)?;
        let limits = serde_json::to_string(&snapshot.limits)?;
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO jobs (id, retailer, input, status, completion, stop_requested, created_at,
                               started_at, finished_at, pages_current, pages_total, items_current,
                               items_total, products_collected, error, config_hash, limits)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                completion = excluded.completion,
                stop_requested = excluded.stop_requested,
                started_at = excluded.started_at,
                finished_at = excluded.finished_at,
                pages_current = excluded.pages_current,
                pages_total = excluded.pages_total,
                items_current = excluded.items_current,
                items_total = excluded.items_total,
                products_collected = excluded.products_collected,
                error = excluded.error",
            params![
                id,
                snapshot.retailer.as_str(),
                input,
                snapshot.status.to_db_string(),
                snapshot.completion.map(|c| c.to_db_string()),
                snapshot.stop_requested,
                snapshot.created_at.to_rfc3339(),
                snapshot.started_at.map(|t| t.to_rfc3339()),
                snapshot.finished_at.map(|t| t.to_rfc3339()),
                snapshot.page_progress.current as i64,
                snapshot.page_progress.total as i64,
                snapshot.item_progress.current as i64,
                snapshot.item_progress.total as i64,
                snapshot.products_collected as i64,
                snapshot.error,
                snapshot.config_hash,
                limits,
            ],
        )?;

        tx.execute("DELETE FROM job_log WHERE job_id = ?1", params![id])?;
        tx.execute("DELETE FROM artifacts WHERE job_id = ?1", params![id])?;

        {
            let mut insert_log = tx.prepare(
                "INSERT INTO job_log (job_id, logged_at, message) VALUES (?1, ?2, ?3)",
            )?;
            for line in &snapshot.log {
                insert_log.execute(params![id, line.at.to_rfc3339(), line.message])?;
            }

            let mut insert_artifact =
                tx.prepare("INSERT OR IGNORE INTO artifacts (job_id, name) VALUES (?1, ?2)")?;
            for name in &snapshot.artifacts {
                insert_artifact.execute(params![id, name])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn load_job(&self, job_id: u64) -> StorageResult<JobSnapshot> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
                params![job_id as i64],
                JobRow::from_row,
            )
            .optional()?
            .ok_or(StorageError::JobNotFound(job_id))?;

        let log = self.load_log(job_id)?;
        let artifacts = self.load_artifacts(job_id)?;
        row.into_snapshot(log, artifacts)
    }

    fn recent_jobs(&self, limit: usize) -> StorageResult<Vec<JobSnapshot>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM jobs ORDER BY id DESC LIMIT ?1",
            JOB_COLUMNS
        ))?;

        let rows = stmt
            .query_map(params![limit as i64], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|row| {
                let job_id = row.id as u64;
                let log = self.load_log(job_id)?;
                let artifacts = self.load_artifacts(job_id)?;
                row.into_snapshot(log, artifacts)
            })
            .collect()
    }

    fn max_job_id(&self) -> StorageResult<u64> {
        let max: i64 = self
            .conn
            .query_row("SELECT COALESCE(MAX(id), 0) FROM jobs", [], |row| row.get(0))?;
        Ok(max.max(0) as u64)
    }

    fn fail_interrupted(&mut self) -> StorageResult<Vec<u64>> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        let ids: Vec<i64> = {
            let mut stmt = tx.prepare(
                "SELECT id FROM jobs WHERE status IN ('pending', 'running', 'stopping') ORDER BY id",
            )?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<i64>, _>>()?;
            ids
        };

        for id in &ids {
            tx.execute(
                "UPDATE jobs SET status = ?2, error = ?3, finished_at = ?4 WHERE id = ?1",
                params![id, JobStatus::Failed.to_db_string(), INTERRUPTED, now],
            )?;
            tx.execute(
                "INSERT INTO job_log (job_id, logged_at, message) VALUES (?1, ?2, ?3)",
                params![id, now, format!("Job failed: {}", INTERRUPTED)],
            )?;
        }

        tx.commit()?;
        Ok(ids.into_iter().map(|id| id as u64).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobSpec;

    fn snapshot(id: u64) -> JobSnapshot {
        let spec = JobSpec::new(
            Retailer::HomeDepot,
            JobInput::SearchTerms(vec!["2x4".to_string(), "drywall".to_string()]),
        );
        let mut snapshot = JobSnapshot::pending(id, &spec, Some("abc".to_string()));
        snapshot.log.push(LogLine::now("Job created"));
        snapshot
    }

    #[test]
    fn test_round_trip_terminal_snapshot() {
        let mut store = SqliteJobStore::new_in_memory().unwrap();

        let mut job = snapshot(7);
        store.record_job(&job).unwrap();

        job.status = JobStatus::Completed;
        job.completion = Some(Completion::StoppedEarly);
        job.stop_requested = true;
        job.started_at = Some(Utc::now());
        job.finished_at = Some(Utc::now());
        job.page_progress = Progress::new(3, 10);
        job.item_progress = Progress::new(2, 2);
        job.products_collected = 2;
        job.log.push(LogLine::now("Saved 2 products"));
        job.artifacts.push("homedepot_results_20240309_140507.csv".to_string());
        store.record_job(&job).unwrap();

        let loaded = store.load_job(7).unwrap();
        assert_eq!(loaded.status, JobStatus::Completed);
        assert_eq!(loaded.completion, Some(Completion::StoppedEarly));
        assert!(loaded.stop_requested);
        assert_eq!(loaded.input, job.input);
        assert_eq!(loaded.page_progress, job.page_progress);
        assert_eq!(loaded.log.len(), 2);
        assert_eq!(loaded.log[1].message, "Saved 2 products");
        assert_eq!(loaded.artifacts, job.artifacts);
        assert_eq!(loaded.config_hash.as_deref(), Some("abc"));
        assert_eq!(loaded.limits, job.limits);
    }

    #[test]
    fn test_unfinished_jobs_fail_as_interrupted() {
        let mut store = SqliteJobStore::new_in_memory().unwrap();

        let pending = snapshot(1);
        let mut running = snapshot(2);
        running.status = JobStatus::Running;
        let mut done = snapshot(3);
        done.status = JobStatus::Completed;
        done.completion = Some(Completion::Exhausted);
        for job in [&pending, &running, &done] {
            store.record_job(job).unwrap();
        }

        assert_eq!(store.fail_interrupted().unwrap(), vec![1, 2]);

        let loaded = store.load_job(2).unwrap();
        assert_eq!(loaded.status, JobStatus::Failed);
        assert_eq!(loaded.error.as_deref(), Some("interrupted"));
        assert!(loaded.finished_at.is_some());
        assert_eq!(loaded.log.last().unwrap().message, "Job failed: interrupted");
        assert_eq!(store.load_job(3).unwrap().status, JobStatus::Completed);

        assert!(store.fail_interrupted().unwrap().is_empty());
    }

    #[test]
    fn test_missing_job() {
        let store = SqliteJobStore::new_in_memory().unwrap();
        assert!(matches!(store.load_job(1), Err(StorageError::JobNotFound(1))));
    }

    #[test]
    fn test_max_job_id_and_recent_jobs() {
        let mut store = SqliteJobStore::new_in_memory().unwrap();
        assert_eq!(store.max_job_id().unwrap(), 0);

        for id in [3, 9, 5] {
            store.record_job(&snapshot(id)).unwrap();
        }

        assert_eq!(store.max_job_id().unwrap(), 9);
        let recent: Vec<u64> = store.recent_jobs(2).unwrap().iter().map(|j| j.id).collect();
        assert_eq!(recent, vec![9, 5]);
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested/jobs.db");

        {
            let mut store = SqliteJobStore::new(&path).unwrap();
            store.record_job(&snapshot(4)).unwrap();
        }

        let store = SqliteJobStore::new(&path).unwrap();
        assert_eq!(store.max_job_id().unwrap(), 4);
        assert_eq!(store.load_job(4).unwrap().log[0].message, "Job created");
    }
}
