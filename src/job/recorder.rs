//! Owned job state published as snapshots

use super::types::{Completion, JobSnapshot, JobStatus, LogLine, Progress};
use chrono::Utc;
use tokio::sync::watch;

/// Write side of one job's state
///
/// Only the job's worker holds a recorder; everyone else reads snapshots
/// through a `watch::Receiver`. Once a terminal status is published every
/// further update is ignored.
#[derive(Debug)]
pub struct JobRecorder {
    id: u64,
    tx: watch::Sender<JobSnapshot>,
}

impl JobRecorder {
    pub fn new(snapshot: JobSnapshot) -> (Self, watch::Receiver<JobSnapshot>) {
        let id = snapshot.id;
        let (tx, rx) = watch::channel(snapshot);
        (Self { id, tx }, rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<JobSnapshot> {
        self.tx.subscribe()
    }

    fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut JobSnapshot),
    {
        self.tx.send_if_modified(|snapshot| {
            if snapshot.status.is_terminal() {
                return false;
            }
            f(snapshot);
            true
        });
    }

    /// Appends a timestamped line to the job log
    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("[job {}] {}", self.id, message);
        self.update(|s| s.log.push(LogLine::now(message)));
    }

    pub fn mark_running(&self) {
        self.update(|s| {
            s.status = JobStatus::Running;
            s.started_at = Some(Utc::now());
            s.log.push(LogLine::now("Job started"));
        });
        tracing::info!("[job {}] Job started", self.id);
    }

    pub fn mark_stopping(&self) {
        self.update(|s| {
            s.stop_requested = true;
            if s.status == JobStatus::Running {
                s.status = JobStatus::Stopping;
            }
            s.log.push(LogLine::now("Stop requested"));
        });
        tracing::info!("[job {}] Stop requested", self.id);
    }

    pub fn set_page_progress(&self, current: usize, total: usize) {
        self.update(|s| s.page_progress = Progress::new(current, total));
    }

    pub fn set_item_progress(&self, current: usize, total: usize) {
        self.update(|s| s.item_progress = Progress::new(current, total));
    }

    pub fn set_products_collected(&self, count: usize) {
        self.update(|s| s.products_collected = count);
    }

    pub fn add_artifact(&self, name: impl Into<String>) {
        let name = name.into();
        self.update(|s| {
            if !s.artifacts.contains(&name) {
                s.artifacts.push(name);
            }
        });
    }

    pub fn complete(&self, completion: Completion) {
        let message = match completion {
            Completion::Exhausted => "Job completed",
            Completion::StoppedEarly => "Job stopped early; collected results were saved",
        };
        tracing::info!("[job {}] {}", self.id, message);
        self.update(|s| {
            s.log.push(LogLine::now(message));
            s.status = JobStatus::Completed;
            s.completion = Some(completion);
            s.finished_at = Some(Utc::now());
        });
    }

    pub fn fail(&self, error: impl Into<String>) {
        let error = error.into();
        tracing::error!("[job {}] Job failed: {}", self.id, error);
        self.update(|s| {
            s.log.push(LogLine::now(format!("Job failed: {}", error)));
            s.status = JobStatus::Failed;
            s.error = Some(error);
            s.finished_at = Some(Utc::now());
        });
    }

    pub fn cancel(&self) {
        tracing::info!("[job {}] Job cancelled", self.id);
        self.update(|s| {
            s.log.push(LogLine::now("Job cancelled"));
            s.status = JobStatus::Cancelled;
            s.finished_at = Some(Utc::now());
        });
    }
}
