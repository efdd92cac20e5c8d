//! Job lifecycle management
//!
//! This module handles everything around one harvesting run:
//! - Job specifications, statuses, progress counters, and logs
//! - Owned per-job state published as immutable snapshots
//! - A bounded worker pool with graceful stop and immediate cancel
//! - Recording finished jobs in the history

mod controller;
mod recorder;
mod types;
mod worker;

pub use controller::JobController;
pub use recorder::JobRecorder;
pub use types::{
    Completion, JobInput, JobLimits, JobSnapshot, JobSpec, JobStatus, LogLine, Progress,
};
