//! Job controller and bounded worker pool

use super::recorder::JobRecorder;
use super::types::{JobSnapshot, JobSpec};
use super::worker::{persist, run_worker, SharedStore, WorkerContext};
use crate::api::ApiClient;
use crate::config::Config;
use crate::storage::{JobStore, SqliteJobStore, StorageError};
use crate::HarvestError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct JobEntry {
    rx: watch::Receiver<JobSnapshot>,
    stop: CancellationToken,
    abort: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl JobEntry {
    fn is_terminal(&self) -> bool {
        self.rx.borrow().is_terminal()
    }
}

struct Inner {
    config: Arc<Config>,
    config_hash: Option<String>,
    store: Option<SharedStore>,
    semaphore: Arc<Semaphore>,
    next_id: AtomicU64,
    jobs: Mutex<BTreeMap<u64, JobEntry>>,
}

/// Starts, observes, stops, and cancels harvesting jobs
///
/// Cloning is cheap; clones share the same pool and job table.
#[derive(Clone)]
pub struct JobController {
    inner: Arc<Inner>,
}

impl JobController {
    /// Creates a controller without a persistent history
    pub fn new(config: Config) -> Self {
        Self::build(config, None, None, 0)
    }

    /// Creates a controller that records jobs in `store`
    ///
    /// Job ids continue after the highest id already in the history. Jobs a
    /// previous process left unfinished are marked failed.
    pub fn with_history(
        config: Config,
        mut store: SqliteJobStore,
        config_hash: Option<String>,
    ) -> Result<Self, HarvestError> {
        for id in store.fail_interrupted()? {
            tracing::warn!("Job {} was interrupted by a previous run; marked failed", id);
        }
        let last_id = store.max_job_id()?;
        Ok(Self::build(
            config,
            Some(Arc::new(Mutex::new(store))),
            config_hash,
            last_id,
        ))
    }

    fn build(
        config: Config,
        store: Option<SharedStore>,
        config_hash: Option<String>,
        last_id: u64,
    ) -> Self {
        let permits = config.pool.max_concurrent_jobs.max(1);
        Self {
            inner: Arc::new(Inner {
                config: Arc::new(config),
                config_hash,
                store,
                semaphore: Arc::new(Semaphore::new(permits)),
                next_id: AtomicU64::new(last_id + 1),
                jobs: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    fn jobs(&self) -> MutexGuard<'_, BTreeMap<u64, JobEntry>> {
        match self.inner.jobs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Directory holding everything job `job_id` writes
    pub fn job_dir(&self, job_id: u64) -> PathBuf {
        Path::new(&self.inner.config.output.directory).join(format!("job_{}", job_id))
    }

    /// Validates `spec`, allocates a pending job, and spawns its worker
    ///
    /// Must be called from within a tokio runtime. Fails with
    /// `PoolSaturated` when pending plus running jobs already fill the
    /// pool and its queue.
    pub fn start(&self, spec: JobSpec) -> Result<u64, HarvestError> {
        spec.validate()?;

        let config = &self.inner.config;
        let api_key = config.api_key_for(spec.retailer)?;
        let client = ApiClient::new(config.profile_for(spec.retailer), api_key, &config.api)?;

        let mut jobs = self.jobs();

        let limit = config.pool.max_concurrent_jobs + config.pool.max_queued_jobs;
        let active = jobs.values().filter(|e| !e.is_terminal()).count();
        if active >= limit {
            return Err(HarvestError::PoolSaturated { limit });
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let snapshot = JobSnapshot::pending(id, &spec, self.inner.config_hash.clone());
        let (recorder, rx) = JobRecorder::new(snapshot);
        recorder.log(format!(
            "Job created for {} ({})",
            spec.retailer,
            spec.input.describe()
        ));
        persist(self.inner.store.as_ref(), &recorder);

        let stop = CancellationToken::new();
        let abort = CancellationToken::new();
        let ctx = WorkerContext {
            spec,
            config: Arc::clone(config),
            client,
            job_dir: self.job_dir(id),
            semaphore: Arc::clone(&self.inner.semaphore),
            store: self.inner.store.clone(),
        };
        let handle = tokio::spawn(run_worker(ctx, recorder, stop.clone(), abort.clone()));

        jobs.insert(
            id,
            JobEntry {
                rx,
                stop,
                abort,
                handle: Some(handle),
            },
        );
        self.evict_finished(&mut jobs);

        Ok(id)
    }

    /// Drops the oldest terminal jobs beyond the retention limit
    fn evict_finished(&self, jobs: &mut BTreeMap<u64, JobEntry>) {
        let retain = self.inner.config.pool.retain_finished;
        let finished: Vec<u64> = jobs
            .iter()
            .filter(|(_, e)| e.is_terminal())
            .map(|(id, _)| *id)
            .collect();

        if finished.len() > retain {
            for id in &finished[..finished.len() - retain] {
                jobs.remove(id);
                tracing::debug!("Evicted job {} from memory", id);
            }
        }
    }

    /// Returns a snapshot of job `job_id`
    ///
    /// Jobs no longer in memory are loaded from the history.
    pub fn status(&self, job_id: u64) -> Result<JobSnapshot, HarvestError> {
        if let Some(entry) = self.jobs().get(&job_id) {
            return Ok(entry.rx.borrow().clone());
        }

        let Some(store) = &self.inner.store else {
            return Err(HarvestError::JobNotFound(job_id));
        };
        let store = match store.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        store.load_job(job_id).map_err(|e| match e {
            StorageError::JobNotFound(id) => HarvestError::JobNotFound(id),
            other => HarvestError::Storage(other),
        })
    }

    /// Returns a receiver notified on every change to job `job_id`
    pub fn subscribe(&self, job_id: u64) -> Result<watch::Receiver<JobSnapshot>, HarvestError> {
        self.jobs()
            .get(&job_id)
            .map(|entry| entry.rx.clone())
            .ok_or(HarvestError::JobNotFound(job_id))
    }

    /// Snapshots of every job in memory, ordered by id
    pub fn list(&self) -> Vec<JobSnapshot> {
        self.jobs()
            .values()
            .map(|entry| entry.rx.borrow().clone())
            .collect()
    }

    /// Asks job `job_id` to stop at its next checkpoint
    ///
    /// Products collected so far are still written and the job completes.
    /// Has no effect on a job that already finished.
    pub fn request_stop(&self, job_id: u64) -> Result<(), HarvestError> {
        let jobs = self.jobs();
        let entry = jobs.get(&job_id).ok_or(HarvestError::JobNotFound(job_id))?;
        if !entry.is_terminal() {
            entry.stop.cancel();
        }
        Ok(())
    }

    /// Abandons job `job_id` without saving anything
    ///
    /// Returns once the terminal state is published. A job that already
    /// finished keeps its status.
    pub async fn cancel(&self, job_id: u64) -> Result<JobSnapshot, HarvestError> {
        let rx = {
            let jobs = self.jobs();
            let entry = jobs.get(&job_id).ok_or(HarvestError::JobNotFound(job_id))?;
            entry.abort.cancel();
            entry.rx.clone()
        };
        wait_terminal(job_id, rx).await
    }

    /// Waits until job `job_id` reaches a terminal state
    pub async fn join(&self, job_id: u64) -> Result<JobSnapshot, HarvestError> {
        let rx = self.subscribe(job_id)?;
        wait_terminal(job_id, rx).await
    }

    /// Path of artifact `name` produced by job `job_id`
    pub fn artifact_path(&self, job_id: u64, name: &str) -> Result<PathBuf, HarvestError> {
        let snapshot = self.status(job_id)?;
        if !snapshot.artifacts.iter().any(|a| a == name) {
            return Err(HarvestError::ArtifactNotFound {
                job_id,
                name: name.to_string(),
            });
        }
        Ok(self.job_dir(job_id).join("results").join(name))
    }

    /// Requests a stop on every job and waits for all workers to exit
    pub async fn shutdown(&self) -> Vec<JobSnapshot> {
        let handles: Vec<(u64, JoinHandle<()>)> = {
            let mut jobs = self.jobs();
            jobs.iter_mut()
                .filter_map(|(id, entry)| {
                    entry.stop.cancel();
                    entry.handle.take().map(|h| (*id, h))
                })
                .collect()
        };

        for (id, handle) in handles {
            if let Err(e) = handle.await {
                tracing::error!("Worker for job {} exited abnormally: {}", id, e);
            }
        }

        self.list()
    }
}

async fn wait_terminal(
    job_id: u64,
    mut rx: watch::Receiver<JobSnapshot>,
) -> Result<JobSnapshot, HarvestError> {
    let result = rx.wait_for(|snapshot| snapshot.is_terminal()).await;
    match result {
        Ok(snapshot) => Ok(snapshot.clone()),
        Err(_) => Err(HarvestError::WorkerPanicked {
            job_id,
            message: "worker exited without publishing a terminal state".to_string(),
        }),
    }
}
