//! Per-job worker task
//!
//! One worker runs each job: wait for a pool slot, crawl, fetch, write, and
//! publish the terminal state.

use super::recorder::JobRecorder;
use super::types::{Completion, JobInput, JobSpec};
use crate::api::ApiClient;
use crate::config::Config;
use crate::crawler::{
    seed_from_list, DetailFetcher, ListingSource, PaginationCrawler, Product, RawArchive,
    StopReason,
};
use crate::output::{write_results, WriteRequest};
use crate::storage::{JobStore, SqliteJobStore};
use crate::url::ProductUrlSet;
use crate::HarvestError;
use chrono::Utc;
use std::any::Any;
use std::future::Future;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Shared history handle
pub type SharedStore = Arc<Mutex<SqliteJobStore>>;

/// Everything one worker needs, owned by the worker task
pub struct WorkerContext {
    pub spec: JobSpec,
    pub config: Arc<Config>,
    pub client: ApiClient,
    pub job_dir: PathBuf,
    pub semaphore: Arc<Semaphore>,
    pub store: Option<SharedStore>,
}

#[derive(Debug)]
enum Outcome {
    Finished(Completion),
    Failed(String),
    Cancelled,
}

/// Records the current snapshot in the history, logging failures
pub fn persist(store: Option<&SharedStore>, recorder: &JobRecorder) {
    let Some(store) = store else {
        return;
    };
    let snapshot = recorder.snapshot();
    let result = match store.lock() {
        Ok(mut guard) => guard.record_job(&snapshot),
        Err(poisoned) => poisoned.into_inner().record_job(&snapshot),
    };
    if let Err(e) = result {
        tracing::warn!("Failed to record job {} in history: {}", snapshot.id, e);
    }
}

/// Runs one job to a terminal state
///
/// `abort` drops the in-flight work immediately; `stop` is honored at the
/// next checkpoint and the collected products are still written. A panic in
/// the work ends the job as failed.
pub async fn run_worker(
    ctx: WorkerContext,
    recorder: JobRecorder,
    stop: CancellationToken,
    abort: CancellationToken,
) {
    let ctx = Arc::new(ctx);
    let recorder = Arc::new(recorder);

    let work = {
        let ctx = Arc::clone(&ctx);
        let recorder = Arc::clone(&recorder);
        async move { drive(&ctx, &recorder, &stop).await }
    };

    match supervise(work, &abort).await {
        Outcome::Finished(completion) => recorder.complete(completion),
        Outcome::Failed(error) => recorder.fail(error),
        Outcome::Cancelled => recorder.cancel(),
    }

    persist(ctx.store.as_ref(), &recorder);
}

/// Runs `work` on its own task until it finishes, panics, or `abort` fires
async fn supervise<F>(work: F, abort: &CancellationToken) -> Outcome
where
    F: Future<Output = Outcome> + Send + 'static,
{
    let task = tokio::spawn(work);
    let abort_handle = task.abort_handle();

    tokio::select! {
        biased;
        _ = abort.cancelled() => {
            abort_handle.abort();
            Outcome::Cancelled
        }
        joined = task => match joined {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => {
                Outcome::Failed(format!("worker panicked: {}", panic_message(e.into_panic())))
            }
            Err(_) => Outcome::Cancelled,
        },
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn drive(ctx: &WorkerContext, recorder: &JobRecorder, stop: &CancellationToken) -> Outcome {
    let _permit = match ctx.semaphore.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return Outcome::Failed("worker pool is closed".to_string()),
    };

    recorder.mark_running();
    persist(ctx.store.as_ref(), recorder);

    let work = execute(ctx, recorder, stop);
    tokio::pin!(work);

    let mut stop_seen = false;
    loop {
        // Stop is polled first so a stop that ends the work is always recorded
        tokio::select! {
            biased;
            _ = stop.cancelled(), if !stop_seen => {
                stop_seen = true;
                recorder.mark_stopping();
            }
            result = &mut work => {
                return match result {
                    Ok(completion) => Outcome::Finished(completion),
                    Err(e) => Outcome::Failed(e.to_string()),
                };
            }
        }
    }
}

/// Crawl, fetch, and write for one job
async fn execute(
    ctx: &WorkerContext,
    recorder: &JobRecorder,
    stop: &CancellationToken,
) -> Result<Completion, HarvestError> {
    let spec = &ctx.spec;
    let profile = ctx.client.profile();

    std::fs::create_dir_all(&ctx.job_dir)?;
    let archive = if ctx.config.output.save_raw {
        Some(RawArchive::create(&ctx.job_dir)?)
    } else {
        None
    };

    recorder.log(format!(
        "Harvesting {} ({})",
        profile.retailer,
        spec.input.describe()
    ));

    let mut urls = ProductUrlSet::new();
    collect_urls(ctx, recorder, stop, archive.as_ref(), &mut urls).await;
    recorder.log(format!("Found {} unique product URLs", urls.len()));

    let fetcher = DetailFetcher::new(
        &ctx.client,
        Duration::from_millis(ctx.config.crawler.item_delay_ms),
    )
    .with_archive(archive.as_ref());

    let mut products: Vec<Product> = Vec::with_capacity(urls.len());
    recorder.set_item_progress(0, urls.len());
    let summary = fetcher
        .fetch(&urls, &mut products, stop, |current, total, message| {
            recorder.set_item_progress(current, total);
            recorder.log(format!("[{}/{}] {}", current, total, message));
            ControlFlow::Continue(())
        })
        .await;
    recorder.set_products_collected(products.len());

    if summary.failed > 0 {
        recorder.log(format!(
            "Fetched {} products, {} failed",
            summary.fetched, summary.failed
        ));
    }

    if products.is_empty() {
        recorder.log("WARNING: No products found to save");
    } else {
        let results_dir = ctx.job_dir.join("results");
        let request = WriteRequest {
            directory: &results_dir,
            prefix: profile.artifact_prefix,
            mode: spec.output_mode,
            mapping: &spec.columns,
            supplier: profile.supplier_label,
            timestamp: Utc::now(),
        };
        let artifact = write_results(&products, &request)?;
        recorder.add_artifact(artifact.name.clone());
        recorder.log(format!(
            "Saved {} products to {} ({} writer)",
            artifact.rows, artifact.name, artifact.strategy
        ));
    }

    Ok(if stop.is_cancelled() {
        Completion::StoppedEarly
    } else {
        Completion::Exhausted
    })
}

/// Fills `urls` from the job input
async fn collect_urls(
    ctx: &WorkerContext,
    recorder: &JobRecorder,
    stop: &CancellationToken,
    archive: Option<&RawArchive>,
    urls: &mut ProductUrlSet,
) {
    let spec = &ctx.spec;

    let sources: Vec<ListingSource> = match &spec.input {
        JobInput::UrlList(raw) => {
            let rejected = seed_from_list(ctx.client.profile(), raw, spec.max_products, urls);
            for (url, reason) in rejected {
                recorder.log(format!("Skipping URL '{}': {}", url, reason));
            }
            return;
        }
        JobInput::SearchTerms(terms) => terms
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(|t| ListingSource::Search(t.to_string()))
            .collect(),
        JobInput::Category(id) => vec![ListingSource::Category(id.trim().to_string())],
    };

    let crawler = PaginationCrawler::new(
        &ctx.client,
        Duration::from_millis(ctx.config.crawler.page_delay_ms),
    )
    .with_sort(spec.sort_by.clone())
    .with_archive(archive);

    let total_pages = sources.len() * spec.max_pages as usize;
    let mut pages_done = 0usize;
    recorder.set_page_progress(0, total_pages);

    for source in &sources {
        let budget = spec.max_products.map(|max| max.saturating_sub(urls.len()));
        if budget == Some(0) {
            recorder.log(format!("Product limit reached, skipping {}", source));
            continue;
        }
        if stop.is_cancelled() {
            break;
        }

        recorder.log(format!("Crawling {}", source));
        let done_before = pages_done;
        let report = crawler
            .crawl(source, spec.max_pages, budget, urls, stop, |event| {
                recorder.set_page_progress(done_before + event.page as usize, total_pages);
                recorder.log(format!(
                    "{} page {}: {} listings, {} new URLs",
                    source, event.page, event.listings, event.added
                ));
            })
            .await;
        pages_done += report.pages_fetched as usize;

        let message = format!(
            "Finished {}: {} pages, {} new URLs, {} skipped listings ({})",
            source, report.pages_fetched, report.added, report.skipped, report.stop_reason
        );
        match report.stop_reason {
            StopReason::UnrecognizedShape(_) => {
                recorder.log(format!("WARNING: no data for this step. {}", message))
            }
            StopReason::Failed(_) => recorder.log(format!("ERROR: {}", message)),
            _ => recorder.log(message),
        }

        if report.stop_reason == StopReason::Stopped {
            break;
        }
    }

    recorder.set_page_progress(pages_done, total_pages);
}
