//! Aisle-Sweep main entry point
//!
//! This is the command-line interface for the Aisle-Sweep catalog harvester.

use aisle_sweep::config::{load_config_with_hash, Config};
use aisle_sweep::job::{JobController, JobInput, JobSnapshot, JobSpec, JobStatus};
use aisle_sweep::output::OutputMode;
use aisle_sweep::retailer::{resolve_category, Retailer, HOME_DEPOT_CATEGORIES};
use aisle_sweep::storage::{open_store, JobStore};
use anyhow::{bail, Context};
use clap::{ArgGroup, Parser};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Aisle-Sweep: a catalog harvester for aggregator APIs
///
/// Aisle-Sweep crawls search or category listings through the product
/// aggregator API, fetches every product's details, and writes them as CSV.
/// Press Ctrl-C once to stop and keep what was collected, twice to abandon.
#[derive(Parser, Debug)]
#[command(name = "aisle-sweep")]
#[command(version = "1.0.0")]
#[command(about = "A catalog harvester for aggregator APIs", long_about = None)]
#[command(group(ArgGroup::new("input").args(["search", "category", "urls"])))]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Retailer to harvest (home-depot or lowes)
    #[arg(short, long, default_value = "home-depot")]
    retailer: String,

    /// Search term; repeat for several terms
    #[arg(short, long, value_name = "TERM")]
    search: Vec<String>,

    /// Category id, or a Home Depot category name (see --categories)
    #[arg(short, long, value_name = "CATEGORY")]
    category: Option<String>,

    /// File with one product URL per line
    #[arg(long, value_name = "FILE")]
    urls: Option<PathBuf>,

    /// Pages per search term or category (defaults to the config value)
    #[arg(long)]
    max_pages: Option<u32>,

    /// Product limit for the whole job (defaults to the config value)
    #[arg(long)]
    max_products: Option<usize>,

    /// Vendor sort order (e.g. best_seller, price_low_to_high)
    #[arg(long)]
    sort_by: Option<String>,

    /// Output layout: template or dump (defaults to the config value)
    #[arg(long, value_name = "FORMAT")]
    format: Option<OutputMode>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the job that would run without running it
    #[arg(long, conflicts_with_all = ["history", "show", "categories"])]
    dry_run: bool,

    /// Show the most recent jobs from the history and exit
    #[arg(long, value_name = "N", num_args = 0..=1, default_missing_value = "20")]
    history: Option<usize>,

    /// Show one job from the history, with its log, and exit
    #[arg(long, value_name = "JOB_ID", conflicts_with = "history")]
    show: Option<u64>,

    /// List the built-in Home Depot categories and exit
    #[arg(long)]
    categories: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    if dotenvy::dotenv().is_ok() {
        tracing::debug!("Loaded environment from .env");
    }

    if cli.categories {
        handle_categories();
        return Ok(());
    }

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(limit) = cli.history {
        return handle_history(&config, limit);
    }
    if let Some(job_id) = cli.show {
        return handle_show(&config, job_id);
    }

    let spec = build_spec(&cli, &config)?;

    if cli.dry_run {
        handle_dry_run(&config, &spec);
        return Ok(());
    }

    handle_harvest(config, config_hash, spec).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("aisle_sweep=warn,warn"),
            1 => EnvFilter::new("aisle_sweep=info,warn"),
            2 => EnvFilter::new("aisle_sweep=debug,info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Builds the job from command-line arguments and config defaults
fn build_spec(cli: &Cli, config: &Config) -> anyhow::Result<JobSpec> {
    let retailer: Retailer = cli.retailer.parse()?;

    let input = if !cli.search.is_empty() {
        JobInput::SearchTerms(cli.search.clone())
    } else if let Some(category) = &cli.category {
        JobInput::Category(resolve_category(retailer, category).to_string())
    } else if let Some(path) = &cli.urls {
        JobInput::UrlList(read_url_file(path)?)
    } else {
        bail!("Nothing to harvest: pass --search, --category, or --urls");
    };

    let spec = JobSpec::new(retailer, input)
        .with_max_pages(cli.max_pages.unwrap_or(config.crawler.max_pages))
        .with_max_products(cli.max_products.or(config.max_products()))
        .with_sort_by(cli.sort_by.clone().or_else(|| config.crawler.sort_by.clone()))
        .with_columns(config.column_mapping())
        .with_output_mode(cli.format.unwrap_or(config.output.format));

    spec.validate()?;
    Ok(spec)
}

/// Reads product URLs, skipping blank lines and `#` comments
fn read_url_file(path: &Path) -> anyhow::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read URL list {}", path.display()))?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn handle_categories() {
    println!("Home Depot categories:");
    for (name, id) in HOME_DEPOT_CATEGORIES {
        println!("  {:<28} {}", name, id);
    }
}

/// Handles the --dry-run mode: validates config and shows the job
fn handle_dry_run(config: &Config, spec: &JobSpec) {
    println!("=== Aisle-Sweep Dry Run ===\n");

    let profile = config.profile_for(spec.retailer);
    println!("Retailer: {}", spec.retailer);
    println!("  Endpoint: {}", profile.endpoint);
    println!(
        "  API key: {}",
        if config.api_key_for(spec.retailer).is_ok() {
            "configured"
        } else {
            "MISSING"
        }
    );

    println!("\nJob:");
    println!("  Input: {}", spec.input.describe());
    println!("  Max pages: {}", spec.max_pages);
    match spec.max_products {
        Some(limit) => println!("  Max products: {}", limit),
        None => println!("  Max products: unlimited"),
    }
    if let Some(sort) = &spec.sort_by {
        println!("  Sort by: {}", sort);
    }
    println!("  Output: {}", spec.output_mode);

    println!("\nPacing:");
    println!("  Page delay: {}ms", config.crawler.page_delay_ms);
    println!("  Item delay: {}ms", config.crawler.item_delay_ms);
    println!(
        "  Retries: {} (backoff factor {})",
        config.api.max_retries, config.api.backoff_factor
    );

    println!("\nOutput:");
    println!("  Directory: {}", config.output.directory);
    println!("  History: {}", config.output.database_path);
    println!("  Columns: {}", spec.columns.headers().collect::<Vec<_>>().join(", "));

    println!("\n✓ Configuration is valid");
}

/// Handles the --history mode: lists recent jobs
fn handle_history(config: &Config, limit: usize) -> anyhow::Result<()> {
    let store = open_store(Path::new(&config.output.database_path))?;
    let jobs = store.recent_jobs(limit)?;

    if jobs.is_empty() {
        println!("No jobs recorded in {}", config.output.database_path);
        return Ok(());
    }

    println!(
        "{:>5}  {:<10}  {:<10}  {:>8}  {:<20}  INPUT",
        "ID", "RETAILER", "STATUS", "PRODUCTS", "STARTED"
    );
    for job in jobs {
        let started = job
            .started_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>5}  {:<10}  {:<10}  {:>8}  {:<20}  {}",
            job.id,
            job.retailer,
            status_label(&job),
            job.products_collected,
            started,
            job.input.describe()
        );
    }

    Ok(())
}

/// Handles the --show mode: prints one job and its log
fn handle_show(config: &Config, job_id: u64) -> anyhow::Result<()> {
    let store = open_store(Path::new(&config.output.database_path))?;
    let job = store
        .load_job(job_id)
        .with_context(|| format!("Job {} is not in the history", job_id))?;

    println!("Job {} ({})", job.id, job.retailer);
    println!("  Input: {}", job.input.describe());
    println!("  Limits: {}", job.limits);
    println!("  Status: {}", status_label(&job));
    println!("  Products: {}", job.products_collected);
    if let Some(error) = &job.error {
        println!("  Error: {}", error);
    }
    for artifact in &job.artifacts {
        println!("  Artifact: {}", artifact);
    }
    println!("\nLog:");
    for line in &job.log {
        println!("  {}", line);
    }

    Ok(())
}

fn status_label(job: &JobSnapshot) -> String {
    match (job.status, job.completion) {
        (JobStatus::Completed, Some(completion)) if job.stop_requested => {
            format!("completed ({})", completion.to_db_string())
        }
        (status, _) => status.to_string(),
    }
}

/// Runs one job, streaming its log until it finishes
async fn handle_harvest(config: Config, config_hash: String, spec: JobSpec) -> anyhow::Result<()> {
    let store = open_store(Path::new(&config.output.database_path))
        .context("Failed to open job history")?;
    let controller = JobController::with_history(config, store, Some(config_hash))?;

    let job_id = controller.start(spec)?;
    let mut rx = controller.subscribe(job_id)?;
    let mut printed = 0usize;
    let mut interrupts = 0u8;

    loop {
        let snapshot = rx.borrow_and_update().clone();
        for line in snapshot.log.iter().skip(printed) {
            println!("{}", line);
        }
        printed = snapshot.log.len();

        if snapshot.is_terminal() {
            break;
        }

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                interrupts += 1;
                if interrupts == 1 {
                    eprintln!("Stopping after the current step; press Ctrl-C again to abandon the job");
                    controller.request_stop(job_id)?;
                } else {
                    eprintln!("Abandoning job {}", job_id);
                    controller.cancel(job_id).await?;
                }
            }
        }
    }

    let finished = controller.join(job_id).await?;
    for line in finished.log.iter().skip(printed) {
        println!("{}", line);
    }

    for name in &finished.artifacts {
        let path = controller.artifact_path(job_id, name)?;
        println!("Results: {}", path.display());
    }

    match finished.status {
        JobStatus::Failed => bail!(
            "Job {} failed: {}",
            job_id,
            finished.error.as_deref().unwrap_or("unknown error")
        ),
        JobStatus::Cancelled => bail!("Job {} was cancelled", job_id),
        _ => Ok(()),
    }
}
