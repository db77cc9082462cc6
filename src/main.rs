//! Jira-Harvest main entry point
//!
//! This is the command-line interface for the resumable Jira issue harvester.

use anyhow::{bail, Context};
use clap::Parser;
use jira_harvest::config::{load_config_with_hash, validate, Config};
use jira_harvest::harvest::cancel_on_ctrl_c;
use jira_harvest::output::{load_statistics, print_statistics, JsonlSink};
use jira_harvest::{
    CancelFlag, CollectionKey, CollectionOutcome, JiraClient, Orchestrator, ProgressStore,
    RunReport,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit status when a collection aborted
const EXIT_ABORTED: u8 = 1;

/// Exit status for fatal errors
const EXIT_FATAL: u8 = 2;

/// Exit status when the run was interrupted
const EXIT_INTERRUPTED: u8 = 130;

/// Jira-Harvest: a resumable issue harvester
///
/// Jira-Harvest pages through Jira projects, turns every issue into a JSONL
/// training record and checkpoints after each durable write, so an interrupted
/// run resumes where it left off.
#[derive(Parser, Debug)]
#[command(name = "jira-harvest")]
#[command(version)]
#[command(about = "A resumable Jira issue harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Project keys to harvest, overriding the configuration
    #[arg(long, num_args = 1.., value_name = "KEY")]
    projects: Vec<String>,

    /// Output JSONL file
    #[arg(long, value_name = "PATH")]
    output: Option<String>,

    /// Progress state file or database
    #[arg(long, value_name = "PATH")]
    state: Option<String>,

    /// Issues requested per page
    #[arg(long, value_name = "N")]
    page_size: Option<u32>,

    /// Records written per checkpoint
    #[arg(long, value_name = "N")]
    batch_size: Option<usize>,

    /// Pause before every request, in seconds
    #[arg(long, value_name = "SECS")]
    delay: Option<f64>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Reset all progress state before harvesting
    #[arg(long, conflicts_with = "reset_project")]
    fresh: bool,

    /// Reset the progress state of one project and exit
    #[arg(long, value_name = "KEY", conflicts_with_all = ["dry_run", "stats"])]
    reset_project: Option<String>,

    /// Validate config and show what would be harvested without harvesting
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the progress state and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = load_effective_config(&cli)?;

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(ExitCode::SUCCESS);
    }
    if cli.stats {
        handle_stats(&config)?;
        return Ok(ExitCode::SUCCESS);
    }
    if let Some(project) = &cli.reset_project {
        handle_reset_project(&config, project)?;
        return Ok(ExitCode::SUCCESS);
    }

    handle_harvest(config, cli.fresh).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("jira_harvest=info,warn"),
            1 => EnvFilter::new("jira_harvest=debug,info"),
            2 => EnvFilter::new("jira_harvest=trace,debug"),
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

/// Loads the configuration file (if any) and applies command-line overrides
fn load_effective_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => {
            tracing::info!("No configuration file given, using defaults");
            Config::default()
        }
    };

    if !cli.projects.is_empty() {
        config.harvest.projects = cli.projects.clone();
    }
    if let Some(output) = &cli.output {
        config.output.path = output.clone();
    }
    if let Some(state) = &cli.state {
        config.state.path = state.clone();
    }
    if let Some(page_size) = cli.page_size {
        config.harvest.page_size = page_size;
    }
    if let Some(batch_size) = cli.batch_size {
        config.harvest.batch_size = batch_size;
    }
    if let Some(delay) = cli.delay {
        if !delay.is_finite() || delay < 0.0 {
            bail!("--delay must be a non-negative number of seconds");
        }
        config.remote.request_delay_ms = (delay * 1000.0).round() as u64;
    }

    validate(&config).context("Invalid configuration")?;
    Ok(config)
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Jira-Harvest Dry Run ===\n");

    println!("Remote:");
    println!("  Base URL: {}", config.remote.base_url);
    println!("  Timeout: {}s", config.remote.timeout_secs);
    println!("  Max attempts: {}", config.remote.max_attempts);
    println!(
        "  Backoff: {}ms base, {}ms max, {}ms on rate limit",
        config.remote.base_delay_ms, config.remote.max_delay_ms, config.remote.rate_limit_delay_ms
    );
    println!("  Request delay: {}ms", config.remote.request_delay_ms);

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.client_name);
    println!("  Version: {}", config.user_agent.client_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nHarvest:");
    println!("  Page size: {}", config.harvest.page_size);
    println!("  Batch size: {}", config.harvest.batch_size);
    println!("  Failure threshold: {}", config.harvest.failure_threshold);
    println!("  JQL: {}", config.harvest.jql);

    println!("\nState: {} ({:?})", config.state.path, config.state.backend);
    println!("Output: {}", config.output.path);

    println!("\nProjects ({}):", config.harvest.projects.len());
    for project in &config.harvest.projects {
        println!("  - {}", project);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the progress state
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let store = ProgressStore::from_config(&config.state)?;
    let stats = load_statistics(store.snapshot(), store.location());
    print_statistics(&stats);
    Ok(())
}

/// Handles --reset-project: clears one project's progress
fn handle_reset_project(config: &Config, project: &str) -> anyhow::Result<()> {
    let mut store = ProgressStore::from_config(&config.state)?;
    let key = CollectionKey::new(project);

    if store.reset_collection(&key) {
        store.persist()?;
        println!("✓ Reset state for {}", key);
    } else {
        println!("No state recorded for {}", key);
    }
    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config, fresh: bool) -> anyhow::Result<ExitCode> {
    let mut store = ProgressStore::from_config(&config.state)?;
    if fresh {
        tracing::info!("Starting fresh harvest (resetting all progress)");
        store.reset_all();
        store.persist()?;
    } else {
        tracing::info!("Starting harvest (resuming from saved progress)");
    }

    let source = JiraClient::from_config(&config)?;
    let sink = JsonlSink::open(&config.output.path)?;

    let cancel = CancelFlag::new();
    cancel_on_ctrl_c(cancel.clone());

    let collections: Vec<CollectionKey> = config
        .harvest
        .projects
        .iter()
        .map(|p| CollectionKey::new(p.as_str()))
        .collect();
    tracing::info!("Projects: {}", config.harvest.projects.join(", "));

    let mut orchestrator =
        Orchestrator::new(source, sink, store, &config.harvest).with_cancel_flag(cancel);
    let report = orchestrator.run(&collections).await?;

    print_summary(&report, &config);

    let code = if report.any_aborted() {
        ExitCode::from(EXIT_ABORTED)
    } else if report.was_interrupted() {
        ExitCode::from(EXIT_INTERRUPTED)
    } else {
        ExitCode::SUCCESS
    };
    Ok(code)
}

fn print_summary(report: &RunReport, config: &Config) {
    println!("\n=== Harvest Summary ===\n");
    println!("Output file: {}", config.output.path);
    println!("Records written this run: {}", report.total_emitted());
    println!("Items failed this run: {}", report.total_failed());

    println!("\nPer-project breakdown:");
    for collection in &report.collections {
        let mark = match collection.outcome {
            CollectionOutcome::Done => "✓",
            CollectionOutcome::Interrupted => "…",
            CollectionOutcome::Aborted { .. } => "✗",
        };
        println!(
            "  {} {}: {} written, {} skipped, {} failed ({})",
            mark,
            collection.collection,
            collection.emitted,
            collection.skipped,
            collection.failed,
            collection.outcome
        );
    }

    if report.was_interrupted() {
        println!("\nInterrupted. Progress is saved; run again to resume.");
    }
}
