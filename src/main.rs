use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use futures::stream::{self, Stream, StreamExt};
use log::{LevelFilter, info};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

mod cli;

use cli::Cli;
use cli::commands::Commands;
use repominer::config::Config;
use repominer::coordination::{StopReason, StopSignal};
use repominer::crawler::GithubCrawler;
use repominer::miner::GitLogMiner;
use repominer::planner::ShardPlanner;
use repominer::reporter::Reporter;
use repominer::runner::{MiningRun, RunResult, discover_into_store};
use repominer::sampler::quota_status;
use repominer::store::{CompletionStore, MinerStore};

fn setup_logging(level: LevelFilter) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("repominer")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("repominer.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn log_level(config: &Config, verbose: bool) -> LevelFilter {
    if verbose {
        return LevelFilter::Debug;
    }
    config
        .log_level
        .as_deref()
        .and_then(|l| l.parse().ok())
        .unwrap_or(LevelFilter::Info)
}

/// Exit code for a forced shutdown (128 + SIGINT).
const FORCED_EXIT_CODE: i32 = 130;

/// First Ctrl-C trips the stop signal; a second one exits immediately.
fn spawn_interrupt_handler(stop: StopSignal) {
    tokio::spawn(async move {
        let interrupts = stream::unfold((), |_| async { tokio::signal::ctrl_c().await.ok().map(|_| ((), ())) });
        if watch_interrupts(Box::pin(interrupts), stop).await {
            eprintln!("{}", "Interrupted again, exiting without draining".red());
            std::process::exit(FORCED_EXIT_CODE);
        }
    });
}

/// Trip `stop` on the first interrupt. Returns true once a second interrupt
/// arrives, false if the stream ends first.
async fn watch_interrupts<S>(mut interrupts: S, stop: StopSignal) -> bool
where
    S: Stream<Item = ()> + Unpin,
{
    if interrupts.next().await.is_none() {
        return false;
    }
    info!("Interrupt received, stopping");
    stop.trip(StopReason::Interrupt);
    interrupts.next().await.is_some()
}

async fn run_application(cli: &Cli, config: Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    let store = Arc::new(MinerStore::open_at(&config.storage.data_dir).context("Failed to open store")?);

    match &cli.command {
        Commands::Run { discover } => handle_run_command(*discover, config, store).await,
        Commands::Discover { size_hints } => handle_discover_command(*size_hints, &config, &store).await,
        Commands::Status => handle_status_command(&config, &store),
        Commands::Plan { name } => handle_plan_command(name, &config, &store).await,
    }
}

async fn handle_run_command(discover: bool, config: Config, store: Arc<MinerStore>) -> Result<()> {
    let stop = StopSignal::new();
    spawn_interrupt_handler(stop.clone());
    let (reporter, render) = Reporter::console();

    let crawler = Arc::new(GithubCrawler::new(&config.github, stop.clone()).context("Failed to build API client")?);

    if discover {
        let discovered = discover_into_store(&crawler, &store, &config, true, &reporter).await;
        if let Err(e) = discovered {
            reporter.error(format!("Discovery failed: {}", e));
            reporter.finish(render).await;
            return Err(e).context("Discovery failed");
        }
    }

    let miner = Arc::new(GitLogMiner::new(
        config.mining.clone_dir.clone(),
        config.mining.batch_size,
        store.clone(),
    ));
    let run = MiningRun::new(config, store, crawler, miner, stop, reporter.clone());
    let result = run.execute().await;
    drop(run);
    reporter.finish(render).await;

    match result.context("Mining run failed")? {
        RunResult::QuotaMet(_) => println!("{}", "Nothing to do: quotas are met".green()),
        RunResult::HaltedBeforeMining(_) => return Err(eyre!("Run halted before mining")),
        RunResult::Mined { report, .. } => {
            if let Some(reason) = report.stop_reason {
                return Err(eyre!("Run stopped: {}", reason));
            }
        }
    }
    Ok(())
}

async fn handle_discover_command(size_hints: bool, config: &Config, store: &MinerStore) -> Result<()> {
    let stop = StopSignal::new();
    spawn_interrupt_handler(stop.clone());
    let (reporter, render) = Reporter::console();

    let crawler = GithubCrawler::new(&config.github, stop).context("Failed to build API client")?;
    let result = discover_into_store(&crawler, store, config, size_hints, &reporter).await;
    reporter.finish(render).await;

    let stored = result.context("Discovery failed")?;
    println!("{} {} candidates stored", "Discovered:".green(), stored);
    Ok(())
}

fn handle_status_command(config: &Config, store: &MinerStore) -> Result<()> {
    let candidates = store.all_candidates().context("Failed to read candidates")?;
    let completed = store
        .completed_project_names()
        .context("Failed to read completed projects")?;
    let status = quota_status(
        &candidates,
        &completed,
        config.quota.target_per_category,
        &config.quota.categories,
    );

    println!(
        "{:<10} {:>6} {:>10} {:>7} {:>8}",
        "Category".bold(),
        "Mined".bold(),
        "Available".bold(),
        "Target".bold(),
        "Done".bold()
    );
    for quota in status {
        let pct = format!("{:.0}%", quota.percent_of_target());
        let pct = if quota.needed() == 0 { pct.green() } else { pct.yellow() };
        println!(
            "{:<10} {:>6} {:>10} {:>7} {:>8}",
            quota.category.as_str(),
            quota.completed,
            quota.available,
            quota.target,
            pct
        );
    }
    Ok(())
}

async fn handle_plan_command(name: &str, config: &Config, store: &MinerStore) -> Result<()> {
    let candidate = store
        .candidate(name)
        .context("Failed to read candidates")?
        .ok_or_else(|| eyre!("Unknown candidate: {}", name))?;

    let stop = StopSignal::new();
    let crawler = Arc::new(GithubCrawler::new(&config.github, stop.clone()).context("Failed to build API client")?);
    let planner = ShardPlanner::new(crawler, &config.planning, stop);
    let shards = planner.plan_shards(&candidate).await;

    println!(
        "{} {} [{}]: {} shards",
        "Plan:".cyan(),
        candidate.name,
        candidate.category,
        shards.len()
    );
    for shard in shards {
        println!("  {}", shard.window_label());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging once the level is known
    setup_logging(log_level(&config, cli.is_verbose())).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, config).await.context("Application failed")?;

    Ok(())
}
