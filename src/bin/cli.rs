//! Tunnelwatch CLI
//!
//! Local execution entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tunnelwatch::{
    alert::LogDispatcher,
    bridge::{self, BackgroundMessage, FeedProbe, ForegroundMessage, StatusProbe},
    error::Result,
    feed::{FeedClient, FeedSource},
    models::Config,
    monitor::{Monitor, Scheduler},
    storage::{LocalStore, StateStore},
};

/// tunnelwatch - A73 Tunnel Status Monitor
#[derive(Parser, Debug)]
#[command(name = "tunnelwatch", version, about = "A73 tunnel status monitor")]
struct Cli {
    /// Path to the state directory containing config and history files
    #[arg(short, long, default_value = "state")]
    state_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Monitor continuously until interrupted
    Run,

    /// Run a single check pass and print the result
    Check,

    /// Validate the configuration file
    Validate,

    /// Show persisted history and statistics
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.state_dir.join("config.toml");
    let config = Config::load_or_default(&config_path);

    match cli.command {
        Command::Run => run(&cli, &config).await?,

        Command::Check => check(&cli, &config).await?,

        Command::Validate => {
            log::info!("Validating configuration...");
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!(
                "✓ Config OK ({} tunnels, {} relays)",
                config.tunnels.len(),
                config.feed.relays.len()
            );
        }

        Command::Info => info(&cli).await?,
    }

    Ok(())
}

/// Monitor continuously: scheduler in the foreground, a probe worker in
/// the background, Ctrl-C to stop with a final state flush.
async fn run(cli: &Cli, config: &Config) -> Result<()> {
    config.validate()?;

    let source = Arc::new(FeedClient::new(&config.feed)?);
    let store = Arc::new(LocalStore::new(&cli.state_dir));
    let monitor = Monitor::hydrate(
        config,
        Arc::clone(&source) as Arc<dyn FeedSource>,
        Arc::clone(&store) as Arc<dyn StateStore>,
        Arc::new(LogDispatcher),
    )
    .await;
    let mut scheduler = Scheduler::new(monitor, config.monitor.check_interval_ms);

    let probe: Arc<dyn StatusProbe> =
        Arc::new(FeedProbe::new(config.tunnels.clone(), source));
    let mut bridge = bridge::spawn_background(Some(probe), config.monitor.check_interval_ms);
    bridge.send(ForegroundMessage::StartMonitoring).await;

    scheduler.start().await;
    log::info!(
        "Monitoring {} tunnels every {} ms. Press Ctrl-C to stop.",
        config.tunnels.len(),
        config.monitor.check_interval_ms
    );

    let mut bridge_alive = true;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = bridge.updates.recv(), if bridge_alive => match update {
                Some(BackgroundMessage::BackgroundCheckRequest) => {
                    scheduler.monitor().lock().await.run_pass().await;
                }
                Some(BackgroundMessage::StatusUpdate { data }) => {
                    // Re-check in the foreground when the background view
                    // diverges from ours
                    let monitor = scheduler.monitor();
                    let mut monitor = monitor.lock().await;
                    let diverged = data
                        .iter()
                        .any(|(key, status)| monitor.state().last_status.get(key) != Some(status));
                    if diverged {
                        log::info!("Background worker saw different statuses; re-checking");
                        monitor.run_pass().await;
                    }
                }
                None => bridge_alive = false,
            },
        }
    }

    log::info!("Shutting down...");
    bridge.send(ForegroundMessage::StopMonitoring).await;
    scheduler.stop().await;
    scheduler.monitor().lock().await.shutdown().await;
    log::info!("Done!");

    Ok(())
}

/// Run a single check pass and report statuses and statistics.
async fn check(cli: &Cli, config: &Config) -> Result<()> {
    config.validate()?;

    let source = Arc::new(FeedClient::new(&config.feed)?);
    let store = Arc::new(LocalStore::new(&cli.state_dir));
    let mut monitor = Monitor::hydrate(
        config,
        source,
        store,
        Arc::new(LogDispatcher),
    )
    .await;

    let statuses = monitor.run_pass().await;
    for tunnel in &config.tunnels {
        if let Some(status) = statuses.get(&tunnel.key) {
            log::info!("{}: {}", tunnel.name, status);
        }
    }

    let stats = &monitor.state().statistics;
    log::info!(
        "Today: {} closures, avg {} min, uptime {}%",
        stats.closure_count,
        stats.avg_closure_minutes,
        stats.uptime_percentage
    );

    Ok(())
}

/// Summarize persisted state.
async fn info(cli: &Cli) -> Result<()> {
    log::info!("State directory: {}", cli.state_dir.display());

    let store = LocalStore::new(&cli.state_dir);
    let state = store.load().await?;

    if state.closure_history.is_empty() {
        log::info!("No closure history recorded yet.");
    } else {
        for (tunnel, entries) in &state.closure_history {
            log::info!("{}: {} history entries", tunnel, entries.len());
            if let Some(newest) = entries.front() {
                log::info!(
                    "  Latest: {} at {}{}",
                    newest.status,
                    newest.timestamp,
                    newest
                        .reason
                        .as_deref()
                        .map(|r| format!(" ({})", r))
                        .unwrap_or_default()
                );
            }
        }
    }

    let stats = &state.statistics;
    log::info!(
        "Statistics: {} closures today, avg {} min, uptime {}%",
        stats.closure_count,
        stats.avg_closure_minutes,
        stats.uptime_percentage
    );
    match stats.last_incident {
        Some(at) => log::info!("Last incident: {}", at),
        None => log::info!("Last incident: none recorded"),
    }

    Ok(())
}
