//! shareloop-send - Background daemon for staggered social sharing
//!
//! Polls the scheduler on a fixed interval; each tick runs at most one
//! rotation turn, so the configured minimum gap between platform turns is
//! preserved no matter how often the daemon wakes up. The config file is
//! re-read on every tick, so edits take effect on the next run without a
//! restart.

use clap::Parser;
use libshareloop::config::{resolve_config_path, GeneratorConfig};
use libshareloop::error::ConfigError;
use libshareloop::generator::OpenAiGenerator;
use libshareloop::logging;
use libshareloop::platforms::create_clients;
use libshareloop::triggers::TriggerSet;
use libshareloop::{BatchRunner, Config, Database, Result, RunOutcome};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "shareloop-send")]
#[command(version)]
#[command(about = "Background daemon for staggered social sharing")]
#[command(long_about = "\
shareloop-send - Background daemon for staggered social sharing

DESCRIPTION:
    shareloop-send is a long-running daemon that drives the Shareloop
    rotation: on each tick it checks whether any connected platform is due
    for a sharing turn, picks the most overdue one, and shares a small
    batch of eligible content items to it.

    Platform turns are staggered by a configurable minimum gap, every
    share is recorded in an idempotency ledger so nothing is ever posted
    twice, and a safety-net check forces a run if the timer ever falls
    badly behind.

    The configuration file is re-read at the start of every tick; changes
    take effect on the next run without restarting the daemon.

USAGE:
    # Run in foreground (logs to stderr)
    shareloop-send

    # Run with custom poll interval
    shareloop-send --poll-interval 30

    # Run one scheduling pass and exit
    shareloop-send --once

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the in-flight item)

CONFIGURATION:
    Configuration file: ~/.config/shareloop/config.toml
    Database location: ~/.local/share/shareloop/shareloop.db

    [scheduler]
    interval_seconds = 3600   # per-platform cadence
    min_gap_seconds = 600     # minimum gap between any two turns
    max_items_per_run = 3     # batch size per turn

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration error

For more information, visit: https://github.com/shareloop/shareloop
")]
struct Cli {
    /// Poll interval in seconds
    #[arg(long, value_name = "SECONDS")]
    #[arg(help = "How often to check for due platforms (default: 60)")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    #[arg(help = "Enable verbose logging (useful for debugging)")]
    verbose: bool,

    /// Run one scheduling pass and exit (for testing)
    #[arg(long, hide = true)]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_cli("info", cli.verbose);

    if let Err(e) = run(cli).await {
        error!("shareloop-send failed: {}", e);
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = resolve_config_path()?;
    let mut raw_config = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
    let config = Config::load_from_path(&config_path)?;

    info!("shareloop-send daemon starting");
    let mut triggers = build_stack(config).await?;

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    let poll_interval = cli.poll_interval.unwrap_or(60);
    info!("Poll interval: {}s", poll_interval);

    if cli.once {
        report(triggers.run_now().await?);
        info!("shareloop-send: single pass done, exiting");
    } else {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("Shutdown requested, stopping daemon loop");
                break;
            }

            // Each run works from a fresh config snapshot.
            match reload_config(&config_path, &mut raw_config) {
                Ok(Some(config)) => match build_stack(config).await {
                    Ok(rebuilt) => {
                        info!("Configuration changed, reloaded");
                        triggers = rebuilt;
                    }
                    Err(e) => error!("Configuration reload failed, keeping previous: {}", e),
                },
                Ok(None) => {}
                Err(e) => error!("Configuration re-read failed, keeping previous: {}", e),
            }

            tick(&triggers).await;

            // Sleep until next poll (check shutdown every second)
            for _ in 0..poll_interval {
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                sleep(Duration::from_secs(1)).await;
            }
        }
    }

    info!("shareloop-send daemon stopped");
    Ok(())
}

/// Re-read the config file, returning a parsed config only when its
/// contents changed since the cached copy (which is updated in place).
fn reload_config(path: &PathBuf, cached: &mut String) -> Result<Option<Config>> {
    let raw = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
    if raw == *cached {
        return Ok(None);
    }

    let config = Config::load_from_path(path)?;
    *cached = raw;
    Ok(Some(config))
}

/// Assemble the scheduler stack for one config snapshot.
async fn build_stack(config: Config) -> Result<TriggerSet> {
    let config = Arc::new(config);
    let db = Database::new(&config.database.path).await?;

    let generator_config: &GeneratorConfig = config.generator.as_ref().ok_or_else(|| {
        ConfigError::MissingField("generator (required to produce share content)".to_string())
    })?;
    let generator = Arc::new(OpenAiGenerator::new(generator_config));

    let platforms = create_clients(&config);
    let runner = Arc::new(BatchRunner::new(
        db.clone(),
        Arc::clone(&config),
        platforms,
        generator,
    ));

    Ok(TriggerSet::new(db, config, runner))
}

/// Set up signal handlers for graceful shutdown
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(|e| {
        libshareloop::ShareloopError::InvalidInput(format!("Signal setup failed: {}", e))
    })?;

    let shutdown_clone = shutdown.clone();
    std::thread::spawn(move || {
        for sig in signals.forever() {
            match sig {
                SIGTERM | SIGINT => {
                    info!("Received shutdown signal, stopping gracefully...");
                    shutdown_clone.store(true, Ordering::Relaxed);
                    break;
                }
                _ => {}
            }
        }
    });

    Ok(())
}

/// One scheduling pass: periodic trigger, safety net, health line.
async fn tick(triggers: &TriggerSet) {
    match triggers.trigger_periodic().await {
        Ok(outcome) => report(outcome),
        Err(e) => error!("Scheduling pass failed: {}", e),
    }

    // The safety net is throttled internally; calling it every tick is
    // cheap and catches the case where selection stays blocked.
    if let Err(e) = triggers.trigger_safety_net().await {
        error!("Safety-net check failed: {}", e);
    }

    match triggers.get_status().await {
        Ok(status) => tracing::debug!(
            active = status.active,
            next_due = ?status.next_due,
            "Scheduler healthy"
        ),
        Err(e) => error!("Status check failed: {}", e),
    }
}

fn report(outcome: RunOutcome) {
    match outcome {
        RunOutcome::Completed(stats) => info!(
            "Turn completed: {} ({} shared, {} skipped, {} errors in {:.1}s)",
            stats.platform, stats.shared, stats.skipped, stats.errors, stats.duration_seconds
        ),
        RunOutcome::Idle => {}
        RunOutcome::Skipped => info!("Run already in progress, skipped this tick"),
    }
}
