//! shareloop-status - Inspect scheduler state
//!
//! Read-only snapshot: whether a run is active, when the next turn is due,
//! per-platform rotation state and the stats of the last run. Optionally
//! tails the persistent run log.

use chrono::{TimeZone, Utc};
use clap::Parser;
use libshareloop::platforms::create_clients;
use libshareloop::triggers::scheduler_status;
use libshareloop::types::PlatformKey;
use libshareloop::{Config, Database, Result};

#[derive(Parser, Debug)]
#[command(name = "shareloop-status")]
#[command(version)]
#[command(about = "Inspect Shareloop scheduler state")]
struct Cli {
    /// Output format (text or json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Also print the most recent N run-log lines
    #[arg(long, value_name = "N")]
    logs: Option<u32>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    libshareloop::logging::init_cli("error", cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;

    let connected: Vec<PlatformKey> = create_clients(&config)
        .iter()
        .filter(|c| c.is_connected())
        .map(|c| c.key())
        .collect();

    let status = scheduler_status(&db, &config, &connected).await?;

    if cli.format == "json" {
        let mut value = serde_json::to_value(&status)
            .map_err(|e| libshareloop::ShareloopError::InvalidInput(e.to_string()))?;
        if let Some(n) = cli.logs {
            let lines: Vec<_> = db
                .get_log_lines(n)
                .await?
                .into_iter()
                .map(|(ts, level, message)| {
                    serde_json::json!({ "logged_at": ts, "level": level, "message": message })
                })
                .collect();
            value["log"] = serde_json::Value::Array(lines);
        }
        println!("{}", value);
        return Ok(());
    }

    println!("Scheduler: {}", if status.active { "run in progress" } else { "idle" });
    match status.next_due {
        Some(ts) => println!("Next turn due: {}", format_ts(ts)),
        None => println!("Next turn due: never (no connected platforms)"),
    }

    println!("\nPlatforms:");
    for p in &status.platforms {
        let connection = if p.connected { "connected" } else { "not connected" };
        let last = match p.last_run {
            Some(ts) => format_ts(ts),
            None => "never".to_string(),
        };
        println!("  {:<10} {:<14} last turn: {}", p.platform.to_string(), connection, last);
    }

    match &status.last_run {
        Some(stats) => println!(
            "\nLast run: {} at {} ({} shared, {} skipped, {} errors in {:.1}s)",
            stats.platform,
            format_ts(stats.finished_at),
            stats.shared,
            stats.skipped,
            stats.errors,
            stats.duration_seconds
        ),
        None => println!("\nLast run: none recorded"),
    }

    if let Some(n) = cli.logs {
        println!("\nRecent log:");
        for (ts, level, message) in db.get_log_lines(n).await? {
            println!("  {} [{}] {}", format_ts(ts), level, message);
        }
    }

    Ok(())
}

fn format_ts(ts: i64) -> String {
    match Utc.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => format!("@{}", ts),
    }
}
