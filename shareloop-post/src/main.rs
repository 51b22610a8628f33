//! shareloop-post - Mirror a published content item and share it now
//!
//! This is the publish trigger: the content platform invokes it when an
//! item goes live. The item is mirrored into the scheduler store, then
//! shared to every connected platform immediately (unless disabled). The
//! ledger makes repeat invocations for the same item harmless.

use chrono::Utc;
use clap::Parser;
use libshareloop::config::GeneratorConfig;
use libshareloop::error::ConfigError;
use libshareloop::generator::OpenAiGenerator;
use libshareloop::platforms::create_clients;
use libshareloop::{BatchRunner, Config, ContentItem, Database, ImmediateOutcome, Result};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "shareloop-post")]
#[command(version)]
#[command(about = "Mirror a published content item and share it immediately")]
struct Cli {
    /// Stable identifier of the content item
    item_id: String,

    /// Item title
    #[arg(long)]
    title: String,

    /// Canonical URL of the item
    #[arg(long)]
    url: String,

    /// Short excerpt or summary
    #[arg(long, default_value = "")]
    excerpt: String,

    /// Publication time as a Unix timestamp (defaults to now)
    #[arg(long)]
    publish_time: Option<i64>,

    /// Category terms (repeatable)
    #[arg(long = "category")]
    categories: Vec<String>,

    /// Tag terms (repeatable)
    #[arg(long = "tag")]
    tags: Vec<String>,

    /// Share now even when share_on_publish is disabled
    #[arg(long)]
    run_now: bool,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text")]
    format: String,

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
    let config = Arc::new(Config::load()?);
    let db = Database::new(&config.database.path).await?;

    let item = ContentItem {
        id: cli.item_id.clone(),
        title: cli.title,
        excerpt: cli.excerpt,
        url: cli.url,
        publish_time: cli.publish_time.unwrap_or_else(|| Utc::now().timestamp()),
        categories: cli.categories,
        tags: cli.tags,
    };
    db.upsert_content_item(&item).await?;

    if !config.scheduler.share_on_publish && !cli.run_now {
        println!("Mirrored {}; immediate sharing is disabled, the rotation will pick it up", item.id);
        return Ok(());
    }

    let generator_config: &GeneratorConfig = config.generator.as_ref().ok_or_else(|| {
        ConfigError::MissingField("generator (required to produce share content)".to_string())
    })?;
    let generator = Arc::new(OpenAiGenerator::new(generator_config));
    let platforms = create_clients(&config);

    let runner = BatchRunner::new(db, Arc::clone(&config), platforms, generator);
    let outcome = runner.run_all_now(&cli.item_id).await?;

    print_outcome(&cli.item_id, &outcome, &cli.format);
    Ok(())
}

fn print_outcome(item_id: &str, outcome: &ImmediateOutcome, format: &str) {
    match outcome {
        ImmediateOutcome::Skipped => {
            if format == "json" {
                println!(
                    "{}",
                    serde_json::json!({ "item_id": item_id, "status": "deferred" })
                );
            } else {
                println!("A run is in progress; {} will be shared by the rotation", item_id);
            }
        }
        ImmediateOutcome::Completed(results) => {
            if format == "json" {
                let per_platform: Vec<_> = results
                    .iter()
                    .map(|(platform, o)| {
                        serde_json::json!({
                            "platform": platform.as_str(),
                            "shared": o.shared,
                            "skipped": o.skipped,
                            "errors": o.errors,
                        })
                    })
                    .collect();
                println!(
                    "{}",
                    serde_json::json!({
                        "item_id": item_id,
                        "status": "completed",
                        "platforms": per_platform,
                    })
                );
            } else if results.is_empty() {
                println!("No connected platforms; {} stays queued for the rotation", item_id);
            } else {
                for (platform, o) in results {
                    let verdict = if o.shared > 0 {
                        "shared"
                    } else if o.skipped > 0 {
                        "already shared, skipped"
                    } else {
                        "failed (will retry via rotation)"
                    };
                    println!("{}: {}", platform, verdict);
                }
            }
        }
    }
}
