//! Batch execution of rotation turns
//!
//! `BatchRunner` is the only component that writes scheduler state. Every
//! entry point claims the execution lock first; a second caller while a run
//! is in flight skips instead of waiting, so overlapping triggers collapse
//! into one run. The lock carries a TTL so a crashed run self-heals.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::{Database, RUNNER_LOCK};
use crate::error::{Result, ShareloopError};
use crate::generator::ContentGenerator;
use crate::platforms::PlatformClient;
use crate::rotation::select_platform;
use crate::types::{ContentItem, DispatchOutcome, PlatformKey, RunStats};

const ELLIPSIS: char = '\u{2026}';

/// Shorten text to `limit` characters, replacing the tail with an ellipsis.
/// Counts characters, not bytes.
pub fn truncate_text(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit - 1).collect();
    // Do not end on trailing whitespace before the ellipsis.
    while out.ends_with(char::is_whitespace) {
        out.pop();
    }
    out.push(ELLIPSIS);
    out
}

/// Retry class for a dispatch failure. Transient failures resolve on a
/// later rotation turn; permanent ones need operator attention first.
fn failure_class(e: &ShareloopError) -> &'static str {
    if e.is_transient() {
        "transient"
    } else {
        "permanent"
    }
}

/// What happened when a run was requested.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Another run held the lock; nothing was done.
    Skipped,
    /// The lock was taken but no platform was due (or none connected).
    Idle,
    /// A rotation turn ran to completion.
    Completed(RunStats),
}

/// Result of the immediate all-platforms path used by the publish trigger.
#[derive(Debug, Clone)]
pub enum ImmediateOutcome {
    /// Another run held the lock; the caller should retry later.
    Skipped,
    /// Per-platform outcomes in priority order.
    Completed(Vec<(PlatformKey, DispatchOutcome)>),
}

pub struct BatchRunner {
    db: Database,
    config: Arc<Config>,
    platforms: Vec<Arc<dyn PlatformClient>>,
    generator: Arc<dyn ContentGenerator>,
}

impl BatchRunner {
    pub fn new(
        db: Database,
        config: Arc<Config>,
        platforms: Vec<Arc<dyn PlatformClient>>,
        generator: Arc<dyn ContentGenerator>,
    ) -> Self {
        Self { db, config, platforms, generator }
    }

    /// Keys of platforms with working credentials, in client order.
    pub fn connected_keys(&self) -> Vec<PlatformKey> {
        self.platforms
            .iter()
            .filter(|p| p.is_connected())
            .map(|p| p.key())
            .collect()
    }

    fn client_for(&self, key: PlatformKey) -> Option<&Arc<dyn PlatformClient>> {
        self.platforms.iter().find(|p| p.key() == key)
    }

    /// Run one rotation turn if one is due.
    ///
    /// Lock, snapshot state and config, select a platform, advance its
    /// `last_run` before processing, dispatch candidates within the batch
    /// budget, persist stats, release. The `last_run` advance happens even
    /// with an empty backlog so rotation keeps moving.
    pub async fn run(&self) -> Result<RunOutcome> {
        let now = Utc::now().timestamp();
        let ttl = self.config.scheduler.lock_ttl_seconds;

        let Some(token) = self.db.try_acquire_lock(RUNNER_LOCK, ttl, now).await? else {
            debug!("Batch run already in progress, skipping");
            return Ok(RunOutcome::Skipped);
        };

        let result = self.run_locked(now).await;
        self.db.release_lock(RUNNER_LOCK, &token).await?;
        result
    }

    async fn run_locked(&self, now: i64) -> Result<RunOutcome> {
        let scheduler = &self.config.scheduler;
        let connected = self.connected_keys();
        if connected.is_empty() {
            debug!("No connected platforms, nothing to run");
            return Ok(RunOutcome::Idle);
        }

        let states = self.db.get_platform_states().await?;
        let Some(platform) = select_platform(&states, &connected, scheduler, now) else {
            debug!("No platform due");
            return Ok(RunOutcome::Idle);
        };

        let candidates = self
            .db
            .query_candidates(platform, &scheduler.filter, scheduler.max_items_per_run, now)
            .await?;

        // Advance the rotation clock before processing: an empty backlog or
        // a failing batch still counts as this platform's turn.
        self.db.set_last_run(platform, now).await?;

        info!(%platform, candidates = candidates.len(), "Starting rotation turn");
        self.db
            .append_log_line(
                "info",
                &format!("{}: turn started, {} candidate(s)", platform, candidates.len()),
                now,
            )
            .await?;

        let started = Instant::now();
        let budget = Duration::from_secs(scheduler.batch_budget_seconds);
        let mut stats = RunStats {
            platform,
            processed: 0,
            shared: 0,
            skipped: 0,
            errors: 0,
            duration_seconds: 0.0,
            finished_at: now,
        };

        for item in &candidates {
            // Budget check happens between items; an in-flight item always
            // finishes so the ledger never sees a half-recorded publish.
            if started.elapsed() >= budget {
                warn!(
                    %platform,
                    processed = stats.processed,
                    remaining = candidates.len() as u32 - stats.processed,
                    "Batch budget exhausted, stopping turn early"
                );
                break;
            }

            let outcome = self.dispatch(platform, item).await?;
            stats.processed += 1;
            stats.shared += outcome.shared;
            stats.skipped += outcome.skipped;
            stats.errors += outcome.errors;
        }

        stats.duration_seconds = started.elapsed().as_secs_f64();
        stats.finished_at = Utc::now().timestamp();
        self.db.save_run_stats(&stats).await?;

        info!(
            %platform,
            processed = stats.processed,
            shared = stats.shared,
            skipped = stats.skipped,
            errors = stats.errors,
            "Rotation turn finished"
        );
        self.db
            .append_log_line(
                "info",
                &format!(
                    "{}: turn finished ({} shared, {} skipped, {} errors)",
                    platform, stats.shared, stats.skipped, stats.errors
                ),
                stats.finished_at,
            )
            .await?;

        Ok(RunOutcome::Completed(stats))
    }

    /// Share one item to every connected platform immediately, in priority
    /// order, pausing `publish_spacing_seconds` between platforms. Used by
    /// the publish trigger; the regular rotation clock is not advanced.
    pub async fn run_all_now(&self, item_id: &str) -> Result<ImmediateOutcome> {
        let now = Utc::now().timestamp();
        let ttl = self.config.scheduler.lock_ttl_seconds;

        let Some(token) = self.db.try_acquire_lock(RUNNER_LOCK, ttl, now).await? else {
            debug!(item_id, "Lock contended, immediate share skipped");
            return Ok(ImmediateOutcome::Skipped);
        };

        let result = self.run_all_now_locked(item_id).await;
        self.db.release_lock(RUNNER_LOCK, &token).await?;
        result
    }

    async fn run_all_now_locked(&self, item_id: &str) -> Result<ImmediateOutcome> {
        let Some(item) = self.db.get_content_item(item_id).await? else {
            warn!(item_id, "Immediate share requested for unknown item");
            return Ok(ImmediateOutcome::Completed(Vec::new()));
        };

        let spacing = Duration::from_secs(self.config.scheduler.publish_spacing_seconds);
        let mut outcomes = Vec::new();

        // Priority order keeps the sequence stable across runs.
        for key in PlatformKey::ALL {
            let Some(client) = self.client_for(key) else { continue };
            if !client.is_connected() {
                continue;
            }

            if !outcomes.is_empty() && !spacing.is_zero() {
                tokio::time::sleep(spacing).await;
            }

            let outcome = self.dispatch(key, &item).await?;
            outcomes.push((key, outcome));
        }

        info!(item_id, platforms = outcomes.len(), "Immediate share pass finished");
        Ok(ImmediateOutcome::Completed(outcomes))
    }

    /// Share one item to one platform: ledger re-check, generate, validate,
    /// publish, record. Steps are strictly ordered so the idempotency marker
    /// is set only after the remote call succeeded.
    async fn dispatch(&self, platform: PlatformKey, item: &ContentItem) -> Result<DispatchOutcome> {
        let Some(client) = self.client_for(platform) else {
            return Ok(DispatchOutcome::skipped());
        };

        // Candidate queries already exclude shared items, but state can move
        // between the query and this point; the ledger is the authority.
        if self.db.has_shared(&item.id, platform).await? {
            debug!(item_id = %item.id, %platform, "Already shared, skipping");
            return Ok(DispatchOutcome::skipped());
        }

        let template = self.config.prompt_template(platform);
        let mut content = match self
            .generator
            .generate(item, &template, platform, client.requires_image())
            .await
        {
            Ok(content) => content,
            Err(e) => {
                let class = failure_class(&e);
                warn!(item_id = %item.id, %platform, error = %e, class, "Content generation failed");
                self.db.mark_error(&item.id, platform, &e.to_string()).await?;
                self.db
                    .append_log_line(
                        "error",
                        &format!(
                            "{}: generation for {} failed ({}): {}",
                            platform, item.id, class, e
                        ),
                        Utc::now().timestamp(),
                    )
                    .await?;
                return Ok(DispatchOutcome::error());
            }
        };

        if platform == PlatformKey::X {
            content.text = truncate_text(&content.text, crate::platforms::x::X_CHARACTER_LIMIT);
        }

        if let Err(e) = client.validate_content(&content) {
            let class = failure_class(&e);
            warn!(item_id = %item.id, %platform, error = %e, class, "Generated content rejected");
            self.db.mark_error(&item.id, platform, &e.to_string()).await?;
            return Ok(DispatchOutcome::error());
        }

        match client.publish(item, &content).await {
            Ok(remote_id) => {
                let shared_at = Utc::now().timestamp();
                self.db
                    .mark_shared(&item.id, platform, &remote_id, &content.text, shared_at)
                    .await?;
                info!(item_id = %item.id, %platform, %remote_id, "Shared");
                self.db
                    .append_log_line(
                        "info",
                        &format!("{}: shared {} as {}", platform, item.id, remote_id),
                        shared_at,
                    )
                    .await?;
                Ok(DispatchOutcome::shared())
            }
            Err(e) => {
                let class = failure_class(&e);
                warn!(item_id = %item.id, %platform, error = %e, class, "Publish failed");
                self.db.mark_error(&item.id, platform, &e.to_string()).await?;
                self.db
                    .append_log_line(
                        "error",
                        &format!(
                            "{}: publish of {} failed ({}): {}",
                            platform, item.id, class, e
                        ),
                        Utc::now().timestamp(),
                    )
                    .await?;
                Ok(DispatchOutcome::error())
            }
        }
    }
}
