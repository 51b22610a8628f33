//! Trigger surface in front of the batch runner
//!
//! Four paths can request work: an item being published, the periodic
//! timer, a cheap heartbeat and a safety net that catches a dead timer.
//! All of them funnel into `BatchRunner`, whose execution lock collapses
//! overlapping requests; the throttles here only keep the cheap paths from
//! hammering the store.

use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::{Database, RUNNER_LOCK};
use crate::error::Result;
use crate::rotation::{any_overdue_by_factor, next_due_estimate, select_platform};
use crate::runner::{BatchRunner, ImmediateOutcome, RunOutcome};
use crate::types::{PlatformKey, RunStats};

/// Minimum seconds between heartbeat-driven checks.
const HEARTBEAT_THROTTLE_SECONDS: i64 = 60;

/// Minimum seconds between safety-net checks.
const SAFETY_NET_THROTTLE_SECONDS: i64 = 300;

/// The safety net fires when a platform is overdue by this many intervals.
const SAFETY_NET_OVERDUE_FACTOR: i64 = 2;

/// Connectivity and rotation state for one platform, for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformStatus {
    pub platform: PlatformKey,
    pub connected: bool,
    pub last_run: Option<i64>,
}

/// Snapshot of scheduler health.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    /// Whether a batch run currently holds the execution lock.
    pub active: bool,
    /// Earliest Unix timestamp at which a platform could be selected.
    pub next_due: Option<i64>,
    pub platforms: Vec<PlatformStatus>,
    pub last_run: Option<RunStats>,
}

/// Read-only scheduler snapshot, usable without constructing a runner.
pub async fn scheduler_status(
    db: &Database,
    config: &Config,
    connected: &[PlatformKey],
) -> Result<SchedulerStatus> {
    let now = Utc::now().timestamp();
    let states = db.get_platform_states().await?;

    let platforms = states
        .iter()
        .map(|s| PlatformStatus {
            platform: s.platform,
            connected: connected.contains(&s.platform),
            last_run: s.last_run,
        })
        .collect();

    Ok(SchedulerStatus {
        active: db.lock_held(RUNNER_LOCK, now).await?,
        next_due: next_due_estimate(&states, connected, &config.scheduler, now),
        platforms,
        last_run: db.get_run_stats().await?,
    })
}

pub struct TriggerSet {
    db: Database,
    config: Arc<Config>,
    runner: Arc<BatchRunner>,
    last_heartbeat: AtomicI64,
    last_safety_net: AtomicI64,
}

impl TriggerSet {
    pub fn new(db: Database, config: Arc<Config>, runner: Arc<BatchRunner>) -> Self {
        Self {
            db,
            config,
            runner,
            last_heartbeat: AtomicI64::new(0),
            last_safety_net: AtomicI64::new(0),
        }
    }

    /// Fires when an item is published. Shares it to all connected platforms
    /// immediately, then spawns a follow-up pass that re-runs the same share
    /// after a delay. The follow-up is harmless by construction: the ledger
    /// makes a second pass skip everything the first pass shared.
    pub async fn trigger_publish(&self, item_id: &str) -> Result<ImmediateOutcome> {
        if !self.config.scheduler.share_on_publish {
            debug!(item_id, "share_on_publish disabled, ignoring publish trigger");
            return Ok(ImmediateOutcome::Completed(Vec::new()));
        }

        let outcome = self.runner.run_all_now(item_id).await?;
        if matches!(outcome, ImmediateOutcome::Skipped) {
            info!(item_id, "Immediate share lost the lock; follow-up pass will retry");
        }

        // Follow-up pass: catches the lock-contention case above and any
        // platform that failed transiently in the first pass.
        let runner = Arc::clone(&self.runner);
        let delay = Duration::from_secs(self.config.scheduler.publish_followup_seconds);
        let item_id = item_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match runner.run_all_now(&item_id).await {
                Ok(ImmediateOutcome::Skipped) => {
                    debug!(item_id, "Follow-up share pass skipped (lock contended)")
                }
                Ok(ImmediateOutcome::Completed(_)) => {
                    debug!(item_id, "Follow-up share pass finished")
                }
                Err(e) => warn!(item_id, error = %e, "Follow-up share pass failed"),
            }
        });

        Ok(outcome)
    }

    /// The primary timer tick: run a rotation turn if one is due.
    pub async fn trigger_periodic(&self) -> Result<RunOutcome> {
        self.runner.run().await
    }

    /// Piggyback trigger for cheap ambient events. Throttled, and does a
    /// read-only due-check before touching the runner at all.
    pub async fn trigger_heartbeat(&self) -> Result<RunOutcome> {
        let now = Utc::now().timestamp();
        if !self.throttle(&self.last_heartbeat, HEARTBEAT_THROTTLE_SECONDS, now) {
            return Ok(RunOutcome::Skipped);
        }

        let states = self.db.get_platform_states().await?;
        let connected = self.runner.connected_keys();
        if select_platform(&states, &connected, &self.config.scheduler, now).is_none() {
            return Ok(RunOutcome::Idle);
        }

        debug!("Heartbeat found a due platform, running");
        self.runner.run().await
    }

    /// Last-resort check for a dead periodic timer: if any platform is
    /// overdue by twice its interval, kick off a run out of band.
    pub async fn trigger_safety_net(&self) -> Result<bool> {
        let now = Utc::now().timestamp();
        if !self.throttle(&self.last_safety_net, SAFETY_NET_THROTTLE_SECONDS, now) {
            return Ok(false);
        }

        let states = self.db.get_platform_states().await?;
        let connected = self.runner.connected_keys();
        if !any_overdue_by_factor(
            &states,
            &connected,
            &self.config.scheduler,
            SAFETY_NET_OVERDUE_FACTOR,
            now,
        ) {
            return Ok(false);
        }

        warn!("Safety net: a platform is severely overdue, forcing a run");
        self.db
            .append_log_line("warn", "safety net fired: platform severely overdue", now)
            .await?;

        let runner = Arc::clone(&self.runner);
        tokio::spawn(async move {
            if let Err(e) = runner.run().await {
                warn!(error = %e, "Safety-net run failed");
            }
        });

        Ok(true)
    }

    /// Manual trigger: run a turn right now. Selection rules still apply,
    /// so this is a no-op when nothing is due.
    pub async fn run_now(&self) -> Result<RunOutcome> {
        self.runner.run().await
    }

    /// Snapshot for the status surface. Read-only.
    pub async fn get_status(&self) -> Result<SchedulerStatus> {
        scheduler_status(&self.db, &self.config, &self.runner.connected_keys()).await
    }

    /// Returns true when `last` is at least `window` seconds old, updating
    /// it to `now`. A lost race just means another caller took this slot.
    fn throttle(&self, last: &AtomicI64, window: i64, now: i64) -> bool {
        let prev = last.load(Ordering::Acquire);
        if now - prev < window {
            return false;
        }
        last.compare_exchange(prev, now, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::generator::MockGenerator;
    use crate::platforms::mock::MockPlatform;
    use crate::platforms::PlatformClient;
    use crate::types::ContentItem;
    use tempfile::TempDir;

    async fn setup(share_on_publish: bool) -> (TempDir, Database, TriggerSet) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::new(&db_path.to_string_lossy()).await.unwrap();

        let mut config = Config::default_config();
        config.database = DatabaseConfig { path: db_path.to_string_lossy().to_string() };
        config.scheduler.share_on_publish = share_on_publish;
        config.scheduler.publish_spacing_seconds = 0;
        config.scheduler.publish_followup_seconds = 0;
        let config = Arc::new(config);

        let platforms: Vec<Arc<dyn PlatformClient>> =
            vec![Arc::new(MockPlatform::success(PlatformKey::Facebook))];
        let generator = Arc::new(MockGenerator::success("Generated"));
        let runner = Arc::new(BatchRunner::new(
            db.clone(),
            Arc::clone(&config),
            platforms,
            generator,
        ));

        let triggers = TriggerSet::new(db.clone(), config, runner);
        (temp_dir, db, triggers)
    }

    fn item(id: &str) -> ContentItem {
        ContentItem {
            id: id.to_string(),
            title: "Title".to_string(),
            excerpt: "Excerpt".to_string(),
            url: format!("https://example.com/{}", id),
            publish_time: Utc::now().timestamp(),
            categories: vec![],
            tags: vec![],
        }
    }

    #[tokio::test]
    async fn test_publish_trigger_shares_immediately() {
        let (_temp, db, triggers) = setup(true).await;
        db.upsert_content_item(&item("p1")).await.unwrap();

        let outcome = triggers.trigger_publish("p1").await.unwrap();
        match outcome {
            ImmediateOutcome::Completed(results) => {
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].1.shared, 1);
            }
            ImmediateOutcome::Skipped => panic!("expected immediate share"),
        }
        assert!(db.has_shared("p1", PlatformKey::Facebook).await.unwrap());
    }

    #[tokio::test]
    async fn test_publish_trigger_respects_toggle() {
        let (_temp, db, triggers) = setup(false).await;
        db.upsert_content_item(&item("p1")).await.unwrap();

        let outcome = triggers.trigger_publish("p1").await.unwrap();
        assert!(matches!(outcome, ImmediateOutcome::Completed(ref r) if r.is_empty()));
        assert!(!db.has_shared("p1", PlatformKey::Facebook).await.unwrap());
    }

    #[tokio::test]
    async fn test_heartbeat_throttled() {
        let (_temp, _db, triggers) = setup(true).await;

        // First heartbeat takes the throttle slot (and runs or idles).
        let first = triggers.trigger_heartbeat().await.unwrap();
        assert!(!matches!(first, RunOutcome::Skipped));

        // Immediate second heartbeat is throttled.
        let second = triggers.trigger_heartbeat().await.unwrap();
        assert!(matches!(second, RunOutcome::Skipped));
    }

    #[tokio::test]
    async fn test_safety_net_requires_severe_overdue() {
        let (_temp, db, triggers) = setup(true).await;

        // Fresh last_run on every platform: nothing severely overdue.
        let now = Utc::now().timestamp();
        for key in PlatformKey::ALL {
            db.set_last_run(key, now).await.unwrap();
        }
        assert!(!triggers.trigger_safety_net().await.unwrap());
    }

    #[tokio::test]
    async fn test_status_snapshot() {
        let (_temp, db, triggers) = setup(true).await;
        db.set_last_run(PlatformKey::Facebook, 1000).await.unwrap();

        let status = triggers.get_status().await.unwrap();
        assert!(!status.active);
        assert_eq!(status.platforms.len(), 3);

        let fb = status
            .platforms
            .iter()
            .find(|p| p.platform == PlatformKey::Facebook)
            .unwrap();
        assert!(fb.connected);
        assert_eq!(fb.last_run, Some(1000));

        let x = status
            .platforms
            .iter()
            .find(|p| p.platform == PlatformKey::X)
            .unwrap();
        assert!(!x.connected);
        assert!(status.last_run.is_none());
        // A connected platform exists, so an estimate is always available.
        assert!(status.next_due.is_some());
    }
}
