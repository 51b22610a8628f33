//! Database operations for Shareloop
//!
//! Single SQLite-backed store for rotation state, the share ledger, the
//! candidate content mirror, run statistics, the execution lock and the
//! rotating run log. All scheduler writes route through `BatchRunner` under
//! the execution lock, so rows here need no extra per-record locking.

use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::path::Path;

use crate::error::{DbError, Result};
use crate::types::{
    ContentFilter, ContentItem, FilterMode, PlatformKey, PlatformState, RunStats, ShareRecord,
};

/// Name of the mutual-exclusion row guarding batch runs.
pub const RUNNER_LOCK: &str = "batch_runner";

/// How many run-log lines are retained.
const LOG_RETENTION: i64 = 150;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        // Expand path and create parent directories
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
            }
        }

        // Use forward slashes for SQLite URL (works on both Windows and Unix)
        // and mode=rwc so the database file is created if missing.
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ------------------------------------------------------------------
    // Platform rotation state
    // ------------------------------------------------------------------

    /// Rotation state for all platforms; platforms without a recorded turn
    /// come back with `last_run: None`.
    pub async fn get_platform_states(&self) -> Result<Vec<PlatformState>> {
        let rows = sqlx::query("SELECT platform, last_run FROM platform_state")
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        let mut states: Vec<PlatformState> = PlatformKey::ALL
            .into_iter()
            .map(|platform| PlatformState { platform, last_run: None })
            .collect();

        for row in rows {
            let name: String = row.get("platform");
            if let Some(key) = PlatformKey::from_str_opt(&name) {
                if let Some(state) = states.iter_mut().find(|s| s.platform == key) {
                    state.last_run = Some(row.get("last_run"));
                }
            }
        }

        Ok(states)
    }

    /// Record that a platform took a rotation turn at `ts`.
    pub async fn set_last_run(&self, platform: PlatformKey, ts: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO platform_state (platform, last_run) VALUES (?, ?)
            ON CONFLICT(platform) DO UPDATE SET last_run = excluded.last_run
            "#,
        )
        .bind(platform.as_str())
        .bind(ts)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Share ledger (idempotency markers)
    // ------------------------------------------------------------------

    /// Whether a successful share is already recorded for this pair.
    pub async fn has_shared(&self, item_id: &str, platform: PlatformKey) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT 1 FROM share_records
            WHERE item_id = ? AND platform = ? AND shared_at IS NOT NULL
            "#,
        )
        .bind(item_id)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.is_some())
    }

    pub async fn get_share_record(
        &self,
        item_id: &str,
        platform: PlatformKey,
    ) -> Result<Option<ShareRecord>> {
        let row = sqlx::query(
            r#"
            SELECT item_id, shared_at, remote_id, last_generated_text, last_error
            FROM share_records WHERE item_id = ? AND platform = ?
            "#,
        )
        .bind(item_id)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| ShareRecord {
            item_id: r.get("item_id"),
            platform,
            shared_at: r.get("shared_at"),
            remote_id: r.get("remote_id"),
            last_generated_text: r.get("last_generated_text"),
            last_error: r.get("last_error"),
        }))
    }

    /// Record a successful publish: sets the idempotency marker and clears
    /// any previous error.
    pub async fn mark_shared(
        &self,
        item_id: &str,
        platform: PlatformKey,
        remote_id: &str,
        text: &str,
        now: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO share_records (item_id, platform, shared_at, remote_id, last_generated_text, last_error)
            VALUES (?, ?, ?, ?, ?, NULL)
            ON CONFLICT(item_id, platform) DO UPDATE SET
                shared_at = excluded.shared_at,
                remote_id = excluded.remote_id,
                last_generated_text = excluded.last_generated_text,
                last_error = NULL
            "#,
        )
        .bind(item_id)
        .bind(platform.as_str())
        .bind(now)
        .bind(remote_id)
        .bind(text)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Record a failed attempt. Overwrites the previous error and leaves the
    /// idempotency marker untouched, so the item stays a candidate.
    pub async fn mark_error(
        &self,
        item_id: &str,
        platform: PlatformKey,
        error: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO share_records (item_id, platform, shared_at, remote_id, last_generated_text, last_error)
            VALUES (?, ?, NULL, NULL, NULL, ?)
            ON CONFLICT(item_id, platform) DO UPDATE SET
                last_error = excluded.last_error
            "#,
        )
        .bind(item_id)
        .bind(platform.as_str())
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Content source
    // ------------------------------------------------------------------

    /// Mirror a content item (and its taxonomy terms) into the store.
    pub async fn upsert_content_item(&self, item: &ContentItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO content_items (id, title, excerpt, url, publish_time, status)
            VALUES (?, ?, ?, ?, ?, 'published')
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                excerpt = excluded.excerpt,
                url = excluded.url,
                publish_time = excluded.publish_time
            "#,
        )
        .bind(&item.id)
        .bind(&item.title)
        .bind(&item.excerpt)
        .bind(&item.url)
        .bind(item.publish_time)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        sqlx::query("DELETE FROM content_terms WHERE item_id = ?")
            .bind(&item.id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        for (kind, terms) in [("category", &item.categories), ("tag", &item.tags)] {
            for term in terms {
                sqlx::query(
                    "INSERT OR IGNORE INTO content_terms (item_id, kind, term) VALUES (?, ?, ?)",
                )
                .bind(&item.id)
                .bind(kind)
                .bind(term)
                .execute(&self.pool)
                .await
                .map_err(DbError::SqlxError)?;
            }
        }

        Ok(())
    }

    pub async fn get_content_item(&self, item_id: &str) -> Result<Option<ContentItem>> {
        let row = sqlx::query(
            r#"
            SELECT id, title, excerpt, url, publish_time
            FROM content_items WHERE id = ?
            "#,
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        let Some(row) = row else { return Ok(None) };

        let mut item = ContentItem {
            id: row.get("id"),
            title: row.get("title"),
            excerpt: row.get("excerpt"),
            url: row.get("url"),
            publish_time: row.get("publish_time"),
            categories: Vec::new(),
            tags: Vec::new(),
        };

        let terms = sqlx::query("SELECT kind, term FROM content_terms WHERE item_id = ?")
            .bind(item_id)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        for t in terms {
            let kind: String = t.get("kind");
            let term: String = t.get("term");
            match kind.as_str() {
                "category" => item.categories.push(term),
                "tag" => item.tags.push(term),
                _ => {}
            }
        }

        Ok(Some(item))
    }

    /// Candidates for one platform: published items inside the age window,
    /// matching the taxonomy filter, without an idempotency marker for that
    /// platform. Most recent first; restartable given the same filter/state.
    pub async fn query_candidates(
        &self,
        platform: PlatformKey,
        filter: &ContentFilter,
        limit: u32,
        now: i64,
    ) -> Result<Vec<ContentItem>> {
        let min_publish_time = now - i64::from(filter.max_age_days) * 86400;

        // Build the WHERE clause dynamically
        let mut where_clauses = vec![
            "c.status = 'published'".to_string(),
            "c.publish_time >= ?".to_string(),
            "NOT EXISTS (SELECT 1 FROM share_records s \
             WHERE s.item_id = c.id AND s.platform = ? AND s.shared_at IS NOT NULL)"
                .to_string(),
        ];

        let term_kind = match filter.mode {
            FilterMode::All => None,
            FilterMode::Category => Some("category"),
            FilterMode::Tag => Some("tag"),
        };

        if let Some(_kind) = term_kind {
            let placeholders = vec!["?"; filter.terms.len().max(1)].join(", ");
            where_clauses.push(format!(
                "EXISTS (SELECT 1 FROM content_terms t \
                 WHERE t.item_id = c.id AND t.kind = ? AND t.term IN ({}))",
                placeholders
            ));
        }

        let query_str = format!(
            r#"
            SELECT c.id, c.title, c.excerpt, c.url, c.publish_time
            FROM content_items c
            WHERE {}
            ORDER BY c.publish_time DESC
            LIMIT ?
            "#,
            where_clauses.join(" AND ")
        );

        let mut query = sqlx::query(&query_str)
            .bind(min_publish_time)
            .bind(platform.as_str());

        if let Some(kind) = term_kind {
            query = query.bind(kind);
            if filter.terms.is_empty() {
                // IN () is invalid SQL; bind one impossible value instead.
                query = query.bind("");
            } else {
                for term in &filter.terms {
                    query = query.bind(term);
                }
            }
        }
        query = query.bind(i64::from(limit));

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        let mut items: Vec<ContentItem> = rows
            .iter()
            .map(|row| ContentItem {
                id: row.get("id"),
                title: row.get("title"),
                excerpt: row.get("excerpt"),
                url: row.get("url"),
                publish_time: row.get("publish_time"),
                categories: Vec::new(),
                tags: Vec::new(),
            })
            .collect();

        // Hydrate taxonomy terms for the whole batch in one query.
        if !items.is_empty() {
            let placeholders = vec!["?"; items.len()].join(", ");
            let terms_query = format!(
                "SELECT item_id, kind, term FROM content_terms WHERE item_id IN ({})",
                placeholders
            );
            let mut terms = sqlx::query(&terms_query);
            for item in &items {
                terms = terms.bind(&item.id);
            }

            for row in terms
                .fetch_all(&self.pool)
                .await
                .map_err(DbError::SqlxError)?
            {
                let item_id: String = row.get("item_id");
                let kind: String = row.get("kind");
                let term: String = row.get("term");
                if let Some(item) = items.iter_mut().find(|i| i.id == item_id) {
                    match kind.as_str() {
                        "category" => item.categories.push(term),
                        "tag" => item.tags.push(term),
                        _ => {}
                    }
                }
            }
        }

        Ok(items)
    }

    // ------------------------------------------------------------------
    // Run statistics
    // ------------------------------------------------------------------

    /// Persist the last-run statistics singleton.
    pub async fn save_run_stats(&self, stats: &RunStats) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO run_stats (id, platform, processed, shared, skipped, errors, duration_seconds, finished_at)
            VALUES (1, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                platform = excluded.platform,
                processed = excluded.processed,
                shared = excluded.shared,
                skipped = excluded.skipped,
                errors = excluded.errors,
                duration_seconds = excluded.duration_seconds,
                finished_at = excluded.finished_at
            "#,
        )
        .bind(stats.platform.as_str())
        .bind(stats.processed)
        .bind(stats.shared)
        .bind(stats.skipped)
        .bind(stats.errors)
        .bind(stats.duration_seconds)
        .bind(stats.finished_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_run_stats(&self) -> Result<Option<RunStats>> {
        let row = sqlx::query(
            r#"
            SELECT platform, processed, shared, skipped, errors, duration_seconds, finished_at
            FROM run_stats WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.and_then(|r| {
            let name: String = r.get("platform");
            PlatformKey::from_str_opt(&name).map(|platform| RunStats {
                platform,
                processed: r.get("processed"),
                shared: r.get("shared"),
                skipped: r.get("skipped"),
                errors: r.get("errors"),
                duration_seconds: r.get("duration_seconds"),
                finished_at: r.get("finished_at"),
            })
        }))
    }

    // ------------------------------------------------------------------
    // Execution lock
    // ------------------------------------------------------------------

    /// Try to claim the named lock until `now + ttl`. Returns a release
    /// token on success, None while another holder's claim is unexpired.
    /// The single upsert is atomic, so concurrent callers cannot both win.
    pub async fn try_acquire_lock(
        &self,
        name: &str,
        ttl_seconds: i64,
        now: i64,
    ) -> Result<Option<String>> {
        let token = uuid::Uuid::new_v4().to_string();

        let result = sqlx::query(
            r#"
            INSERT INTO scheduler_locks (name, token, acquired_at, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                token = excluded.token,
                acquired_at = excluded.acquired_at,
                expires_at = excluded.expires_at
            WHERE scheduler_locks.expires_at <= excluded.acquired_at
            "#,
        )
        .bind(name)
        .bind(&token)
        .bind(now)
        .bind(now + ttl_seconds)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        if result.rows_affected() > 0 {
            Ok(Some(token))
        } else {
            Ok(None)
        }
    }

    /// Release a lock, but only if the token still matches: an expired lock
    /// that someone else re-claimed must not be stolen back.
    pub async fn release_lock(&self, name: &str, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM scheduler_locks WHERE name = ? AND token = ?")
            .bind(name)
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Whether the named lock is currently held (unexpired).
    pub async fn lock_held(&self, name: &str, now: i64) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM scheduler_locks WHERE name = ? AND expires_at > ?")
            .bind(name)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(row.is_some())
    }

    // ------------------------------------------------------------------
    // Run log
    // ------------------------------------------------------------------

    /// Append a line to the persistent run log, rotating out the oldest
    /// lines past the retention cap.
    pub async fn append_log_line(&self, level: &str, message: &str, now: i64) -> Result<()> {
        sqlx::query("INSERT INTO log_lines (logged_at, level, message) VALUES (?, ?, ?)")
            .bind(now)
            .bind(level)
            .bind(message)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::query(
            r#"
            DELETE FROM log_lines WHERE id NOT IN (
                SELECT id FROM log_lines ORDER BY id DESC LIMIT ?
            )
            "#,
        )
        .bind(LOG_RETENTION)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Most recent log lines, newest first.
    pub async fn get_log_lines(&self, limit: u32) -> Result<Vec<(i64, String, String)>> {
        let rows = sqlx::query(
            "SELECT logged_at, level, message FROM log_lines ORDER BY id DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows
            .iter()
            .map(|r| (r.get("logged_at"), r.get("level"), r.get("message")))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup_test_db() -> (TempDir, Database) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::new(&db_path.to_string_lossy()).await.unwrap();
        (temp_dir, db)
    }

    fn item(id: &str, publish_time: i64) -> ContentItem {
        ContentItem {
            id: id.to_string(),
            title: format!("Title {}", id),
            excerpt: "An excerpt".to_string(),
            url: format!("https://example.com/{}", id),
            publish_time,
            categories: vec![],
            tags: vec![],
        }
    }

    #[tokio::test]
    async fn test_platform_state_roundtrip() {
        let (_temp, db) = setup_test_db().await;

        let states = db.get_platform_states().await.unwrap();
        assert_eq!(states.len(), 3);
        assert!(states.iter().all(|s| s.last_run.is_none()));

        db.set_last_run(PlatformKey::X, 1234).await.unwrap();
        db.set_last_run(PlatformKey::X, 5678).await.unwrap();

        let states = db.get_platform_states().await.unwrap();
        let x = states.iter().find(|s| s.platform == PlatformKey::X).unwrap();
        assert_eq!(x.last_run, Some(5678));
        let fb = states
            .iter()
            .find(|s| s.platform == PlatformKey::Facebook)
            .unwrap();
        assert_eq!(fb.last_run, None);
    }

    #[tokio::test]
    async fn test_ledger_mark_shared_sets_marker_and_clears_error() {
        let (_temp, db) = setup_test_db().await;

        db.mark_error("post-1", PlatformKey::Facebook, "network down")
            .await
            .unwrap();
        assert!(!db.has_shared("post-1", PlatformKey::Facebook).await.unwrap());

        let record = db
            .get_share_record("post-1", PlatformKey::Facebook)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.last_error.as_deref(), Some("network down"));
        assert!(record.shared_at.is_none());

        db.mark_shared("post-1", PlatformKey::Facebook, "fb_123", "Generated text", 999)
            .await
            .unwrap();
        assert!(db.has_shared("post-1", PlatformKey::Facebook).await.unwrap());

        let record = db
            .get_share_record("post-1", PlatformKey::Facebook)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.shared_at, Some(999));
        assert_eq!(record.remote_id.as_deref(), Some("fb_123"));
        assert_eq!(record.last_generated_text.as_deref(), Some("Generated text"));
        assert!(record.last_error.is_none());
    }

    #[tokio::test]
    async fn test_ledger_is_per_platform() {
        let (_temp, db) = setup_test_db().await;

        db.mark_shared("post-1", PlatformKey::Facebook, "fb_1", "text", 100)
            .await
            .unwrap();

        assert!(db.has_shared("post-1", PlatformKey::Facebook).await.unwrap());
        assert!(!db.has_shared("post-1", PlatformKey::X).await.unwrap());
        assert!(!db.has_shared("post-2", PlatformKey::Facebook).await.unwrap());
    }

    #[tokio::test]
    async fn test_candidates_exclude_shared_and_order_recent_first() {
        let (_temp, db) = setup_test_db().await;
        let now = 1_000_000;

        db.upsert_content_item(&item("a", now - 300)).await.unwrap();
        db.upsert_content_item(&item("b", now - 200)).await.unwrap();
        db.upsert_content_item(&item("c", now - 100)).await.unwrap();

        db.mark_shared("b", PlatformKey::Facebook, "fb_b", "text", now)
            .await
            .unwrap();

        let filter = ContentFilter::default();
        let candidates = db
            .query_candidates(PlatformKey::Facebook, &filter, 10, now)
            .await
            .unwrap();

        let ids: Vec<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);

        // The same item is still a candidate for other platforms.
        let candidates = db
            .query_candidates(PlatformKey::X, &filter, 10, now)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 3);
    }

    #[tokio::test]
    async fn test_candidates_error_only_record_stays_eligible() {
        let (_temp, db) = setup_test_db().await;
        let now = 1_000_000;

        db.upsert_content_item(&item("a", now - 100)).await.unwrap();
        db.mark_error("a", PlatformKey::Instagram, "generation failed")
            .await
            .unwrap();

        let candidates = db
            .query_candidates(PlatformKey::Instagram, &ContentFilter::default(), 10, now)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[tokio::test]
    async fn test_candidates_age_window() {
        let (_temp, db) = setup_test_db().await;
        let now = 100 * 86400;

        db.upsert_content_item(&item("fresh", now - 86400)).await.unwrap();
        db.upsert_content_item(&item("stale", now - 40 * 86400))
            .await
            .unwrap();

        let filter = ContentFilter { max_age_days: 30, ..Default::default() };
        let candidates = db
            .query_candidates(PlatformKey::Facebook, &filter, 10, now)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "fresh");
    }

    #[tokio::test]
    async fn test_candidates_taxonomy_filter() {
        let (_temp, db) = setup_test_db().await;
        let now = 1_000_000;

        let mut news = item("news-1", now - 100);
        news.categories = vec!["news".to_string()];
        let mut recipes = item("recipe-1", now - 200);
        recipes.categories = vec!["recipes".to_string()];
        let mut tagged = item("tagged-1", now - 300);
        tagged.tags = vec!["release".to_string()];

        for i in [&news, &recipes, &tagged] {
            db.upsert_content_item(i).await.unwrap();
        }

        let filter = ContentFilter {
            max_age_days: 30,
            mode: FilterMode::Category,
            terms: vec!["news".to_string()],
        };
        let candidates = db
            .query_candidates(PlatformKey::Facebook, &filter, 10, now)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "news-1");
        assert_eq!(candidates[0].categories, vec!["news".to_string()]);

        let filter = ContentFilter {
            max_age_days: 30,
            mode: FilterMode::Tag,
            terms: vec!["release".to_string()],
        };
        let candidates = db
            .query_candidates(PlatformKey::Facebook, &filter, 10, now)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "tagged-1");

        // Term filter with no terms matches nothing rather than everything.
        let filter = ContentFilter {
            max_age_days: 30,
            mode: FilterMode::Category,
            terms: vec![],
        };
        let candidates = db
            .query_candidates(PlatformKey::Facebook, &filter, 10, now)
            .await
            .unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_candidates_hydrate_all_terms() {
        let (_temp, db) = setup_test_db().await;
        let now = 1_000_000;

        let mut first = item("a", now - 100);
        first.categories = vec!["news".to_string(), "releases".to_string()];
        first.tags = vec!["rust".to_string()];
        let mut second = item("b", now - 200);
        second.tags = vec!["meta".to_string()];

        db.upsert_content_item(&first).await.unwrap();
        db.upsert_content_item(&second).await.unwrap();

        let candidates = db
            .query_candidates(PlatformKey::Facebook, &ContentFilter::default(), 10, now)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 2);

        let a = candidates.iter().find(|c| c.id == "a").unwrap();
        assert_eq!(a.categories.len(), 2);
        assert_eq!(a.tags, vec!["rust".to_string()]);

        let b = candidates.iter().find(|c| c.id == "b").unwrap();
        assert!(b.categories.is_empty());
        assert_eq!(b.tags, vec!["meta".to_string()]);
    }

    #[tokio::test]
    async fn test_candidates_respect_limit() {
        let (_temp, db) = setup_test_db().await;
        let now = 1_000_000;

        for i in 0..5 {
            db.upsert_content_item(&item(&format!("p{}", i), now - i))
                .await
                .unwrap();
        }

        let candidates = db
            .query_candidates(PlatformKey::X, &ContentFilter::default(), 2, now)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 2);
    }

    #[tokio::test]
    async fn test_lock_mutual_exclusion_and_expiry() {
        let (_temp, db) = setup_test_db().await;
        let now = 1_000_000;

        let token = db.try_acquire_lock(RUNNER_LOCK, 300, now).await.unwrap();
        assert!(token.is_some());
        assert!(db.lock_held(RUNNER_LOCK, now).await.unwrap());

        // Second claim while held fails.
        let second = db.try_acquire_lock(RUNNER_LOCK, 300, now + 10).await.unwrap();
        assert!(second.is_none());

        // After the TTL the lock self-heals and can be re-claimed.
        let third = db.try_acquire_lock(RUNNER_LOCK, 300, now + 301).await.unwrap();
        assert!(third.is_some());

        // The original holder's stale token must not release the new claim.
        db.release_lock(RUNNER_LOCK, &token.unwrap()).await.unwrap();
        assert!(db.lock_held(RUNNER_LOCK, now + 302).await.unwrap());

        db.release_lock(RUNNER_LOCK, &third.unwrap()).await.unwrap();
        assert!(!db.lock_held(RUNNER_LOCK, now + 302).await.unwrap());

        let fresh = db.try_acquire_lock(RUNNER_LOCK, 300, now + 303).await.unwrap();
        assert!(fresh.is_some());
    }

    #[tokio::test]
    async fn test_run_stats_singleton_overwritten() {
        let (_temp, db) = setup_test_db().await;

        assert!(db.get_run_stats().await.unwrap().is_none());

        let stats = RunStats {
            platform: PlatformKey::Facebook,
            processed: 3,
            shared: 2,
            skipped: 0,
            errors: 1,
            duration_seconds: 12.5,
            finished_at: 1000,
        };
        db.save_run_stats(&stats).await.unwrap();

        let stats = RunStats {
            platform: PlatformKey::X,
            processed: 1,
            shared: 1,
            skipped: 0,
            errors: 0,
            duration_seconds: 2.0,
            finished_at: 2000,
        };
        db.save_run_stats(&stats).await.unwrap();

        let loaded = db.get_run_stats().await.unwrap().unwrap();
        assert_eq!(loaded.platform, PlatformKey::X);
        assert_eq!(loaded.shared, 1);
        assert_eq!(loaded.finished_at, 2000);
    }

    #[tokio::test]
    async fn test_log_rotation_keeps_newest() {
        let (_temp, db) = setup_test_db().await;

        for i in 0..200 {
            db.append_log_line("info", &format!("line {}", i), i)
                .await
                .unwrap();
        }

        let lines = db.get_log_lines(500).await.unwrap();
        assert_eq!(lines.len(), 150);
        assert_eq!(lines[0].2, "line 199");
        assert_eq!(lines.last().unwrap().2, "line 50");
    }
}
