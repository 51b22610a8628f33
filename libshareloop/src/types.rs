//! Core types for Shareloop

use serde::{Deserialize, Serialize};

/// The three supported platforms.
///
/// The declaration order is the fixed priority order used to break ties in
/// rotation selection: Facebook, then X, then Instagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT")]
pub enum PlatformKey {
    Facebook,
    X,
    Instagram,
}

impl PlatformKey {
    /// All platforms in priority order.
    pub const ALL: [PlatformKey; 3] = [PlatformKey::Facebook, PlatformKey::X, PlatformKey::Instagram];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKey::Facebook => "facebook",
            PlatformKey::X => "x",
            PlatformKey::Instagram => "instagram",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "facebook" => Some(PlatformKey::Facebook),
            "x" | "twitter" => Some(PlatformKey::X),
            "instagram" => Some(PlatformKey::Instagram),
            _ => None,
        }
    }

    /// Position in the fixed priority order (lower wins ties).
    pub fn priority(&self) -> usize {
        Self::ALL.iter().position(|p| p == self).unwrap_or(usize::MAX)
    }
}

impl std::fmt::Display for PlatformKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rotation state for one platform. `last_run` is a Unix timestamp; `None`
/// means the platform has never taken a turn and is treated as infinitely
/// overdue once the global gap allows a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlatformState {
    pub platform: PlatformKey,
    pub last_run: Option<i64>,
}

/// A content item as seen by the scheduler: identity plus the metadata the
/// candidate filter and the prompt need. Owned by the content platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub title: String,
    pub excerpt: String,
    pub url: String,
    pub publish_time: i64,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
}

/// How the candidate query narrows by taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    All,
    Category,
    Tag,
}

/// Age window plus taxonomy filter applied to candidate queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentFilter {
    /// Only items published within this many days are candidates.
    pub max_age_days: u32,
    pub mode: FilterMode,
    /// Terms matched when mode is Category or Tag; ignored for All.
    pub terms: Vec<String>,
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self {
            max_age_days: 30,
            mode: FilterMode::All,
            terms: Vec::new(),
        }
    }
}

/// Idempotency ledger entry for one (item, platform) pair.
///
/// A non-null `shared_at` is the idempotency marker: it is set if and only
/// if a remote publish call succeeded, and its presence permanently excludes
/// the item from candidate queries for that platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareRecord {
    pub item_id: String,
    pub platform: PlatformKey,
    pub shared_at: Option<i64>,
    pub remote_id: Option<String>,
    pub last_generated_text: Option<String>,
    pub last_error: Option<String>,
}

/// Transient summary of one rotation turn; overwritten each run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStats {
    pub platform: PlatformKey,
    pub processed: u32,
    pub shared: u32,
    pub skipped: u32,
    pub errors: u32,
    pub duration_seconds: f64,
    pub finished_at: i64,
}

/// Output of the content generator for one item/platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub text: String,
    pub image_url: Option<String>,
}

/// Per-item dispatch outcome. Exactly one of the counters is 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub shared: u32,
    pub skipped: u32,
    pub errors: u32,
}

impl DispatchOutcome {
    pub fn shared() -> Self {
        Self { shared: 1, ..Default::default() }
    }

    pub fn skipped() -> Self {
        Self { skipped: 1, ..Default::default() }
    }

    pub fn error() -> Self {
        Self { errors: 1, ..Default::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_key_roundtrip() {
        for key in PlatformKey::ALL {
            assert_eq!(PlatformKey::from_str_opt(key.as_str()), Some(key));
        }
        assert_eq!(PlatformKey::from_str_opt("twitter"), Some(PlatformKey::X));
        assert_eq!(PlatformKey::from_str_opt("mastodon"), None);
    }

    #[test]
    fn test_priority_order() {
        assert!(PlatformKey::Facebook.priority() < PlatformKey::X.priority());
        assert!(PlatformKey::X.priority() < PlatformKey::Instagram.priority());
    }

    #[test]
    fn test_dispatch_outcome_counters() {
        assert_eq!(DispatchOutcome::shared().shared, 1);
        assert_eq!(DispatchOutcome::skipped().skipped, 1);
        assert_eq!(DispatchOutcome::error().errors, 1);

        let outcome = DispatchOutcome::shared();
        assert_eq!(outcome.shared + outcome.skipped + outcome.errors, 1);
    }

    #[test]
    fn test_filter_defaults() {
        let filter = ContentFilter::default();
        assert_eq!(filter.mode, FilterMode::All);
        assert_eq!(filter.max_age_days, 30);
        assert!(filter.terms.is_empty());
    }
}
