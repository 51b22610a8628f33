//! Configuration management for Shareloop

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};
use crate::types::ContentFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub facebook: Option<FacebookConfig>,
    pub x: Option<XConfig>,
    pub instagram: Option<InstagramConfig>,
    pub generator: Option<GeneratorConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Scheduling knobs. Read as an immutable snapshot at the start of each run;
/// edits take effect on the next run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Per-platform cadence in seconds (300-86400).
    #[serde(default = "default_interval")]
    pub interval_seconds: i64,
    /// Minimum separation between any two rotation turns (60-3600).
    #[serde(default = "default_min_gap")]
    pub min_gap_seconds: i64,
    /// Candidates processed per rotation turn (1-20).
    #[serde(default = "default_max_items")]
    pub max_items_per_run: u32,
    /// Wall-clock budget for one batch, in seconds.
    #[serde(default = "default_batch_budget")]
    pub batch_budget_seconds: u64,
    /// TTL on the execution lock so a crashed run self-heals.
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_seconds: i64,
    /// Share immediately when an item is published.
    #[serde(default = "default_true")]
    pub share_on_publish: bool,
    /// Pause between platforms in the immediate all-platforms path.
    #[serde(default = "default_publish_spacing")]
    pub publish_spacing_seconds: u64,
    /// Delay before the publish trigger's duplicate safety pass.
    #[serde(default = "default_followup_delay")]
    pub publish_followup_seconds: u64,
    #[serde(default)]
    pub filter: ContentFilter,
}

fn default_interval() -> i64 {
    3600
}
fn default_min_gap() -> i64 {
    600
}
fn default_max_items() -> u32 {
    3
}
fn default_batch_budget() -> u64 {
    45
}
fn default_lock_ttl() -> i64 {
    300
}
fn default_true() -> bool {
    true
}
fn default_publish_spacing() -> u64 {
    3
}
fn default_followup_delay() -> u64 {
    120
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval(),
            min_gap_seconds: default_min_gap(),
            max_items_per_run: default_max_items(),
            batch_budget_seconds: default_batch_budget(),
            lock_ttl_seconds: default_lock_ttl(),
            share_on_publish: default_true(),
            publish_spacing_seconds: default_publish_spacing(),
            publish_followup_seconds: default_followup_delay(),
            filter: ContentFilter::default(),
        }
    }
}

impl SchedulerConfig {
    /// Validate numeric ranges. Called on config load.
    pub fn validate(&self) -> Result<()> {
        if !(300..=86400).contains(&self.interval_seconds) {
            return Err(ConfigError::OutOfRange(format!(
                "scheduler.interval_seconds must be 300-86400, got {}",
                self.interval_seconds
            ))
            .into());
        }
        if !(60..=3600).contains(&self.min_gap_seconds) {
            return Err(ConfigError::OutOfRange(format!(
                "scheduler.min_gap_seconds must be 60-3600, got {}",
                self.min_gap_seconds
            ))
            .into());
        }
        if !(1..=20).contains(&self.max_items_per_run) {
            return Err(ConfigError::OutOfRange(format!(
                "scheduler.max_items_per_run must be 1-20, got {}",
                self.max_items_per_run
            ))
            .into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacebookConfig {
    pub enabled: bool,
    pub page_id: String,
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XConfig {
    pub enabled: bool,
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstagramConfig {
    pub enabled: bool,
    pub user_id: String,
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Image model used for platforms that require media.
    #[serde(default = "default_image_model")]
    pub image_model: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Prompt templates keyed per platform; {title}, {excerpt} and {url}
    /// placeholders are substituted at generation time.
    #[serde(default = "default_facebook_prompt")]
    pub facebook_prompt: String,
    #[serde(default = "default_x_prompt")]
    pub x_prompt: String,
    #[serde(default = "default_instagram_prompt")]
    pub instagram_prompt: String,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_image_model() -> String {
    "dall-e-3".to_string()
}
fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_facebook_prompt() -> String {
    "Write an engaging Facebook post inviting readers to the article \
     \"{title}\". Summary: {excerpt}. End with the link {url}."
        .to_string()
}
fn default_x_prompt() -> String {
    "Write a post for X under 240 characters teasing the article \
     \"{title}\" and ending with {url}. Summary: {excerpt}."
        .to_string()
}
fn default_instagram_prompt() -> String {
    "Write an Instagram caption with a few fitting hashtags for the article \
     \"{title}\". Summary: {excerpt}. Mention the link in bio."
        .to_string()
}

impl GeneratorConfig {
    /// Prompt template for a platform.
    pub fn prompt_for(&self, platform: crate::types::PlatformKey) -> &str {
        use crate::types::PlatformKey;
        match platform {
            PlatformKey::Facebook => &self.facebook_prompt,
            PlatformKey::X => &self.x_prompt,
            PlatformKey::Instagram => &self.instagram_prompt,
        }
    }
}

impl Config {
    /// Prompt template for a platform, falling back to the built-in
    /// defaults when no generator section is configured.
    pub fn prompt_template(&self, platform: crate::types::PlatformKey) -> String {
        use crate::types::PlatformKey;
        match &self.generator {
            Some(g) => g.prompt_for(platform).to_string(),
            None => match platform {
                PlatformKey::Facebook => default_facebook_prompt(),
                PlatformKey::X => default_x_prompt(),
                PlatformKey::Instagram => default_instagram_prompt(),
            },
        }
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.scheduler.validate()?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/shareloop/shareloop.db".to_string(),
            },
            scheduler: SchedulerConfig::default(),
            facebook: None,
            x: None,
            instagram: None,
            generator: None,
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SHARELOOP_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("shareloop").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FilterMode;

    #[test]
    fn test_scheduler_defaults_validate() {
        let scheduler = SchedulerConfig::default();
        assert!(scheduler.validate().is_ok());
        assert_eq!(scheduler.interval_seconds, 3600);
        assert_eq!(scheduler.min_gap_seconds, 600);
        assert!(scheduler.share_on_publish);
    }

    #[test]
    fn test_interval_out_of_range_rejected() {
        let mut scheduler = SchedulerConfig::default();
        scheduler.interval_seconds = 120;
        assert!(scheduler.validate().is_err());

        scheduler.interval_seconds = 90000;
        assert!(scheduler.validate().is_err());
    }

    #[test]
    fn test_gap_and_items_out_of_range_rejected() {
        let mut scheduler = SchedulerConfig::default();
        scheduler.min_gap_seconds = 30;
        assert!(scheduler.validate().is_err());

        let mut scheduler = SchedulerConfig::default();
        scheduler.max_items_per_run = 0;
        assert!(scheduler.validate().is_err());

        scheduler.max_items_per_run = 21;
        assert!(scheduler.validate().is_err());
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml_str = r#"
            [database]
            path = ":memory:"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.facebook.is_none());
        assert_eq!(config.scheduler.interval_seconds, 3600);
        assert_eq!(config.scheduler.filter.mode, FilterMode::All);
    }

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
            [database]
            path = "/tmp/shareloop.db"

            [scheduler]
            interval_seconds = 1800
            min_gap_seconds = 300
            max_items_per_run = 5
            share_on_publish = false

            [scheduler.filter]
            max_age_days = 14
            mode = "category"
            terms = ["news", "releases"]

            [facebook]
            enabled = true
            page_id = "12345"
            access_token = "token"

            [generator]
            api_key = "sk-test"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        config.scheduler.validate().unwrap();
        assert_eq!(config.scheduler.interval_seconds, 1800);
        assert!(!config.scheduler.share_on_publish);
        assert_eq!(config.scheduler.filter.mode, FilterMode::Category);
        assert_eq!(config.scheduler.filter.terms.len(), 2);
        assert!(config.facebook.unwrap().enabled);
        assert_eq!(config.generator.unwrap().model, "gpt-4o-mini");
    }

    #[test]
    fn test_load_rejects_invalid_ranges() {
        let toml_str = r#"
            [database]
            path = ":memory:"

            [scheduler]
            interval_seconds = 10
        "#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, toml_str).unwrap();

        let result = Config::load_from_path(&path);
        assert!(result.is_err());
    }
}
