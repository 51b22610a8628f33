//! Logging setup shared by the Shareloop binaries.
//!
//! All binaries log to stderr through `tracing`. The output format and
//! level come from `SHARELOOP_LOG_FORMAT` / `SHARELOOP_LOG_LEVEL`, with a
//! per-binary default level and a `--verbose` override that forces debug.

use std::str::FromStr;
use tracing_subscriber::EnvFilter;

pub const FORMAT_ENV: &str = "SHARELOOP_LOG_FORMAT";
pub const LEVEL_ENV: &str = "SHARELOOP_LOG_LEVEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Plain text (no colors, for piping)
    #[default]
    Text,
    /// One JSON object per line (for collectors)
    Json,
    /// Colored multi-line output (for development)
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
            LogFormat::Pretty => write!(f, "pretty"),
        }
    }
}

pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
    pub verbose: bool,
}

impl LoggingConfig {
    /// Build a config from the environment. `default_level` applies when
    /// neither `SHARELOOP_LOG_LEVEL` nor `--verbose` says otherwise; the
    /// interactive CLIs default to "error", the daemon to "info".
    pub fn from_env(default_level: &str, verbose: bool) -> Self {
        let format = std::env::var(FORMAT_ENV)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        let level = std::env::var(LEVEL_ENV).unwrap_or_else(|_| default_level.to_string());

        Self { format, level, verbose }
    }

    fn filter(&self) -> EnvFilter {
        let fallback = if self.verbose { "debug" } else { self.level.as_str() };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
    }

    /// Install the global subscriber.
    ///
    /// # Panics
    ///
    /// Panics if a subscriber is already installed.
    pub fn init(self) {
        let filter = self.filter();
        match self.format {
            LogFormat::Json => tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .flatten_event(true)
                .with_target(true)
                .init(),
            LogFormat::Pretty => tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true)
                .with_file(true)
                .init(),
            LogFormat::Text => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(true)
                .init(),
        }
    }
}

/// Logging entry point for the binaries: environment-driven format, a
/// per-binary default level, `--verbose` forcing debug.
pub fn init_cli(default_level: &str, verbose: bool) {
    LoggingConfig::from_env(default_level, verbose).init();
}

/// Environment-driven defaults only (info level, text format).
pub fn init_default() {
    init_cli("info", false);
}
