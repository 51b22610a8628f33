//! Shareloop - staggered social sharing for published content
//!
//! This library provides the core scheduling engine: a rotation selector
//! that staggers platform turns, a lock-guarded batch runner, an
//! idempotency ledger and AI content generation for each platform.

pub mod config;
pub mod db;
pub mod error;
pub mod generator;
pub mod logging;
pub mod platforms;
pub mod rotation;
pub mod runner;
pub mod triggers;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{Result, ShareloopError};
pub use runner::{BatchRunner, ImmediateOutcome, RunOutcome};
pub use triggers::{SchedulerStatus, TriggerSet};
pub use types::{ContentItem, PlatformKey, RunStats, ShareRecord};
