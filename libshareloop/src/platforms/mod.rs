//! Platform abstraction and implementations
//!
//! One client per platform, each wrapping a connectivity check and a publish
//! operation. The scheduler core consumes these through the `PlatformClient`
//! trait and never talks to the remote APIs directly.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{PlatformError, Result};
use crate::types::{ContentItem, GeneratedContent, PlatformKey};

pub mod facebook;
pub mod instagram;
pub mod x;

// Mock platform is available for all builds (not just tests) to support
// integration tests.
pub mod mock;

/// Unified interface to one social platform.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Which platform this client talks to.
    fn key(&self) -> PlatformKey;

    /// Whether the platform has working credentials configured. This is a
    /// credential-presence check, not a network probe; a disconnected
    /// platform is simply excluded from rotation without state loss.
    fn is_connected(&self) -> bool;

    /// Whether publishing requires generated media (Instagram does).
    fn requires_image(&self) -> bool {
        false
    }

    /// Validate generated content against platform rules before publishing.
    fn validate_content(&self, _content: &GeneratedContent) -> Result<()> {
        Ok(())
    }

    /// Publish generated content for an item and return the remote post id.
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Authentication` for credential problems,
    /// `PlatformError::RateLimit` / `Network` for transient failures and
    /// `PlatformError::Publishing` when the API rejects the post.
    async fn publish(&self, item: &ContentItem, content: &GeneratedContent) -> Result<String>;
}

/// Map an HTTP error status from a platform API to the error taxonomy.
pub(crate) fn classify_status(platform: PlatformKey, status: u16, body: &str) -> PlatformError {
    match status {
        401 | 403 => PlatformError::Authentication(format!(
            "{} rejected credentials ({}): {}",
            platform, status, body
        )),
        429 => PlatformError::RateLimit(format!("{} rate limited: {}", platform, body)),
        500..=599 => PlatformError::Network(format!(
            "{} server error ({}): {}",
            platform, status, body
        )),
        _ => PlatformError::Publishing(format!(
            "{} returned {}: {}",
            platform, status, body
        )),
    }
}

pub(crate) fn network_error(platform: PlatformKey, err: &reqwest::Error) -> PlatformError {
    PlatformError::Network(format!("{} request failed: {}", platform, err))
}

/// Create clients for all platforms enabled in the configuration.
///
/// Platforms that are disabled or missing from the config are skipped, not
/// errors: the scheduler treats them as disconnected.
pub fn create_clients(config: &Config) -> Vec<Arc<dyn PlatformClient>> {
    let mut clients: Vec<Arc<dyn PlatformClient>> = Vec::new();

    if let Some(fb) = &config.facebook {
        if fb.enabled {
            tracing::info!("Creating Facebook platform client");
            clients.push(Arc::new(facebook::FacebookClient::new(fb)));
        }
    }

    if let Some(xc) = &config.x {
        if xc.enabled {
            tracing::info!("Creating X platform client");
            clients.push(Arc::new(x::XClient::new(xc)));
        }
    }

    if let Some(ig) = &config.instagram {
        if ig.enabled {
            tracing::info!("Creating Instagram platform client");
            clients.push(Arc::new(instagram::InstagramClient::new(ig)));
        }
    }

    if clients.is_empty() {
        tracing::warn!("No platforms are enabled in configuration");
    }

    clients
}
