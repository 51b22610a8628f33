//! Facebook page publishing via the Graph API

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::FacebookConfig;
use crate::error::Result;
use crate::platforms::{classify_status, network_error, PlatformClient};
use crate::types::{ContentItem, GeneratedContent, PlatformKey};

const GRAPH_API_BASE: &str = "https://graph.facebook.com/v19.0";

#[derive(Debug, Deserialize)]
struct FeedResponse {
    id: String,
}

/// Publishes link posts to a Facebook page feed.
pub struct FacebookClient {
    client: Client,
    api_base: String,
    page_id: String,
    access_token: String,
}

impl FacebookClient {
    pub fn new(config: &FacebookConfig) -> Self {
        Self {
            client: Client::new(),
            api_base: GRAPH_API_BASE.to_string(),
            page_id: config.page_id.clone(),
            access_token: config.access_token.clone(),
        }
    }

    /// Override the API base URL (used by tests against a local server).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }
}

#[async_trait]
impl PlatformClient for FacebookClient {
    fn key(&self) -> PlatformKey {
        PlatformKey::Facebook
    }

    fn is_connected(&self) -> bool {
        !self.page_id.is_empty() && !self.access_token.is_empty()
    }

    async fn publish(&self, item: &ContentItem, content: &GeneratedContent) -> Result<String> {
        let url = format!("{}/{}/feed", self.api_base, self.page_id);
        debug!(item_id = %item.id, "Publishing to Facebook page feed");

        let response = self
            .client
            .post(&url)
            .form(&[
                ("message", content.text.as_str()),
                ("link", item.url.as_str()),
                ("access_token", self.access_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| network_error(PlatformKey::Facebook, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(PlatformKey::Facebook, status.as_u16(), &body).into());
        }

        let feed: FeedResponse = response.json().await.map_err(|e| {
            crate::error::PlatformError::Publishing(format!(
                "facebook returned unparseable response: {}",
                e
            ))
        })?;

        Ok(feed.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(page_id: &str, token: &str) -> FacebookConfig {
        FacebookConfig {
            enabled: true,
            page_id: page_id.to_string(),
            access_token: token.to_string(),
        }
    }

    #[test]
    fn test_connected_requires_credentials() {
        assert!(FacebookClient::new(&config("123", "token")).is_connected());
        assert!(!FacebookClient::new(&config("", "token")).is_connected());
        assert!(!FacebookClient::new(&config("123", "")).is_connected());
    }

    #[test]
    fn test_key_and_no_image_requirement() {
        let client = FacebookClient::new(&config("123", "token"));
        assert_eq!(client.key(), PlatformKey::Facebook);
        assert!(!client.requires_image());
    }
}
