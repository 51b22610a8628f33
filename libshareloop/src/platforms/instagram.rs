//! Instagram publishing via the Graph API
//!
//! Instagram publishing is a two-step flow: create a media container with
//! the image and caption, then publish the container. Both steps must
//! succeed before the item counts as shared.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::InstagramConfig;
use crate::error::{PlatformError, Result};
use crate::platforms::{classify_status, network_error, PlatformClient};
use crate::types::{ContentItem, GeneratedContent, PlatformKey};

const GRAPH_API_BASE: &str = "https://graph.facebook.com/v19.0";

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

/// Publishes image posts to an Instagram professional account.
pub struct InstagramClient {
    client: Client,
    api_base: String,
    user_id: String,
    access_token: String,
}

impl InstagramClient {
    pub fn new(config: &InstagramConfig) -> Self {
        Self {
            client: Client::new(),
            api_base: GRAPH_API_BASE.to_string(),
            user_id: config.user_id.clone(),
            access_token: config.access_token.clone(),
        }
    }

    /// Override the API base URL (used by tests against a local server).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    async fn post_for_id(&self, url: &str, params: &[(&str, &str)]) -> Result<String> {
        let response = self
            .client
            .post(url)
            .form(params)
            .send()
            .await
            .map_err(|e| network_error(PlatformKey::Instagram, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(PlatformKey::Instagram, status.as_u16(), &body).into());
        }

        let parsed: IdResponse = response.json().await.map_err(|e| {
            PlatformError::Publishing(format!("instagram returned unparseable response: {}", e))
        })?;

        Ok(parsed.id)
    }
}

#[async_trait]
impl PlatformClient for InstagramClient {
    fn key(&self) -> PlatformKey {
        PlatformKey::Instagram
    }

    fn is_connected(&self) -> bool {
        !self.user_id.is_empty() && !self.access_token.is_empty()
    }

    fn requires_image(&self) -> bool {
        true
    }

    fn validate_content(&self, content: &GeneratedContent) -> Result<()> {
        if content.image_url.is_none() {
            return Err(PlatformError::Validation(
                "instagram posts require a generated image".to_string(),
            )
            .into());
        }
        Ok(())
    }

    async fn publish(&self, item: &ContentItem, content: &GeneratedContent) -> Result<String> {
        self.validate_content(content)?;
        let image_url = content.image_url.as_deref().unwrap_or_default();

        debug!(item_id = %item.id, "Creating Instagram media container");
        let container_url = format!("{}/{}/media", self.api_base, self.user_id);
        let container_id = self
            .post_for_id(
                &container_url,
                &[
                    ("image_url", image_url),
                    ("caption", content.text.as_str()),
                    ("access_token", self.access_token.as_str()),
                ],
            )
            .await?;

        debug!(item_id = %item.id, container_id = %container_id, "Publishing Instagram container");
        let publish_url = format!("{}/{}/media_publish", self.api_base, self.user_id);
        self.post_for_id(
            &publish_url,
            &[
                ("creation_id", container_id.as_str()),
                ("access_token", self.access_token.as_str()),
            ],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(user_id: &str, token: &str) -> InstagramClient {
        InstagramClient::new(&InstagramConfig {
            enabled: true,
            user_id: user_id.to_string(),
            access_token: token.to_string(),
        })
    }

    #[test]
    fn test_connected_requires_credentials() {
        assert!(client("42", "token").is_connected());
        assert!(!client("", "token").is_connected());
        assert!(!client("42", "").is_connected());
    }

    #[test]
    fn test_requires_image() {
        let c = client("42", "token");
        assert!(c.requires_image());

        let without_image = GeneratedContent {
            text: "A caption".to_string(),
            image_url: None,
        };
        assert!(c.validate_content(&without_image).is_err());

        let with_image = GeneratedContent {
            text: "A caption".to_string(),
            image_url: Some("https://cdn.example.com/img.png".to_string()),
        };
        assert!(c.validate_content(&with_image).is_ok());
    }
}
