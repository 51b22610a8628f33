//! X (Twitter) publishing via the v2 API

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::XConfig;
use crate::error::{PlatformError, Result};
use crate::platforms::{classify_status, network_error, PlatformClient};
use crate::types::{ContentItem, GeneratedContent, PlatformKey};

const X_API_BASE: &str = "https://api.x.com/2";

/// Hard limit on post length.
pub const X_CHARACTER_LIMIT: usize = 280;

#[derive(Debug, Deserialize)]
struct TweetData {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TweetResponse {
    data: TweetData,
}

/// Publishes posts through the X v2 API with a user-context bearer token.
pub struct XClient {
    client: Client,
    api_base: String,
    access_token: String,
}

impl XClient {
    pub fn new(config: &XConfig) -> Self {
        Self {
            client: Client::new(),
            api_base: X_API_BASE.to_string(),
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
impl PlatformClient for XClient {
    fn key(&self) -> PlatformKey {
        PlatformKey::X
    }

    fn is_connected(&self) -> bool {
        !self.access_token.is_empty()
    }

    fn validate_content(&self, content: &GeneratedContent) -> Result<()> {
        let len = content.text.chars().count();
        if len > X_CHARACTER_LIMIT {
            return Err(PlatformError::Validation(format!(
                "x post exceeds {} character limit (got {})",
                X_CHARACTER_LIMIT, len
            ))
            .into());
        }
        Ok(())
    }

    async fn publish(&self, item: &ContentItem, content: &GeneratedContent) -> Result<String> {
        self.validate_content(content)?;

        let url = format!("{}/tweets", self.api_base);
        debug!(item_id = %item.id, "Publishing to X");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&json!({ "text": content.text }))
            .send()
            .await
            .map_err(|e| network_error(PlatformKey::X, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(PlatformKey::X, status.as_u16(), &body).into());
        }

        let tweet: TweetResponse = response.json().await.map_err(|e| {
            PlatformError::Publishing(format!("x returned unparseable response: {}", e))
        })?;

        Ok(tweet.data.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(token: &str) -> XClient {
        XClient::new(&XConfig {
            enabled: true,
            access_token: token.to_string(),
        })
    }

    #[test]
    fn test_connected_requires_token() {
        assert!(client("token").is_connected());
        assert!(!client("").is_connected());
    }

    #[test]
    fn test_character_limit_validation() {
        let c = client("token");

        let short = GeneratedContent {
            text: "A short post".to_string(),
            image_url: None,
        };
        assert!(c.validate_content(&short).is_ok());

        let long = GeneratedContent {
            text: "x".repeat(X_CHARACTER_LIMIT + 1),
            image_url: None,
        };
        let result = c.validate_content(&long);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("character limit"));
    }

    #[test]
    fn test_limit_counts_chars_not_bytes() {
        let c = client("token");
        // 280 multi-byte characters are within the limit.
        let text = "é".repeat(X_CHARACTER_LIMIT);
        assert!(text.len() > X_CHARACTER_LIMIT);
        let content = GeneratedContent { text, image_url: None };
        assert!(c.validate_content(&content).is_ok());
    }
}
