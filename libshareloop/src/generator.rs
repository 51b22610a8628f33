//! AI content generation
//!
//! Produces platform-ready text (and an image for platforms that need one)
//! for a content item, via an OpenAI-compatible backend. The scheduler only
//! depends on the `ContentGenerator` trait; generation failures leave no
//! idempotency marker, so the item is retried on its platform's next turn.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

use crate::config::GeneratorConfig;
use crate::error::{GenerationError, Result};
use crate::types::{ContentItem, GeneratedContent, PlatformKey};

/// Substitute {title}, {excerpt} and {url} placeholders in a prompt template.
pub fn render_prompt(template: &str, item: &ContentItem) -> String {
    template
        .replace("{title}", &item.title)
        .replace("{excerpt}", &item.excerpt)
        .replace("{url}", &item.url)
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Generate share content for an item. `want_image` is set for
    /// platforms that cannot publish without media.
    async fn generate(
        &self,
        item: &ContentItem,
        prompt_template: &str,
        platform: PlatformKey,
        want_image: bool,
    ) -> Result<GeneratedContent>;
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageDatum>,
}

/// Generator backed by an OpenAI-compatible HTTP API.
pub struct OpenAiGenerator {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
    image_model: String,
}

impl OpenAiGenerator {
    pub fn new(config: &GeneratorConfig) -> Self {
        Self {
            client: Client::new(),
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            image_model: config.image_model.clone(),
        }
    }

    async fn generate_text(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_base);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [{ "role": "user", "content": prompt }],
            }))
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| GenerationError::Request(format!("text generation failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Request(format!(
                "generation backend returned {}: {}",
                status, body
            ))
            .into());
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            GenerationError::Request(format!("unparseable generation response: {}", e))
        })?;

        let text = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|t| t.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(GenerationError::Empty("backend returned no text".to_string()).into());
        }

        Ok(text)
    }

    async fn generate_image(&self, item: &ContentItem) -> Result<String> {
        let url = format!("{}/images/generations", self.api_base);
        let prompt = format!(
            "A clean social media illustration for an article titled \"{}\". {}",
            item.title, item.excerpt
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.image_model,
                "prompt": prompt,
                "n": 1,
                "size": "1024x1024",
            }))
            // Image generation is the slow path.
            .timeout(Duration::from_secs(120))
            .send()
            .await
            .map_err(|e| GenerationError::Request(format!("image generation failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Request(format!(
                "image backend returned {}: {}",
                status, body
            ))
            .into());
        }

        let images: ImageResponse = response.json().await.map_err(|e| {
            GenerationError::Request(format!("unparseable image response: {}", e))
        })?;

        images
            .data
            .into_iter()
            .next()
            .and_then(|d| d.url)
            .ok_or_else(|| {
                GenerationError::MissingImage("image backend returned no url".to_string()).into()
            })
    }
}

#[async_trait]
impl ContentGenerator for OpenAiGenerator {
    async fn generate(
        &self,
        item: &ContentItem,
        prompt_template: &str,
        platform: PlatformKey,
        want_image: bool,
    ) -> Result<GeneratedContent> {
        let prompt = render_prompt(prompt_template, item);
        debug!(item_id = %item.id, %platform, "Generating share content");

        let text = self.generate_text(&prompt).await?;
        let image_url = if want_image {
            Some(self.generate_image(item).await?)
        } else {
            None
        };

        Ok(GeneratedContent { text, image_url })
    }
}

/// Configurable mock generator, available to integration tests.
pub struct MockGenerator {
    text: String,
    image_url: Option<String>,
    fail: bool,
    delay: Duration,
    call_count: Arc<Mutex<usize>>,
}

impl MockGenerator {
    pub fn success(text: &str) -> Self {
        Self {
            text: text.to_string(),
            image_url: Some("https://cdn.example.com/generated.png".to_string()),
            fail: false,
            delay: Duration::from_millis(0),
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn failure() -> Self {
        Self {
            fail: true,
            ..Self::success("")
        }
    }

    pub fn with_delay(text: &str, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::success(text)
        }
    }

    pub fn without_image(text: &str) -> Self {
        Self {
            image_url: None,
            ..Self::success(text)
        }
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    pub fn counter(&self) -> Arc<Mutex<usize>> {
        Arc::clone(&self.call_count)
    }
}

#[async_trait]
impl ContentGenerator for MockGenerator {
    async fn generate(
        &self,
        item: &ContentItem,
        prompt_template: &str,
        _platform: PlatformKey,
        want_image: bool,
    ) -> Result<GeneratedContent> {
        *self.call_count.lock().unwrap() += 1;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.fail {
            return Err(GenerationError::Request("mock generation failed".to_string()).into());
        }

        // Render so tests can assert on placeholder substitution.
        let rendered = render_prompt(prompt_template, item);
        let text = if self.text.is_empty() { rendered } else { self.text.clone() };

        if want_image && self.image_url.is_none() {
            return Err(
                GenerationError::MissingImage("mock has no image configured".to_string()).into(),
            );
        }

        Ok(GeneratedContent {
            text,
            image_url: if want_image { self.image_url.clone() } else { None },
        })
    }
}
