//! Mock platform implementation for testing
//!
//! A configurable client that can simulate successes, each failure class
//! and slow publishes, with call counters for verifying idempotency and
//! budget behavior in integration tests.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::platforms::PlatformClient;
use crate::types::{ContentItem, GeneratedContent, PlatformKey};

/// Configuration for mock platform behavior
#[derive(Debug, Clone)]
pub struct MockPlatformConfig {
    pub key: PlatformKey,
    pub connected: bool,
    pub publish_succeeds: bool,
    /// Error returned on publish failure.
    pub publish_error: Option<PlatformError>,
    /// Delay before completing a publish (simulates network latency).
    pub delay: Duration,
    pub requires_image: bool,
    /// Number of times publish has been called.
    pub publish_call_count: Arc<Mutex<usize>>,
    /// (item_id, text) pairs that have been published, for verification.
    pub published: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockPlatformConfig {
    fn new(key: PlatformKey) -> Self {
        Self {
            key,
            connected: true,
            publish_succeeds: true,
            publish_error: None,
            delay: Duration::from_millis(0),
            requires_image: false,
            publish_call_count: Arc::new(Mutex::new(0)),
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock platform for testing
pub struct MockPlatform {
    config: MockPlatformConfig,
}

impl MockPlatform {
    pub fn new(config: MockPlatformConfig) -> Self {
        Self { config }
    }

    /// A connected mock that always publishes successfully.
    pub fn success(key: PlatformKey) -> Self {
        Self::new(MockPlatformConfig::new(key))
    }

    /// A mock whose publish always fails with the given error.
    pub fn publish_failure(key: PlatformKey, error: PlatformError) -> Self {
        Self::new(MockPlatformConfig {
            publish_succeeds: false,
            publish_error: Some(error),
            ..MockPlatformConfig::new(key)
        })
    }

    /// A mock that is not connected.
    pub fn disconnected(key: PlatformKey) -> Self {
        Self::new(MockPlatformConfig {
            connected: false,
            ..MockPlatformConfig::new(key)
        })
    }

    /// A mock whose publishes take `delay` to complete.
    pub fn with_delay(key: PlatformKey, delay: Duration) -> Self {
        Self::new(MockPlatformConfig {
            delay,
            ..MockPlatformConfig::new(key)
        })
    }

    pub fn publish_call_count(&self) -> usize {
        *self.config.publish_call_count.lock().unwrap()
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.config.published.lock().unwrap().clone()
    }

    /// Handles for inspecting calls after the mock has been moved into an
    /// `Arc<dyn PlatformClient>`.
    pub fn counters(&self) -> (Arc<Mutex<usize>>, Arc<Mutex<Vec<(String, String)>>>) {
        (
            Arc::clone(&self.config.publish_call_count),
            Arc::clone(&self.config.published),
        )
    }
}

#[async_trait]
impl PlatformClient for MockPlatform {
    fn key(&self) -> PlatformKey {
        self.config.key
    }

    fn is_connected(&self) -> bool {
        self.config.connected
    }

    fn requires_image(&self) -> bool {
        self.config.requires_image
    }

    async fn publish(&self, item: &ContentItem, content: &GeneratedContent) -> Result<String> {
        *self.config.publish_call_count.lock().unwrap() += 1;

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if self.config.publish_succeeds {
            self.config
                .published
                .lock()
                .unwrap()
                .push((item.id.clone(), content.text.clone()));
            Ok(format!("{}:mock-{}", self.config.key, item.id))
        } else {
            let error = self
                .config
                .publish_error
                .clone()
                .unwrap_or_else(|| PlatformError::Publishing("mock publish failed".to_string()));
            Err(error.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str) -> ContentItem {
        ContentItem {
            id: id.to_string(),
            title: "Title".to_string(),
            excerpt: "Excerpt".to_string(),
            url: "https://example.com/p".to_string(),
            publish_time: 0,
            categories: vec![],
            tags: vec![],
        }
    }

    fn content(text: &str) -> GeneratedContent {
        GeneratedContent {
            text: text.to_string(),
            image_url: None,
        }
    }

    #[tokio::test]
    async fn test_mock_success_records_publish() {
        let platform = MockPlatform::success(PlatformKey::Facebook);

        let remote_id = platform.publish(&item("p1"), &content("hello")).await.unwrap();
        assert!(remote_id.starts_with("facebook:mock-"));
        assert_eq!(platform.publish_call_count(), 1);
        assert_eq!(platform.published(), vec![("p1".to_string(), "hello".to_string())]);
    }

    #[tokio::test]
    async fn test_mock_failure_returns_configured_error() {
        let platform = MockPlatform::publish_failure(
            PlatformKey::X,
            PlatformError::RateLimit("slow down".to_string()),
        );

        let result = platform.publish(&item("p1"), &content("hello")).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("slow down"));
        assert_eq!(platform.publish_call_count(), 1);
        assert!(platform.published().is_empty());
    }

    #[tokio::test]
    async fn test_mock_delay() {
        let platform =
            MockPlatform::with_delay(PlatformKey::Instagram, Duration::from_millis(50));

        let start = std::time::Instant::now();
        platform.publish(&item("p1"), &content("hello")).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_mock_disconnected() {
        let platform = MockPlatform::disconnected(PlatformKey::Facebook);
        assert!(!platform.is_connected());
    }
}
