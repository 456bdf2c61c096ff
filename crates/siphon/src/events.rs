//! 📣 Completion events, published once per fetch run and never awaited on.
//!
//! The ingest route's downstream consumers (a log collector, mostly) like
//! to hear how a fetch went. They get exactly one event per terminal
//! outcome, fire-and-forget: a publisher that is down gets a warning in
//! our logs and zero influence over the pipeline's result.
//!
//! 🏗️ The publisher is constructed once at startup and handed to the
//! orchestrator explicitly. No global singleton holding a connection
//! hostage in a static. We tried that life. It was not a life.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// 📣 The wire payload of a fetch completion notification.
///
/// Field names are camelCase because the consumers on the other side of
/// the channel predate this crate and are not changing for us.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFetchEvent {
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub url: String,
    pub status: FetchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Success,
    Error,
}

impl DataFetchEvent {
    pub fn success(url: &str, record_count: u64) -> Self {
        Self {
            event_type: "data-fetch".to_string(),
            timestamp: Utc::now(),
            source: "data-fetcher".to_string(),
            url: url.to_string(),
            status: FetchStatus::Success,
            record_count: Some(record_count),
            error_message: None,
        }
    }

    pub fn failure(url: &str, error_message: String) -> Self {
        Self {
            event_type: "data-fetch".to_string(),
            timestamp: Utc::now(),
            source: "data-fetcher".to_string(),
            url: url.to_string(),
            status: FetchStatus::Error,
            record_count: None,
            error_message: Some(error_message),
        }
    }
}

/// 🔧 Configuration for the HTTP publisher backend.
#[derive(Debug, Deserialize, Clone)]
pub struct HttpPublisherConfig {
    /// 📡 Base URL of the event bridge.
    pub url: String,
    /// ✉️ Channel name the event is published under.
    #[serde(default = "default_channel")]
    pub channel: String,
}

fn default_channel() -> String {
    "data-fetch".to_string()
}

/// 📣 Something that can carry a completion event away.
///
/// # Contract
/// - `publish` delivers one event to the channel. Errors are the caller's
///   to log; the pipeline result never depends on them.
/// - `close` releases whatever the backend holds. Call it at shutdown.
#[async_trait]
pub(crate) trait EventPublisher: std::fmt::Debug {
    async fn publish(&self, event: &DataFetchEvent) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

/// 🎭 The polymorphic publisher. Same enum-dispatch shape as the stores.
#[derive(Debug, Clone)]
pub(crate) enum PublisherBackend {
    Http(HttpPublisher),
    InMemory(InMemoryPublisher),
    Disabled,
}

impl PublisherBackend {
    pub(crate) async fn connect(config: &crate::app_config::PublisherConfig) -> Result<Self> {
        use crate::app_config::PublisherConfig;
        match config {
            PublisherConfig::Http(http_config) => {
                Ok(Self::Http(HttpPublisher::new(http_config.clone())?))
            }
            PublisherConfig::InMemory => Ok(Self::InMemory(InMemoryPublisher::new())),
            PublisherConfig::Disabled => Ok(Self::Disabled),
        }
    }
}

#[async_trait]
impl EventPublisher for PublisherBackend {
    async fn publish(&self, event: &DataFetchEvent) -> Result<()> {
        match self {
            Self::Http(publisher) => publisher.publish(event).await,
            Self::InMemory(publisher) => publisher.publish(event).await,
            Self::Disabled => {
                // 💤 Nobody subscribed. The event still gets its moment
                // in the debug log. Every event deserves that much.
                debug!("📣 (publisher disabled) {:?} event for {}", event.status, event.url);
                Ok(())
            }
        }
    }

    async fn close(&self) -> Result<()> {
        match self {
            Self::Http(publisher) => publisher.close().await,
            Self::InMemory(publisher) => publisher.close().await,
            Self::Disabled => Ok(()),
        }
    }
}

/// 📡 Publishes events by POSTing them to a channel endpoint.
#[derive(Debug, Clone)]
pub(crate) struct HttpPublisher {
    client: reqwest::Client,
    config: HttpPublisherConfig,
}

impl HttpPublisher {
    pub(crate) fn new(config: HttpPublisherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(5))
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("💀 could not build the publisher's HTTP client")?;
        Ok(Self { client, config })
    }

    fn publish_url(&self) -> String {
        format!(
            "{}/publish/{}",
            self.config.url.trim_end_matches('/'),
            self.config.channel
        )
    }
}

#[async_trait]
impl EventPublisher for HttpPublisher {
    async fn publish(&self, event: &DataFetchEvent) -> Result<()> {
        let response = self
            .client
            .post(self.publish_url())
            .json(event)
            .send()
            .await
            .context("💀 the event never reached the channel")?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("💀 the channel answered '{status}' to our event. Rude.");
        }
        debug!("📣 published {:?} event to channel '{}'", event.status, self.config.channel);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// 📦 Captures published events in RAM. Tests only.
#[derive(Debug, Default, Clone)]
pub(crate) struct InMemoryPublisher {
    events: Arc<tokio::sync::Mutex<Vec<DataFetchEvent>>>,
}

impl InMemoryPublisher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) async fn published(&self) -> Vec<DataFetchEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn publish(&self, event: &DataFetchEvent) -> Result<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn the_one_where_the_wire_shape_is_camel_case() {
        let event = DataFetchEvent::success("http://feed.example/data.json", 42);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["eventType"], "data-fetch");
        assert_eq!(json["status"], "success");
        assert_eq!(json["recordCount"], 42);
        // ⚠️ Absent optionals stay absent, not null. The consumer checks
        // with `in`, because of course it does.
        assert!(json.get("errorMessage").is_none());
    }

    #[test]
    fn the_one_where_failures_carry_their_story() {
        let event = DataFetchEvent::failure("http://feed.example/data.json", "it broke".into());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["errorMessage"], "it broke");
        assert!(json.get("recordCount").is_none());
    }

    #[tokio::test]
    async fn the_one_where_http_publish_hits_the_channel() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/publish/data-fetch"))
            .and(body_partial_json(serde_json::json!({ "eventType": "data-fetch" })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let publisher = HttpPublisher::new(HttpPublisherConfig {
            url: server.uri(),
            channel: "data-fetch".into(),
        })
        .unwrap();
        publisher
            .publish(&DataFetchEvent::success("http://feed.example", 1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn the_one_where_the_in_memory_publisher_remembers() {
        let publisher = InMemoryPublisher::new();
        publisher
            .publish(&DataFetchEvent::success("http://feed.example", 2))
            .await
            .unwrap();
        let events = publisher.published().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].record_count, Some(2));
    }
}
