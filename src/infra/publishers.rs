use crate::app::ports::Publisher;
use crate::config::PublisherConfig;
use crate::domain::DocumentBatch;
use crate::error::{CrawlerError, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Announces written batches as structured log events only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, topic: &str, batch: &DocumentBatch) -> Result<()> {
        info!(topic, kind = %batch.kind(), documents = batch.len(), "Published batch");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    pub topic: String,
    pub batch: DocumentBatch,
}

/// Keeps every published batch in memory, in publish order.
#[derive(Debug, Default, Clone)]
pub struct RecordingPublisher {
    events: Arc<Mutex<Vec<PublishedEvent>>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PublishedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_for(&self, topic: &str) -> Vec<PublishedEvent> {
        self.events().into_iter().filter(|e| e.topic == topic).collect()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, topic: &str, batch: &DocumentBatch) -> Result<()> {
        self.events.lock().unwrap().push(PublishedEvent {
            topic: topic.to_string(),
            batch: batch.clone(),
        });
        Ok(())
    }
}

/// Publishes through the RabbitMQ management HTTP API; the topic becomes the
/// routing key on the configured exchange.
pub struct RabbitHttpPublisher {
    client: reqwest::Client,
    publish_url: Url,
    username: String,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    routed: bool,
}

impl RabbitHttpPublisher {
    pub fn new(config: &PublisherConfig) -> Result<Self> {
        let mut publish_url = Url::parse(&config.url).map_err(|e| {
            CrawlerError::Config(format!("Invalid publisher url '{}': {}", config.url, e))
        })?;
        let (vhost, exchange) = (config.vhost.as_str(), config.exchange.as_str());
        let segments = ["api", "exchanges", vhost, exchange, "publish"];
        publish_url
            .path_segments_mut()
            .map_err(|_| {
                CrawlerError::Config(format!("Publisher url '{}' cannot be a base", config.url))
            })?
            .pop_if_empty()
            .extend(segments);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            publish_url,
            username: config.username.clone().unwrap_or_else(|| "guest".to_string()),
            password: config.password.clone(),
        })
    }

    pub fn publish_url(&self) -> &Url {
        &self.publish_url
    }
}

#[async_trait]
impl Publisher for RabbitHttpPublisher {
    async fn publish(&self, topic: &str, batch: &DocumentBatch) -> Result<()> {
        let payload = serde_json::to_string(&batch.to_payload()?)?;
        let body = json!({
            "properties": {
                "content_type": "application/json",
                "delivery_mode": 2,
                "message_id": Uuid::new_v4().to_string(),
                "type": batch.kind().as_str(),
            },
            "routing_key": topic,
            "payload": payload,
            "payload_encoding": "string",
        });

        let resp = self
            .client
            .post(self.publish_url.clone())
            .basic_auth(&self.username, self.password.as_ref())
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(CrawlerError::Publish(format!(
                "broker responded {}: {}",
                status.as_u16(),
                message
            )));
        }

        let result: PublishResponse = resp.json().await?;
        if !result.routed {
            warn!("Message for topic '{}' was not routed to any queue", topic);
        }
        Ok(())
    }
}
