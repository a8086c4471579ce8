//! Outbound publisher
//!
//! Thin seam over the message bus. Workers share one publisher; calls are
//! safe to issue concurrently.

use crate::errors::{ConnectionError, PublishError};
use async_nats::client::PublishErrorKind;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `payload` verbatim on `topic`
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError>;
}

/// Publisher backed by a NATS connection
#[derive(Clone)]
pub struct NatsPublisher {
    client: async_nats::Client,
}

impl NatsPublisher {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }

    /// Connect to the bus, failing fast if it is unreachable
    pub async fn connect(endpoint: &str) -> Result<Self, ConnectionError> {
        let client = async_nats::connect(endpoint)
            .await
            .map_err(|e| ConnectionError::Bus {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &async_nats::Client {
        &self.client
    }

    /// Push buffered messages out before the connection is dropped
    pub async fn flush(&self) -> Result<(), PublishError> {
        self.client
            .flush()
            .await
            .map_err(|e| PublishError::Bus(e.to_string()))
    }
}

#[async_trait]
impl Publisher for NatsPublisher {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        self.client
            .publish(topic.to_string(), payload.to_vec().into())
            .await
            .map_err(publish_error)
    }
}

/// A send failure means the client's connection task is gone
fn publish_error(e: async_nats::PublishError) -> PublishError {
    match e.kind() {
        PublishErrorKind::Send => PublishError::Closed,
        _ => PublishError::Bus(e.to_string()),
    }
}

/// A message captured by [`RecordingPublisher`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl PublishedMessage {
    pub fn payload_str(&self) -> &str {
        std::str::from_utf8(&self.payload).unwrap_or_default()
    }
}

/// In-memory publisher for tests and local runs without a bus
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    messages: Arc<Mutex<Vec<PublishedMessage>>>,
    fail_with: Option<PublishError>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A publisher whose every publish fails with `error`
    pub fn failing(error: PublishError) -> Self {
        Self {
            messages: Arc::default(),
            fail_with: Some(error),
        }
    }

    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn messages_on(&self, topic: &str) -> Vec<PublishedMessage> {
        self.messages()
            .into_iter()
            .filter(|m| m.topic == topic)
            .collect()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        if let Some(ref err) = self.fail_with {
            return Err(err.clone());
        }
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(PublishedMessage {
                topic: topic.to_string(),
                payload: payload.to_vec(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_publisher_captures_messages() {
        let publisher = RecordingPublisher::new();
        publisher.publish("roulette.9fE", b"a1b2c3d4").await.unwrap();
        publisher.publish("dice.9fE", b"ffff").await.unwrap();

        let on_roulette = publisher.messages_on("roulette.9fE");
        assert_eq!(on_roulette.len(), 1);
        assert_eq!(on_roulette[0].payload_str(), "a1b2c3d4");
        assert_eq!(publisher.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_failing_publisher() {
        let publisher = RecordingPublisher::failing(PublishError::Closed);
        let result = publisher.publish("roulette.x", b"1").await;

        assert_eq!(result, Err(PublishError::Closed));
        assert!(publisher.messages().is_empty());
    }

    #[test]
    fn test_nats_send_failure_maps_to_closed() {
        let closed = publish_error(async_nats::PublishError::from(PublishErrorKind::Send));
        assert_eq!(closed, PublishError::Closed);

        let too_big = publish_error(async_nats::PublishError::from(PublishErrorKind::MaxPayloadExceeded));
        assert!(matches!(too_big, PublishError::Bus(_)));
    }
}
