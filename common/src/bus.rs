//! Publish/subscribe bus connecting the agents
//!
//! The bus is fire-and-forget: a message published while nobody is
//! subscribed is gone. Downstream idempotency absorbs the duplicates that
//! retries produce.

use crate::envelope::Envelope;
use crate::error::BusError;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::{Stream, StreamExt};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::pin::Pin;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Channel carrying `raw_feedback` envelopes
pub const RAW_FEEDBACK_CHANNEL: &str = "raw_feedback_channel";

/// Channel carrying `analyzed_feedback` envelopes
pub const ANALYZED_FEEDBACK_CHANNEL: &str = "analyzed_feedback_channel";

/// Transport used by every agent to exchange envelopes
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish an envelope, returning how many live subscribers received it
    async fn publish(&self, channel: &str, envelope: &Envelope) -> Result<usize, BusError>;

    /// Subscribe to a channel
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>, BusError>;
}

/// Receiving end of a channel subscription
#[async_trait]
pub trait Subscription: Send {
    /// Next raw message text; `Ok(None)` once the subscription has closed
    async fn next_message(&mut self) -> Result<Option<String>, BusError>;
}

/// Redis pub/sub transport
pub struct RedisBus {
    client: redis::Client,
    publisher: ConnectionManager,
}

impl RedisBus {
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(url)?;
        let publisher = ConnectionManager::new(client.clone()).await?;

        info!("✅ Connected to Redis bus at {}", url);

        Ok(Self { client, publisher })
    }

    /// Shared connection for other Redis-backed components
    pub fn connection(&self) -> ConnectionManager {
        self.publisher.clone()
    }
}

#[async_trait]
impl MessageBus for RedisBus {
    async fn publish(&self, channel: &str, envelope: &Envelope) -> Result<usize, BusError> {
        let text = envelope.encode()?;
        let mut conn = self.publisher.clone();
        let receivers: usize = conn.publish(channel, text).await?;

        debug!(channel, receivers, "Published envelope");
        Ok(receivers)
    }

    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>, BusError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;

        info!("Subscribed to '{}'", channel);

        Ok(Box::new(RedisSubscription {
            messages: Box::pin(pubsub.into_on_message()),
        }))
    }
}

struct RedisSubscription {
    messages: Pin<Box<dyn Stream<Item = redis::Msg> + Send>>,
}

#[async_trait]
impl Subscription for RedisSubscription {
    async fn next_message(&mut self) -> Result<Option<String>, BusError> {
        match self.messages.next().await {
            Some(msg) => Ok(Some(payload_text(msg.get_payload_bytes()))),
            None => Ok(None),
        }
    }
}

/// Invalid UTF-8 is replaced rather than rejected, so a bad payload reaches
/// the consumer and fails envelope decoding instead of ending the subscription
fn payload_text(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).into_owned()
}

/// In-process transport with the same fire-and-forget semantics
pub struct InMemoryBus {
    channels: DashMap<String, broadcast::Sender<String>>,
    capacity: usize,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, channel: &str, envelope: &Envelope) -> Result<usize, BusError> {
        let text = envelope.encode()?;
        // A send error only means nobody is listening
        let receivers = self.sender(channel).send(text).unwrap_or(0);

        debug!(channel, receivers, "Published envelope");
        Ok(receivers)
    }

    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>, BusError> {
        Ok(Box::new(InMemorySubscription {
            receiver: self.sender(channel).subscribe(),
        }))
    }
}

struct InMemorySubscription {
    receiver: broadcast::Receiver<String>,
}

#[async_trait]
impl Subscription for InMemorySubscription {
    async fn next_message(&mut self) -> Result<Option<String>, BusError> {
        match self.receiver.recv().await {
            Ok(text) => Ok(Some(text)),
            Err(broadcast::error::RecvError::Closed) => Ok(None),
            Err(broadcast::error::RecvError::Lagged(skipped)) => Err(BusError::Lagged(skipped)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::PayloadType;
    use serde_json::{json, Map};

    fn envelope(id: &str) -> Envelope {
        let mut payload = Map::new();
        payload.insert("id".to_string(), json!(id));
        Envelope::new("IngestionAgent", PayloadType::RawFeedback, payload)
    }

    #[tokio::test]
    async fn test_in_memory_fan_out() {
        let bus = InMemoryBus::new();
        let mut first = bus.subscribe(RAW_FEEDBACK_CHANNEL).await.unwrap();
        let mut second = bus.subscribe(RAW_FEEDBACK_CHANNEL).await.unwrap();

        let receivers = bus.publish(RAW_FEEDBACK_CHANNEL, &envelope("a")).await.unwrap();
        assert_eq!(receivers, 2);

        for sub in [&mut first, &mut second] {
            let text = sub.next_message().await.unwrap().unwrap();
            assert_eq!(Envelope::decode(&text).unwrap().item_id(), Some("a"));
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_lost() {
        let bus = InMemoryBus::new();
        let receivers = bus.publish(RAW_FEEDBACK_CHANNEL, &envelope("lost")).await.unwrap();
        assert_eq!(receivers, 0);

        let mut late = bus.subscribe(RAW_FEEDBACK_CHANNEL).await.unwrap();
        bus.publish(RAW_FEEDBACK_CHANNEL, &envelope("seen")).await.unwrap();

        let text = late.next_message().await.unwrap().unwrap();
        assert_eq!(Envelope::decode(&text).unwrap().item_id(), Some("seen"));
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let bus = InMemoryBus::new();
        let mut analyzed = bus.subscribe(ANALYZED_FEEDBACK_CHANNEL).await.unwrap();

        bus.publish(RAW_FEEDBACK_CHANNEL, &envelope("raw")).await.unwrap();
        bus.publish(ANALYZED_FEEDBACK_CHANNEL, &envelope("done")).await.unwrap();

        let text = analyzed.next_message().await.unwrap().unwrap();
        assert_eq!(Envelope::decode(&text).unwrap().item_id(), Some("done"));
    }

    #[tokio::test]
    async fn test_lagging_subscriber_reports_drops() {
        let bus = InMemoryBus::with_capacity(2);
        let mut slow = bus.subscribe(RAW_FEEDBACK_CHANNEL).await.unwrap();

        for id in ["1", "2", "3", "4"] {
            bus.publish(RAW_FEEDBACK_CHANNEL, &envelope(id)).await.unwrap();
        }

        assert!(matches!(slow.next_message().await, Err(BusError::Lagged(2))));
        let text = slow.next_message().await.unwrap().unwrap();
        assert_eq!(Envelope::decode(&text).unwrap().item_id(), Some("3"));
        let text = slow.next_message().await.unwrap().unwrap();
        assert_eq!(Envelope::decode(&text).unwrap().item_id(), Some("4"));
    }

    #[test]
    fn test_non_utf8_payload_becomes_malformed_envelope() {
        let text = payload_text(b"{\"source_agent\": \"\xff\xfe\"");
        assert!(text.contains('\u{FFFD}'));
        assert!(matches!(
            Envelope::decode(&text),
            Err(crate::error::ProtocolError::Malformed(_))
        ));

        let valid = envelope("ok").encode().unwrap();
        assert_eq!(payload_text(valid.as_bytes()), valid);
    }
}
