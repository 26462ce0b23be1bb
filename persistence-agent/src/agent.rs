//! Persistence Agent - terminal consumer of the pipeline
//!
//! Consumes `analyzed_feedback` envelopes and upserts each item into the
//! feedback store. A write that fails because the database went away is
//! re-applied after reconnecting; the upsert makes the replay harmless.

use crate::store::{FeedbackStore, StoreError, UpsertOutcome};
use anyhow::Result;
use common::{
    retry_forever, BusError, Envelope, FeedbackItem, MessageBus, PayloadType, PipelineConfig, ProtocolError,
    Subscription,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

pub const AGENT_NAME: &str = "PersistenceAgent";

#[derive(Debug, Clone)]
pub struct PersistenceAgentConfig {
    /// Channel consumed for `analyzed_feedback`
    pub channel: String,
    pub retry_delay: Duration,
}

impl Default for PersistenceAgentConfig {
    fn default() -> Self {
        Self::from_pipeline(&PipelineConfig::default())
    }
}

impl PersistenceAgentConfig {
    pub fn from_pipeline(config: &PipelineConfig) -> Self {
        Self {
            channel: config.channels.analyzed.clone(),
            retry_delay: config.retry_delay(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    Stored { id: String, outcome: UpsertOutcome },
    Dropped { reason: String },
}

pub struct PersistenceAgent {
    store: Arc<dyn FeedbackStore>,
    bus: Arc<dyn MessageBus>,
    config: PersistenceAgentConfig,
}

impl PersistenceAgent {
    pub fn new(
        store: Arc<dyn FeedbackStore>,
        bus: Arc<dyn MessageBus>,
        config: PersistenceAgentConfig,
    ) -> Self {
        Self { store, bus, config }
    }

    /// Ensure the schema, then consume the analyzed channel forever
    pub async fn run(&self) -> Result<()> {
        retry_forever("ensure feedback schema", self.config.retry_delay, || {
            self.store.ensure_schema()
        })
        .await;

        loop {
            let mut subscription = self.subscribe().await;
            info!("👂 {} listening on '{}'", AGENT_NAME, self.config.channel);

            loop {
                match subscription.next_message().await {
                    Ok(Some(raw)) => {
                        self.handle_message(&raw).await;
                    }
                    Ok(None) => {
                        warn!("Subscription to '{}' closed, resubscribing", self.config.channel);
                        break;
                    }
                    Err(BusError::Lagged(skipped)) => {
                        // The receiver is still usable; only the oldest messages are gone
                        warn!(skipped, "Fell behind on '{}', continuing", self.config.channel);
                    }
                    Err(e) => {
                        error!(error = %e, "Subscription error, resubscribing");
                        break;
                    }
                }
            }
        }
    }

    async fn subscribe(&self) -> Box<dyn Subscription> {
        let channel = self.config.channel.as_str();
        retry_forever("subscribe to analyzed feedback", self.config.retry_delay, || {
            self.bus.subscribe(channel)
        })
        .await
    }

    /// Store one analyzed message
    pub async fn handle_message(&self, raw: &str) -> HandleOutcome {
        let item = match Self::accept(raw) {
            Ok(item) => item,
            Err(e) => {
                warn!(error = %e, "Dropping message");
                return HandleOutcome::Dropped {
                    reason: e.to_string(),
                };
            }
        };

        match self.store_item(&item).await {
            Ok(outcome) => {
                info!(
                    id = %item.id,
                    sentiment = ?item.sentiment.map(|s| s.as_str()),
                    severity = ?item.severity.map(|s| s.value()),
                    "💾 Stored feedback ({:?})",
                    outcome
                );
                HandleOutcome::Stored { id: item.id, outcome }
            }
            Err(e) => {
                error!(id = %item.id, error = %e, "Dropping feedback that cannot be stored");
                HandleOutcome::Dropped {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn accept(raw: &str) -> Result<FeedbackItem, ProtocolError> {
        let envelope = Envelope::decode(raw)?;
        envelope.expect_type(PayloadType::AnalyzedFeedback)?;
        envelope.feedback()
    }

    /// Upsert, reconnecting and re-applying while the database is unreachable
    async fn store_item(&self, item: &FeedbackItem) -> Result<UpsertOutcome, StoreError> {
        loop {
            match self.store.upsert(item).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_connection() => {
                    warn!(
                        id = %item.id,
                        error = %e,
                        "Lost database connection, retrying in {}s",
                        self.config.retry_delay.as_secs_f64()
                    );
                    sleep(self.config.retry_delay).await;
                    retry_forever("reconnect to database", self.config.retry_delay, || {
                        self.store.reconnect()
                    })
                    .await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
