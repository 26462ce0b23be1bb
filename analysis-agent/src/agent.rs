//! Analysis Agent - classifies raw feedback and forwards it downstream
//!
//! Consumes `raw_feedback` envelopes, runs the three-stage classifier over
//! the comment text, merges the labels into the payload and republishes the
//! envelope as `analyzed_feedback`.

use crate::classifier::Classifier;
use anyhow::Result;
use common::{
    retry_forever, BusError, Envelope, MessageBus, PayloadType, PipelineConfig, ProtocolError,
    Subscription,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const AGENT_NAME: &str = "AnalysisAgent";

#[derive(Debug, Clone)]
pub struct AnalysisAgentConfig {
    /// Channel consumed for `raw_feedback`
    pub input_channel: String,
    /// Channel receiving `analyzed_feedback`
    pub output_channel: String,
    pub retry_delay: Duration,
}

impl Default for AnalysisAgentConfig {
    fn default() -> Self {
        Self::from_pipeline(&PipelineConfig::default())
    }
}

impl AnalysisAgentConfig {
    pub fn from_pipeline(config: &PipelineConfig) -> Self {
        Self {
            input_channel: config.channels.raw.clone(),
            output_channel: config.channels.analyzed.clone(),
            retry_delay: config.retry_delay(),
        }
    }
}

/// What happened to one consumed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    Forwarded { id: String },
    Dropped { reason: String },
}

pub struct AnalysisAgent {
    classifier: Classifier,
    bus: Arc<dyn MessageBus>,
    config: AnalysisAgentConfig,
}

impl AnalysisAgent {
    pub fn new(classifier: Classifier, bus: Arc<dyn MessageBus>, config: AnalysisAgentConfig) -> Self {
        Self {
            classifier,
            bus,
            config,
        }
    }

    /// Consume the raw channel forever, one message at a time
    pub async fn run(&self) -> Result<()> {
        loop {
            let mut subscription = self.subscribe().await;
            info!("👂 Listening on '{}'", self.config.input_channel);

            loop {
                match subscription.next_message().await {
                    Ok(Some(raw)) => {
                        self.handle_message(&raw).await;
                    }
                    Ok(None) => {
                        warn!("Subscription to '{}' closed, resubscribing", self.config.input_channel);
                        break;
                    }
                    Err(BusError::Lagged(skipped)) => {
                        // The receiver is still usable; only the oldest messages are gone
                        warn!(skipped, "Fell behind on '{}', continuing", self.config.input_channel);
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
        let channel = self.config.input_channel.as_str();
        retry_forever("subscribe to raw feedback", self.config.retry_delay, || {
            self.bus.subscribe(channel)
        })
        .await
    }

    /// Classify one raw message and forward it.
    ///
    /// Messages that violate the protocol are logged and dropped. A publish
    /// failure is retried until the bus accepts the envelope.
    pub async fn handle_message(&self, raw: &str) -> HandleOutcome {
        let mut envelope = match Self::accept(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Dropping message");
                return HandleOutcome::Dropped {
                    reason: e.to_string(),
                };
            }
        };

        let mut item = match envelope.feedback() {
            Ok(item) => item,
            Err(e) => {
                warn!(error = %e, id = ?envelope.item_id(), "Dropping invalid feedback");
                return HandleOutcome::Dropped {
                    reason: e.to_string(),
                };
            }
        };

        info!(id = %item.id, "🧠 Analyzing feedback");
        let classification = self.classifier.classify(&item.id, &item.text_content).await;
        item.apply(&classification);

        if let Err(e) = envelope.merge_feedback(&item) {
            error!(id = %item.id, error = %e, "Could not encode analyzed feedback");
            return HandleOutcome::Dropped {
                reason: e.to_string(),
            };
        }
        envelope.stamp(AGENT_NAME, PayloadType::AnalyzedFeedback);

        let channel = self.config.output_channel.as_str();
        let receivers = retry_forever("publish analyzed feedback", self.config.retry_delay, || {
            self.bus.publish(channel, &envelope)
        })
        .await;

        if receivers == 0 {
            warn!(id = %item.id, "No subscriber on '{}', result will not be stored", channel);
        }

        debug!(
            id = %item.id,
            sentiment = %classification.sentiment,
            severity = %classification.severity,
            theme = %classification.theme,
            "Forwarded"
        );

        HandleOutcome::Forwarded { id: item.id }
    }

    fn accept(raw: &str) -> Result<Envelope, ProtocolError> {
        let envelope = Envelope::decode(raw)?;
        envelope.expect_type(PayloadType::RawFeedback)?;
        Ok(envelope)
    }
}
