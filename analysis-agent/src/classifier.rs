//! Three-stage classification: sentiment, then severity, then topic
//!
//! Stages always run in that order and none is skipped. A failed inference
//! call is logged and replaced by the stage's default, so `classify` always
//! produces a complete classification.

use crate::inference::InferenceClient;
use crate::parsing::{parse_sentiment, parse_severity, parse_topic};
use crate::prompts::{self, truncate_chars};
use common::{Classification, Sentiment, Severity, Topic};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default number of characters of comment text sent to the model
pub const DEFAULT_MAX_CHARS: usize = 1024;

pub struct Classifier {
    client: Arc<dyn InferenceClient>,
    max_chars: usize,
}

impl Classifier {
    pub fn new(client: Arc<dyn InferenceClient>, max_chars: usize) -> Self {
        Self { client, max_chars }
    }

    pub async fn classify(&self, id: &str, text: &str) -> Classification {
        let comment = truncate_chars(text, self.max_chars);

        let sentiment = self.sentiment(id, comment).await;
        let severity = self.severity(id, comment, sentiment).await;
        let theme = self.topic(id, comment).await;

        debug!(id, %sentiment, %severity, %theme, "Classified");

        Classification {
            sentiment,
            severity,
            theme,
        }
    }

    async fn sentiment(&self, id: &str, comment: &str) -> Sentiment {
        match self.client.complete(&prompts::sentiment_prompt(comment)).await {
            Ok(response) => parse_sentiment(&response),
            Err(e) => {
                warn!(id, error = %e, "Sentiment inference failed");
                Sentiment::Error
            }
        }
    }

    /// Only negative comments are rated; everything else is severity 0
    async fn severity(&self, id: &str, comment: &str, sentiment: Sentiment) -> Severity {
        if sentiment != Sentiment::Negative {
            return Severity::NONE;
        }

        match self.client.complete(&prompts::severity_prompt(comment)).await {
            Ok(response) => parse_severity(&response),
            Err(e) => {
                warn!(id, error = %e, "Severity inference failed");
                Severity::MEDIUM
            }
        }
    }

    async fn topic(&self, id: &str, comment: &str) -> Topic {
        match self.client.complete(&prompts::topic_prompt(comment)).await {
            Ok(response) => parse_topic(&response),
            Err(e) => {
                warn!(id, error = %e, "Topic inference failed");
                Topic::Error
            }
        }
    }
}
