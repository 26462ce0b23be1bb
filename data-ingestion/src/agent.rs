//! Ingestion Agent - introduces new feedback items into the pipeline
//!
//! Each run fetches the latest items from the content source, skips those
//! already in the processed-id set and publishes the rest as `raw_feedback`
//! envelopes. An id is marked processed only after its publish is confirmed:
//! a crash in between causes a duplicate publish, which the idempotent
//! upsert downstream absorbs, but never a silently dropped item.

use crate::connectors::{ContentSource, SourceComment};
use crate::dedup::DedupStore;
use anyhow::{Context, Result};
use common::{
    retry_forever, Envelope, FeedbackItem, MessageBus, PayloadType, PipelineConfig, DELETED_AUTHOR,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const AGENT_NAME: &str = "IngestionAgent";

/// Runtime settings for the ingestion agent
#[derive(Debug, Clone)]
pub struct IngestionAgentConfig {
    /// Collection (subreddit) to read from
    pub collection: String,
    /// Batch size per run
    pub limit: usize,
    /// Channel receiving `raw_feedback` envelopes
    pub channel: String,
    /// Time between successful runs
    pub interval: Duration,
    /// Delay before retrying a failed run
    pub retry_delay: Duration,
}

impl Default for IngestionAgentConfig {
    fn default() -> Self {
        Self::from_pipeline(&PipelineConfig::default())
    }
}

impl IngestionAgentConfig {
    pub fn from_pipeline(config: &PipelineConfig) -> Self {
        Self {
            collection: config.reddit.subreddit.clone(),
            limit: config.reddit.limit,
            channel: config.channels.raw.clone(),
            interval: config.ingestion.interval(),
            retry_delay: config.retry_delay(),
        }
    }
}

/// Counters for one ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionReport {
    pub fetched: usize,
    pub published: usize,
    pub skipped: usize,
    /// Published while no subscriber was listening; lost on the bus
    pub undelivered: usize,
}

pub struct IngestionAgent {
    source: Arc<dyn ContentSource>,
    dedup: Arc<dyn DedupStore>,
    bus: Arc<dyn MessageBus>,
    config: IngestionAgentConfig,
}

impl IngestionAgent {
    pub fn new(
        source: Arc<dyn ContentSource>,
        dedup: Arc<dyn DedupStore>,
        bus: Arc<dyn MessageBus>,
        config: IngestionAgentConfig,
    ) -> Self {
        Self {
            source,
            dedup,
            bus,
            config,
        }
    }

    /// Run forever: first run immediately, then every `interval`
    pub async fn run(&self) -> Result<()> {
        info!(
            "Ingestion agent watching {} '{}' every {}s",
            self.source.source_name(),
            self.config.collection,
            self.config.interval.as_secs()
        );

        loop {
            let report = retry_forever("ingestion run", self.config.retry_delay, || {
                self.fetch_and_publish(self.config.limit)
            })
            .await;

            info!(
                fetched = report.fetched,
                published = report.published,
                skipped = report.skipped,
                "--- Ingestion run finished ---"
            );

            sleep(self.config.interval).await;
        }
    }

    /// One ingestion run over at most `limit` items.
    ///
    /// Any fetch, publish or dedup failure aborts the run; ids marked so far
    /// stay marked because each was published first.
    pub async fn fetch_and_publish(&self, limit: usize) -> Result<IngestionReport> {
        let run_id = Uuid::new_v4().to_string();
        let mut report = IngestionReport::default();

        let comments = self
            .source
            .fetch_recent(&self.config.collection, limit)
            .await
            .with_context(|| format!("fetching from {}", self.source.source_name()))?;

        report.fetched = comments.len();

        for comment in comments.iter().take(limit) {
            if self.dedup.contains(&comment.external_id).await? {
                debug!("Skipping already processed item {}", comment.external_id);
                report.skipped += 1;
                continue;
            }

            let item = self.to_feedback(comment);
            let envelope = Envelope::for_feedback(AGENT_NAME, PayloadType::RawFeedback, &item)?
                .with_session_id(run_id.clone())
                .with_trace_id(Uuid::new_v4().to_string());

            let receivers = self
                .bus
                .publish(&self.config.channel, &envelope)
                .await
                .with_context(|| format!("publishing {}", item.id))?;

            if receivers == 0 {
                warn!(
                    "No subscriber on '{}', item {} will not be analyzed",
                    self.config.channel, item.id
                );
                report.undelivered += 1;
            }

            self.dedup
                .add(&comment.external_id)
                .await
                .with_context(|| format!("marking {} processed", comment.external_id))?;

            debug!("Published {}", item.id);
            report.published += 1;
        }

        Ok(report)
    }

    fn to_feedback(&self, comment: &SourceComment) -> FeedbackItem {
        let id = FeedbackItem::pipeline_id(self.source.source_tag(), &comment.external_id);
        let mut item = FeedbackItem::new(
            id,
            self.source.source_name(),
            comment.body.clone(),
            comment.created_at,
        );
        item.author = Some(
            comment
                .author
                .clone()
                .unwrap_or_else(|| DELETED_AUTHOR.to_string()),
        );
        item.url_to_source = Some(comment.permalink.clone());
        item
    }
}
