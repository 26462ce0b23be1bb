//! Feedback ingestion - Layer 0 of the pipeline
//!
//! Polls a content source, filters already-seen items through a shared
//! processed-id set and publishes new items on the raw feedback channel.

pub mod agent;
pub mod connectors;
pub mod dedup;

pub use agent::{IngestionAgent, IngestionAgentConfig, IngestionReport};
pub use connectors::{ContentSource, RedditConnector, SourceComment};
pub use dedup::{DedupStore, InMemoryDedupStore, RedisDedupStore};
