//! Content-source connectors
//!
//! A connector fetches the most recent items of a named collection. It is
//! consumed read-only by the ingestion agent.

pub mod reddit;

pub use reddit::RedditConnector;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One item as the content source reports it
#[derive(Debug, Clone, PartialEq)]
pub struct SourceComment {
    /// Id assigned by the source, unprefixed
    pub external_id: String,
    /// `None` when the author account no longer exists
    pub author: Option<String>,
    pub body: String,
    pub created_at: DateTime<Utc>,
    /// Absolute link back to the item
    pub permalink: String,
}

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Short tag used to prefix pipeline ids (e.g. `reddit`)
    fn source_tag(&self) -> &str;

    /// Human-readable source name stored with each item (e.g. `Reddit`)
    fn source_name(&self) -> &str;

    /// Up to `limit` most recent items of `collection`, newest first
    async fn fetch_recent(&self, collection: &str, limit: usize) -> Result<Vec<SourceComment>>;
}
