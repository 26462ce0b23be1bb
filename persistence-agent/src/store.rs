//! Feedback store interface
//!
//! Writes are idempotent upserts keyed by the item id. Replaying an item
//! converges on the same row; a later analysis of the same id overwrites the
//! labels and leaves the ingestion fields alone.

use async_trait::async_trait;
use common::FeedbackItem;
use thiserror::Error;

/// Upper bound of the `id` column
pub const MAX_ID_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The database is unreachable; the write should be retried
    #[error("database connection error: {0}")]
    Connection(String),

    #[error("database query failed: {0}")]
    Query(String),

    #[error("invalid feedback item: {0}")]
    Invalid(String),
}

impl StoreError {
    pub fn is_connection(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[async_trait]
pub trait FeedbackStore: Send + Sync {
    /// Create the feedback table if it does not exist yet
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Insert the item or overwrite the classification of an existing row
    async fn upsert(&self, item: &FeedbackItem) -> Result<UpsertOutcome, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<FeedbackItem>, StoreError>;

    /// Drop the current connection and open a new one
    async fn reconnect(&self) -> Result<(), StoreError>;
}

/// Reject items the table cannot hold
pub fn validate(item: &FeedbackItem) -> Result<(), StoreError> {
    if item.id.trim().is_empty() {
        return Err(StoreError::Invalid("empty id".to_string()));
    }
    if item.id.chars().count() > MAX_ID_LEN {
        return Err(StoreError::Invalid(format!(
            "id '{}' longer than {} characters",
            item.id, MAX_ID_LEN
        )));
    }
    if !item.is_fully_classified() {
        return Err(StoreError::Invalid(format!("{} has no classification", item.id)));
    }
    Ok(())
}
