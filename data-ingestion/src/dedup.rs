//! Processed-id set used to publish each external item once
//!
//! Keyed by the raw external id, not the prefixed pipeline id. Both
//! operations are idempotent, so several ingestion instances can share one
//! Redis-backed set without coordination.

use anyhow::Result;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashSet;
use tokio::sync::RwLock;

#[async_trait]
pub trait DedupStore: Send + Sync {
    async fn contains(&self, external_id: &str) -> Result<bool>;

    async fn add(&self, external_id: &str) -> Result<()>;
}

/// Redis SET shared by every ingestion instance
pub struct RedisDedupStore {
    conn: ConnectionManager,
    key: String,
}

impl RedisDedupStore {
    pub fn new(conn: ConnectionManager, key: impl Into<String>) -> Self {
        Self {
            conn,
            key: key.into(),
        }
    }
}

#[async_trait]
impl DedupStore for RedisDedupStore {
    async fn contains(&self, external_id: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let seen: bool = conn.sismember(&self.key, external_id).await?;
        Ok(seen)
    }

    async fn add(&self, external_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(&self.key, external_id).await?;
        Ok(())
    }
}

/// Process-local set (for testing and single-instance runs)
pub struct InMemoryDedupStore {
    ids: RwLock<HashSet<String>>,
}

impl InMemoryDedupStore {
    pub fn new() -> Self {
        Self {
            ids: RwLock::new(HashSet::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.ids.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.ids.read().await.is_empty()
    }
}

impl Default for InMemoryDedupStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DedupStore for InMemoryDedupStore {
    async fn contains(&self, external_id: &str) -> Result<bool> {
        Ok(self.ids.read().await.contains(external_id))
    }

    async fn add(&self, external_id: &str) -> Result<()> {
        self.ids.write().await.insert(external_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let store = InMemoryDedupStore::new();
        assert!(store.is_empty().await);
        assert!(!store.contains("k9x").await.unwrap());

        store.add("k9x").await.unwrap();
        store.add("k9x").await.unwrap();

        assert!(store.contains("k9x").await.unwrap());
        assert!(!store.contains("reddit_k9x").await.unwrap());
        assert_eq!(store.len().await, 1);
    }
}
