//! In-memory feedback store (for testing and development)

use crate::store::{validate, FeedbackStore, StoreError, UpsertOutcome};
use async_trait::async_trait;
use common::FeedbackItem;
use std::collections::HashMap;
use tokio::sync::RwLock;

pub struct InMemoryFeedbackStore {
    rows: RwLock<HashMap<String, FeedbackItem>>,
}

impl InMemoryFeedbackStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

impl Default for InMemoryFeedbackStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedbackStore for InMemoryFeedbackStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn upsert(&self, item: &FeedbackItem) -> Result<UpsertOutcome, StoreError> {
        validate(item)?;

        let mut rows = self.rows.write().await;
        match rows.get_mut(&item.id) {
            Some(row) => {
                row.sentiment = item.sentiment;
                row.theme = item.theme;
                row.severity = item.severity;
                row.is_analyzed = true;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                let mut row = item.clone();
                row.is_analyzed = true;
                // Only table columns are kept
                row.extensions.clear();
                rows.insert(row.id.clone(), row);
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn get(&self, id: &str) -> Result<Option<FeedbackItem>, StoreError> {
        Ok(self.rows.read().await.get(id).cloned())
    }

    async fn reconnect(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
