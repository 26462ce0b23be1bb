//! PostgreSQL feedback store
//!
//! One row per feedback item in the `feedback` table. The upsert never
//! touches the ingestion columns of an existing row, only the labels.

use crate::store::{validate, FeedbackStore, StoreError, UpsertOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::config::DatabaseConfig;
use common::{FeedbackItem, Sentiment, Severity, Topic};
use serde_json::Map;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Row};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS feedback (
        id VARCHAR(64) PRIMARY KEY,
        source VARCHAR(50) NOT NULL,
        text_content TEXT NOT NULL,
        author VARCHAR(100),
        timestamp TIMESTAMPTZ NOT NULL,
        url_to_source TEXT,
        sentiment VARCHAR(20),
        theme VARCHAR(100),
        severity INTEGER,
        is_analyzed BOOLEAN DEFAULT FALSE
    )
"#;

// `xmax = 0` only holds for a freshly inserted tuple
const UPSERT: &str = r#"
    INSERT INTO feedback (
        id, source, text_content, author, timestamp, url_to_source,
        sentiment, theme, severity, is_analyzed
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, TRUE)
    ON CONFLICT (id) DO UPDATE SET
        sentiment = EXCLUDED.sentiment,
        theme = EXCLUDED.theme,
        severity = EXCLUDED.severity,
        is_analyzed = TRUE
    RETURNING (xmax = 0) AS inserted
"#;

const SELECT_BY_ID: &str = r#"
    SELECT id, source, text_content, author, timestamp, url_to_source,
           sentiment, theme, severity, is_analyzed
    FROM feedback
    WHERE id = $1
"#;

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Connection(e.to_string()),
            _ => StoreError::Query(e.to_string()),
        }
    }
}

/// A `feedback` row as stored
#[derive(Debug, FromRow)]
struct FeedbackRow {
    id: String,
    source: String,
    text_content: String,
    author: Option<String>,
    timestamp: DateTime<Utc>,
    url_to_source: Option<String>,
    sentiment: Option<String>,
    theme: Option<String>,
    severity: Option<i32>,
    is_analyzed: Option<bool>,
}

impl TryFrom<FeedbackRow> for FeedbackItem {
    type Error = StoreError;

    fn try_from(row: FeedbackRow) -> Result<Self, Self::Error> {
        let sentiment = row
            .sentiment
            .map(|label| {
                Sentiment::from_label(&label)
                    .ok_or_else(|| StoreError::Query(format!("unknown sentiment '{}'", label)))
            })
            .transpose()?;

        let theme = row
            .theme
            .map(|label| {
                Topic::from_label(&label)
                    .ok_or_else(|| StoreError::Query(format!("unknown theme '{}'", label)))
            })
            .transpose()?;

        let severity = row
            .severity
            .map(|value| {
                u8::try_from(value)
                    .map_err(|e| e.to_string())
                    .and_then(Severity::try_from)
                    .map_err(StoreError::Query)
            })
            .transpose()?;

        Ok(FeedbackItem {
            id: row.id,
            source: row.source,
            text_content: row.text_content,
            author: row.author,
            timestamp: row.timestamp,
            url_to_source: row.url_to_source,
            sentiment,
            theme,
            severity,
            is_analyzed: row.is_analyzed.unwrap_or(false),
            extensions: Map::new(),
        })
    }
}

pub struct PgFeedbackStore {
    config: DatabaseConfig,
    pool: RwLock<PgPool>,
}

impl PgFeedbackStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = Self::open_pool(config).await?;

        info!("✅ Connected to PostgreSQL");

        Ok(Self {
            config: config.clone(),
            pool: RwLock::new(pool),
        })
    }

    async fn open_pool(config: &DatabaseConfig) -> Result<PgPool, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(&config.url)
            .await?;
        Ok(pool)
    }

    async fn pool(&self) -> PgPool {
        self.pool.read().await.clone()
    }
}

#[async_trait]
impl FeedbackStore for PgFeedbackStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool().await).await?;

        info!("✅ Feedback table is ready");

        Ok(())
    }

    async fn upsert(&self, item: &FeedbackItem) -> Result<UpsertOutcome, StoreError> {
        validate(item)?;

        let row = sqlx::query(UPSERT)
            .bind(&item.id)
            .bind(&item.source)
            .bind(&item.text_content)
            .bind(&item.author)
            .bind(item.timestamp)
            .bind(&item.url_to_source)
            .bind(item.sentiment.map(|s| s.as_str()))
            .bind(item.theme.map(|t| t.label()))
            .bind(item.severity.map(|s| i32::from(s.value())))
            .fetch_one(&self.pool().await)
            .await?;

        let inserted: bool = row.try_get("inserted")?;
        debug!(id = %item.id, inserted, "Upserted feedback");

        Ok(if inserted {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn get(&self, id: &str) -> Result<Option<FeedbackItem>, StoreError> {
        let row = sqlx::query_as::<_, FeedbackRow>(SELECT_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool().await)
            .await?;

        row.map(FeedbackItem::try_from).transpose()
    }

    async fn reconnect(&self) -> Result<(), StoreError> {
        let fresh = Self::open_pool(&self.config).await?;
        let stale = std::mem::replace(&mut *self.pool.write().await, fresh);
        stale.close().await;

        info!("✅ Reconnected to PostgreSQL");

        Ok(())
    }
}
