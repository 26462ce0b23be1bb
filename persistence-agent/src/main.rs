use anyhow::Result;
use common::{retry_forever, PipelineConfig, RedisBus};
use persistence_agent::{PersistenceAgent, PersistenceAgentConfig, PgFeedbackStore};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    common::init_logging();

    info!("🚀 Starting Feedback Persistence Agent");

    let config = PipelineConfig::load()?;
    config.validate_database()?;

    let store = retry_forever("connect to PostgreSQL", config.retry_delay(), || {
        PgFeedbackStore::connect(&config.database)
    })
    .await;

    let bus = retry_forever("connect to Redis", config.retry_delay(), || {
        RedisBus::connect(&config.redis.url)
    })
    .await;

    let agent = PersistenceAgent::new(
        Arc::new(store),
        Arc::new(bus),
        PersistenceAgentConfig::from_pipeline(&config),
    );

    tokio::select! {
        result = agent.run() => {
            result?
        }
        _ = tokio::signal::ctrl_c() => {
            info!("👋 Shutting down gracefully...");
        }
    }

    Ok(())
}
