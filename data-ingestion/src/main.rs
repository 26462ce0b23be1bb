use anyhow::Result;
use common::{retry_forever, PipelineConfig, RedisBus};
use data_ingestion::{IngestionAgent, IngestionAgentConfig, RedditConnector, RedisDedupStore};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    common::init_logging();

    info!("🚀 Starting Feedback Ingestion Agent");

    let config = PipelineConfig::load()?;
    // Missing credentials are the one failure we exit on
    config.validate_reddit()?;

    let bus = retry_forever("connect to Redis", config.retry_delay(), || {
        RedisBus::connect(&config.redis.url)
    })
    .await;

    let dedup = RedisDedupStore::new(bus.connection(), config.ingestion.processed_set_key.clone());
    let source = RedditConnector::new(config.reddit.clone())?;

    let agent = IngestionAgent::new(
        Arc::new(source),
        Arc::new(dedup),
        Arc::new(bus),
        IngestionAgentConfig::from_pipeline(&config),
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
