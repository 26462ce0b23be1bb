use analysis_agent::{AnalysisAgent, AnalysisAgentConfig, Classifier, OllamaClient};
use anyhow::Result;
use common::{retry_forever, PipelineConfig, RedisBus};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    common::init_logging();

    info!("🚀 Starting Feedback Analysis Agent");

    let config = PipelineConfig::load()?;
    config.validate_inference()?;

    let client = OllamaClient::new(&config.inference)?;
    info!(
        "Using model '{}' at {} (timeout {}s)",
        client.model(),
        config.inference.base_url,
        config.inference.timeout_secs
    );

    let bus = retry_forever("connect to Redis", config.retry_delay(), || {
        RedisBus::connect(&config.redis.url)
    })
    .await;

    let agent = AnalysisAgent::new(
        Classifier::new(Arc::new(client), config.inference.max_chars),
        Arc::new(bus),
        AnalysisAgentConfig::from_pipeline(&config),
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
