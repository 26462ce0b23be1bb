use anyhow::Result;
use common::PipelineConfig;
use data_ingestion::{ContentSource, RedditConnector};
use tracing::info;

/// Fetch the latest comments and print them without publishing anything.
///
/// Run with: cargo run -p data-ingestion --bin probe_source
#[tokio::main]
async fn main() -> Result<()> {
    common::init_logging();

    let config = PipelineConfig::load()?;
    config.validate_reddit()?;

    let connector = RedditConnector::new(config.reddit.clone())?;
    let comments = connector
        .fetch_recent(&config.reddit.subreddit, config.reddit.limit)
        .await?;

    for (n, comment) in comments.iter().enumerate() {
        let preview: String = comment.body.chars().take(80).collect();
        info!(
            "#{} {} by {} at {}: {}",
            n + 1,
            comment.external_id,
            comment.author.as_deref().unwrap_or(common::DELETED_AUTHOR),
            comment.created_at,
            preview
        );
    }

    info!("Probe complete. Received {} comments.", comments.len());
    Ok(())
}
