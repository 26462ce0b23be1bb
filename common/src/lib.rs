//! Shared building blocks for the feedback pipeline agents
//!
//! This crate holds everything the three agents agree on:
//! - The envelope protocol exchanged over the bus
//! - The feedback item schema and its classification labels
//! - The publish/subscribe bus abstraction (Redis and in-memory)
//! - Pipeline configuration and the fixed-delay retry helper

pub mod bus;
pub mod config;
pub mod envelope;
pub mod error;
pub mod feedback;
pub mod retry;

pub use bus::{
    InMemoryBus, MessageBus, RedisBus, Subscription, ANALYZED_FEEDBACK_CHANNEL,
    RAW_FEEDBACK_CHANNEL,
};
pub use config::PipelineConfig;
pub use envelope::{Envelope, PayloadType};
pub use error::{BusError, ConfigError, ProtocolError};
pub use feedback::{Classification, FeedbackItem, Sentiment, Severity, Topic, DELETED_AUTHOR};
pub use retry::retry_forever;

// Re-exported so agents share one version of these types
pub use chrono::{DateTime, Utc};
pub use uuid::Uuid;

use tracing_subscriber::EnvFilter;

/// Install the process-wide `tracing` subscriber.
///
/// The level comes from `RUST_LOG` and falls back to `info`.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
