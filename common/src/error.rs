//! Error types shared by the pipeline agents

use thiserror::Error;

/// Envelope or payload that violates the inter-agent protocol.
///
/// Consumers log these and drop the message; they never stop a loop.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Text that is not a well-formed envelope
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// A field the protocol requires is absent
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// A field is present but unusable
    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// The consumer received a payload type it does not handle
    #[error("unexpected payload type: expected '{expected}', found '{found}'")]
    UnexpectedPayloadType { expected: String, found: String },
}

/// Bus transport failures
#[derive(Debug, Error)]
pub enum BusError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// In-memory subscriber fell behind and messages were discarded
    #[error("subscriber lagged, {0} messages dropped")]
    Lagged(u64),
}

/// Startup configuration problems; these are the only fatal errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("missing required setting '{0}'")]
    Missing(&'static str),

    #[error("invalid setting '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}
