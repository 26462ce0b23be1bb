//! Envelope protocol exchanged between agents over the bus
//!
//! An envelope wraps one feedback item. `source_agent` records the last
//! producer only; the payload grows as stages annotate it.

use crate::error::ProtocolError;
use crate::feedback::FeedbackItem;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Current envelope schema version
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Tag describing what the payload holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadType {
    RawFeedback,
    AnalyzedFeedback,
}

impl PayloadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadType::RawFeedback => "raw_feedback",
            PayloadType::AnalyzedFeedback => "analyzed_feedback",
        }
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit exchanged on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub source_agent: String,
    pub payload_type: PayloadType,
    pub payload: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Top-level fields unknown to this version, carried through unchanged
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl Envelope {
    pub fn new(
        source_agent: impl Into<String>,
        payload_type: PayloadType,
        payload: Map<String, Value>,
    ) -> Self {
        Self {
            source_agent: source_agent.into(),
            payload_type,
            payload,
            session_id: None,
            trace_id: None,
            schema_version: SCHEMA_VERSION,
            extensions: Map::new(),
        }
    }

    /// Wrap a feedback item
    pub fn for_feedback(
        source_agent: impl Into<String>,
        payload_type: PayloadType,
        item: &FeedbackItem,
    ) -> Result<Self, ProtocolError> {
        Ok(Self::new(source_agent, payload_type, item.to_payload()?))
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Parse and validate an envelope received from the bus
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        let object = value
            .as_object()
            .ok_or_else(|| ProtocolError::Malformed("envelope is not an object".to_string()))?;

        for field in ["source_agent", "payload_type", "payload"] {
            match object.get(field) {
                None | Some(Value::Null) => return Err(ProtocolError::MissingField(field)),
                Some(_) => {}
            }
        }

        if !object["payload"].is_object() {
            return Err(ProtocolError::InvalidField {
                field: "payload",
                reason: "must be a mapping".to_string(),
            });
        }

        let envelope: Envelope =
            serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        if envelope.source_agent.trim().is_empty() {
            return Err(ProtocolError::InvalidField {
                field: "source_agent",
                reason: "must not be empty".to_string(),
            });
        }

        Ok(envelope)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// Reject envelopes a consumer is not meant to act on
    pub fn expect_type(&self, expected: PayloadType) -> Result<(), ProtocolError> {
        if self.payload_type == expected {
            Ok(())
        } else {
            Err(ProtocolError::UnexpectedPayloadType {
                expected: expected.to_string(),
                found: self.payload_type.to_string(),
            })
        }
    }

    /// The item id, if the payload carries one
    pub fn item_id(&self) -> Option<&str> {
        self.payload.get("id").and_then(Value::as_str)
    }

    /// Validate the payload against the feedback schema
    pub fn feedback(&self) -> Result<FeedbackItem, ProtocolError> {
        FeedbackItem::from_payload(&self.payload)
    }

    /// Write the item's fields into the payload; existing keys are never removed
    pub fn merge_feedback(&mut self, item: &FeedbackItem) -> Result<(), ProtocolError> {
        for (key, value) in item.to_payload()? {
            self.payload.insert(key, value);
        }
        Ok(())
    }

    /// Record a new producer and retag the payload
    pub fn stamp(&mut self, source_agent: impl Into<String>, payload_type: PayloadType) {
        self.source_agent = source_agent.into();
        self.payload_type = payload_type;
    }
}
