//! Feedback item schema carried in envelope payloads and materialized in the store

use crate::error::ProtocolError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Author rendered for items whose author is gone at the source
pub const DELETED_AUTHOR: &str = "[deleted]";

/// Core fields every stage requires in a feedback payload
const REQUIRED_FIELDS: [&str; 3] = ["id", "text_content", "timestamp"];

/// Sentiment label assigned by the classification stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
    /// Inference failed for this item
    Error,
}

impl Sentiment {
    /// The closed label set the model is asked to choose from
    pub const LABELS: [Sentiment; 3] = [Sentiment::Positive, Sentiment::Negative, Sentiment::Neutral];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
            Sentiment::Error => "error",
        }
    }

    /// Exact lookup of a stored label, including `error`
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "positive" => Some(Sentiment::Positive),
            "negative" => Some(Sentiment::Negative),
            "neutral" => Some(Sentiment::Neutral),
            "error" => Some(Sentiment::Error),
            _ => None,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Topic label from the fixed closed set, plus `error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    #[serde(rename = "Bug Report")]
    BugReport,
    #[serde(rename = "Feature Request")]
    FeatureRequest,
    #[serde(rename = "UI/UX Feedback")]
    UiUxFeedback,
    #[serde(rename = "Authentication Issue")]
    AuthenticationIssue,
    #[serde(rename = "Performance")]
    Performance,
    #[serde(rename = "Pricing & Billing")]
    PricingBilling,
    #[serde(rename = "How-To Question")]
    HowToQuestion,
    #[serde(rename = "General Praise")]
    GeneralPraise,
    #[serde(rename = "Miscellaneous")]
    Miscellaneous,
    /// Inference failed for this item
    #[serde(rename = "error")]
    Error,
}

impl Topic {
    /// Closed topic set in enumeration order; earlier labels win when matching
    pub const CLOSED_SET: [Topic; 9] = [
        Topic::BugReport,
        Topic::FeatureRequest,
        Topic::UiUxFeedback,
        Topic::AuthenticationIssue,
        Topic::Performance,
        Topic::PricingBilling,
        Topic::HowToQuestion,
        Topic::GeneralPraise,
        Topic::Miscellaneous,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Topic::BugReport => "Bug Report",
            Topic::FeatureRequest => "Feature Request",
            Topic::UiUxFeedback => "UI/UX Feedback",
            Topic::AuthenticationIssue => "Authentication Issue",
            Topic::Performance => "Performance",
            Topic::PricingBilling => "Pricing & Billing",
            Topic::HowToQuestion => "How-To Question",
            Topic::GeneralPraise => "General Praise",
            Topic::Miscellaneous => "Miscellaneous",
            Topic::Error => "error",
        }
    }

    /// Exact lookup of a stored label, including `error`
    pub fn from_label(label: &str) -> Option<Self> {
        if label == Topic::Error.label() {
            return Some(Topic::Error);
        }
        Topic::CLOSED_SET.iter().copied().find(|t| t.label() == label)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Priority of negative feedback: 0 for non-negative, 1 (Low) to 4 (Critical)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Severity(u8);

impl Severity {
    pub const NONE: Severity = Severity(0);
    pub const LOW: Severity = Severity(1);
    pub const MEDIUM: Severity = Severity(2);
    pub const HIGH: Severity = Severity(3);
    pub const CRITICAL: Severity = Severity(4);

    /// Accepts only the 1..=4 rating the severity rubric allows
    pub fn from_rating(rating: i64) -> Option<Self> {
        match rating {
            1..=4 => Some(Severity(rating as u8)),
            _ => None,
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Severity {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value <= 4 {
            Ok(Severity(value))
        } else {
            Err(format!("severity {} out of range 0..=4", value))
        }
    }
}

impl From<Severity> for u8 {
    fn from(severity: Severity) -> Self {
        severity.0
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of the three classification stages for one item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub sentiment: Sentiment,
    pub severity: Severity,
    pub theme: Topic,
}

/// A single piece of user feedback moving through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackItem {
    /// Stable pipeline id, `{source_tag}_{external_id}`
    pub id: String,
    #[serde(default)]
    pub source: String,
    pub text_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(with = "timestamp_format")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_to_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<Topic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub is_analyzed: bool,
    /// Fields added by stages this schema version does not know about
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl FeedbackItem {
    /// Build an unclassified item as ingestion emits it
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        text_content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            text_content: text_content.into(),
            author: None,
            timestamp,
            url_to_source: None,
            sentiment: None,
            theme: None,
            severity: None,
            is_analyzed: false,
            extensions: Map::new(),
        }
    }

    /// Deterministic pipeline id; the tag keeps ids from different sources apart
    pub fn pipeline_id(source_tag: &str, external_id: &str) -> String {
        format!("{}_{}", source_tag, external_id)
    }

    /// Validate a payload mapping against the schema
    pub fn from_payload(payload: &Map<String, Value>) -> Result<Self, ProtocolError> {
        for field in REQUIRED_FIELDS {
            match payload.get(field) {
                None | Some(Value::Null) => return Err(ProtocolError::MissingField(field)),
                Some(_) => {}
            }
        }

        let item: FeedbackItem = serde_json::from_value(Value::Object(payload.clone()))
            .map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        if item.id.trim().is_empty() {
            return Err(ProtocolError::InvalidField {
                field: "id",
                reason: "must not be empty".to_string(),
            });
        }

        Ok(item)
    }

    /// Serialize into a payload mapping
    pub fn to_payload(&self) -> Result<Map<String, Value>, ProtocolError> {
        match serde_json::to_value(self).map_err(|e| ProtocolError::Malformed(e.to_string()))? {
            Value::Object(map) => Ok(map),
            other => Err(ProtocolError::Malformed(format!(
                "feedback item serialized to non-object: {}",
                other
            ))),
        }
    }

    pub fn apply(&mut self, classification: &Classification) {
        self.sentiment = Some(classification.sentiment);
        self.severity = Some(classification.severity);
        self.theme = Some(classification.theme);
    }

    /// All three classification fields, if every one is populated
    pub fn classification(&self) -> Option<Classification> {
        Some(Classification {
            sentiment: self.sentiment?,
            severity: self.severity?,
            theme: self.theme?,
        })
    }

    pub fn is_fully_classified(&self) -> bool {
        self.classification().is_some()
    }
}

/// Timestamps encode as RFC 3339 and decode from RFC 3339 or epoch seconds
mod timestamp_format {
    use chrono::{DateTime, Utc};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Epoch(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        match RawTimestamp::deserialize(deserializer)? {
            RawTimestamp::Epoch(secs) => super::datetime_from_epoch(secs)
                .ok_or_else(|| D::Error::custom(format!("epoch seconds out of range: {}", secs))),
            RawTimestamp::Text(text) => DateTime::parse_from_rfc3339(&text)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(D::Error::custom),
        }
    }
}

/// Convert fractional epoch seconds (as content sources report them) to an instant
pub fn datetime_from_epoch(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_payload() -> Map<String, Value> {
        json!({
            "id": "reddit_abc123",
            "source": "Reddit",
            "text_content": "Love the new editor",
            "author": "someone",
            "timestamp": 1700000000.5,
            "url_to_source": "https://www.reddit.com/r/Notion/comments/x/y/abc123/"
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_from_payload_accepts_epoch_timestamp() {
        let item = FeedbackItem::from_payload(&sample_payload()).unwrap();
        assert_eq!(item.id, "reddit_abc123");
        assert_eq!(item.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(item.timestamp.timestamp_subsec_millis(), 500);
        assert!(!item.is_analyzed);
        assert!(item.sentiment.is_none());
    }

    #[test]
    fn test_from_payload_missing_id_is_protocol_violation() {
        let mut payload = sample_payload();
        payload.remove("id");
        match FeedbackItem::from_payload(&payload) {
            Err(ProtocolError::MissingField(field)) => assert_eq!(field, "id"),
            other => panic!("Expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_payload_keeps_extension_fields() {
        let mut payload = sample_payload();
        payload.insert("language".to_string(), json!("en"));

        let item = FeedbackItem::from_payload(&payload).unwrap();
        assert_eq!(item.extensions.get("language"), Some(&json!("en")));

        let out = item.to_payload().unwrap();
        assert_eq!(out.get("language"), Some(&json!("en")));
        assert!(out.get("sentiment").is_none());
    }

    #[test]
    fn test_apply_classification() {
        let mut item = FeedbackItem::from_payload(&sample_payload()).unwrap();
        assert!(!item.is_fully_classified());

        item.apply(&Classification {
            sentiment: Sentiment::Negative,
            severity: Severity::HIGH,
            theme: Topic::Performance,
        });

        assert!(item.is_fully_classified());
        let out = item.to_payload().unwrap();
        assert_eq!(out["sentiment"], json!("negative"));
        assert_eq!(out["severity"], json!(3));
        assert_eq!(out["theme"], json!("Performance"));
    }

    #[test]
    fn test_severity_range() {
        assert_eq!(Severity::from_rating(4), Some(Severity::CRITICAL));
        assert_eq!(Severity::from_rating(0), None);
        assert_eq!(Severity::from_rating(5), None);
        assert!(serde_json::from_value::<Severity>(json!(7)).is_err());
    }

    #[test]
    fn test_topic_labels_round_trip() {
        for topic in Topic::CLOSED_SET {
            assert_eq!(Topic::from_label(topic.label()), Some(topic));
        }
        assert_eq!(Topic::from_label("error"), Some(Topic::Error));
        assert_eq!(serde_json::to_value(Topic::PricingBilling).unwrap(), json!("Pricing & Billing"));
    }

    #[test]
    fn test_pipeline_id_is_source_prefixed() {
        assert_eq!(FeedbackItem::pipeline_id("reddit", "k2x9"), "reddit_k2x9");
    }
}
