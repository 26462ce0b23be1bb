//! Turning free-form model output into closed-set labels
//!
//! Models add preamble text and reasoning blocks around the answer. Each
//! parser defends against that and falls back to a fixed default instead of
//! failing.

use common::{Sentiment, Severity, Topic};
use lazy_static::lazy_static;
use regex::Regex;

pub const REASONING_OPEN: &str = "<think>";
pub const REASONING_CLOSE: &str = "</think>";

const SEVERITY_MARKER: &str = "Severity:";
const CATEGORY_MARKER: &str = "Category:";

lazy_static! {
    static ref REASONING_BLOCK: Regex =
        Regex::new(&format!("(?s){}.*?{}", regex::escape(REASONING_OPEN), regex::escape(REASONING_CLOSE)))
            .expect("reasoning block pattern is valid");
}

/// Remove every reasoning block, then trim
pub fn strip_reasoning(response: &str) -> String {
    REASONING_BLOCK.replace_all(response, "").trim().to_string()
}

/// Text after the last `marker`, or the whole text when the marker is absent
fn after_marker<'a>(text: &'a str, marker: &str) -> &'a str {
    match text.rfind(marker) {
        Some(idx) => text[idx + marker.len()..].trim(),
        None => text.trim(),
    }
}

/// Last whitespace-separated token, lowercased and stripped of trailing
/// punctuation, if it names a sentiment label; `neutral` otherwise.
pub fn parse_sentiment(response: &str) -> Sentiment {
    let lowered = response.trim().to_lowercase();

    lowered
        .split_whitespace()
        .last()
        .map(|token| token.trim_end_matches(|c: char| c.is_ascii_punctuation()))
        .and_then(|token| {
            Sentiment::LABELS
                .iter()
                .copied()
                .find(|label| label.as_str() == token)
        })
        .unwrap_or(Sentiment::Neutral)
}

/// Integer rating 1..=4; anything else becomes Medium
pub fn parse_severity(response: &str) -> Severity {
    let cleaned = strip_reasoning(response);
    let rating = after_marker(&cleaned, SEVERITY_MARKER);

    rating
        .parse::<i64>()
        .ok()
        .and_then(Severity::from_rating)
        .unwrap_or(Severity::MEDIUM)
}

/// First closed-set label contained in the answer; `Miscellaneous` otherwise
pub fn parse_topic(response: &str) -> Topic {
    let cleaned = strip_reasoning(response);
    let category = after_marker(&cleaned, CATEGORY_MARKER).to_lowercase();

    Topic::CLOSED_SET
        .iter()
        .copied()
        .find(|topic| category.contains(&topic.label().to_lowercase()))
        .unwrap_or(Topic::Miscellaneous)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentiment_takes_last_token() {
        assert_eq!(parse_sentiment("I think this is Positive."), Sentiment::Positive);
        assert_eq!(parse_sentiment("negative"), Sentiment::Negative);
        assert_eq!(parse_sentiment("  Neutral!  "), Sentiment::Neutral);
        assert_eq!(
            parse_sentiment("<think>\nThe user is upset, not positive.\n</think>\n\nnegative"),
            Sentiment::Negative
        );
    }

    #[test]
    fn test_sentiment_defaults_to_neutral() {
        assert_eq!(parse_sentiment("blah blah"), Sentiment::Neutral);
        assert_eq!(parse_sentiment(""), Sentiment::Neutral);
        assert_eq!(parse_sentiment("positive, mostly"), Sentiment::Neutral);
        // `error` is never accepted from the model
        assert_eq!(parse_sentiment("error"), Sentiment::Neutral);
    }

    #[test]
    fn test_strip_reasoning_handles_multiline_blocks() {
        let response = "<think>\nstep one\nstep two\n</think>\nSeverity: 3<think>again</think>";
        assert_eq!(strip_reasoning(response), "Severity: 3");
        assert_eq!(strip_reasoning("no block here "), "no block here");
    }

    #[test]
    fn test_severity_parsing() {
        assert_eq!(parse_severity("4"), Severity::CRITICAL);
        assert_eq!(parse_severity("Severity: 3"), Severity::HIGH);
        assert_eq!(
            parse_severity("<think>Data loss is critical. Severity: 1?</think>\nSeverity: 4"),
            Severity::CRITICAL
        );
    }

    #[test]
    fn test_severity_fallback_is_medium() {
        assert_eq!(parse_severity("Severity: high"), Severity::MEDIUM);
        assert_eq!(parse_severity("Severity: 9"), Severity::MEDIUM);
        assert_eq!(parse_severity("0"), Severity::MEDIUM);
        assert_eq!(parse_severity(""), Severity::MEDIUM);
        assert_eq!(parse_severity("3 - High: a major feature is broken"), Severity::MEDIUM);
    }

    #[test]
    fn test_topic_matching() {
        assert_eq!(parse_topic("Category: Bug Report"), Topic::BugReport);
        assert_eq!(parse_topic("pricing & billing"), Topic::PricingBilling);
        assert_eq!(
            parse_topic("<think>Maybe a Bug Report?</think>\nCategory: Feature Request"),
            Topic::FeatureRequest
        );
        assert_eq!(parse_topic("I would say this is Performance related."), Topic::Performance);
    }

    #[test]
    fn test_topic_first_label_in_enumeration_order_wins() {
        assert_eq!(
            parse_topic("General Praise, but also a Bug Report"),
            Topic::BugReport
        );
    }

    #[test]
    fn test_topic_defaults_to_miscellaneous() {
        assert_eq!(parse_topic("Category: Shipping"), Topic::Miscellaneous);
        assert_eq!(parse_topic(""), Topic::Miscellaneous);
    }
}
