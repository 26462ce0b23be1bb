//! Feedback analysis - Layer 1 of the pipeline
//!
//! Classifies each raw feedback item with an LLM in three stages
//! (sentiment, severity, topic) and forwards the enriched item.

pub mod agent;
pub mod classifier;
pub mod inference;
pub mod parsing;
pub mod prompts;

pub use agent::{AnalysisAgent, AnalysisAgentConfig, HandleOutcome};
pub use classifier::Classifier;
pub use inference::{InferenceClient, InferenceError, OllamaClient};
