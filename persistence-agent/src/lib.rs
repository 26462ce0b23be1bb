//! Feedback persistence - Layer 2 of the pipeline
//!
//! Upserts analyzed feedback into the relational store the dashboard reads.

pub mod agent;
pub mod memory;
pub mod postgres;
pub mod store;

pub use agent::{HandleOutcome, PersistenceAgent, PersistenceAgentConfig};
pub use memory::InMemoryFeedbackStore;
pub use postgres::PgFeedbackStore;
pub use store::{FeedbackStore, StoreError, UpsertOutcome};
