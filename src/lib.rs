//! Wealth Advisor Orchestrator
//!
//! Answers a natural-language financial question by:
//! - Classifying it into the capabilities worth consulting
//! - Querying the matching external sources concurrently, with per-tool
//!   timeouts, bounded retries and a circuit breaker
//! - Normalizing every payload into common context records
//! - Deduplicating, ranking and scoring the combined context
//! - Handing question and context to a language model for the final answer
//!
//! PIPELINE:
//! QUESTION → CLASSIFY → FAN-OUT → NORMALIZE → COMBINE → SYNTHESIZE

pub mod agent;
pub mod api;
pub mod audit;
pub mod classifier;
pub mod config;
pub mod context;
pub mod error;
pub mod execution;
pub mod gemini;
pub mod models;
pub mod synthesis;
pub mod tools;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use agent::Orchestrator;
pub use classifier::QueryClassifier;
pub use config::OrchestratorConfig;
