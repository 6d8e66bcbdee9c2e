//! Error types for the wealth advisor orchestrator

use crate::models::FailureKind;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // User-visible pipeline failures
    // =============================

    #[error("Synthesis failed: {0}")]
    SynthesisFailure(String),

    #[error("Request cancelled")]
    Cancelled,

    // =============================
    // Registry / configuration
    // =============================

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid question: {0}")]
    InvalidQuestion(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Failure modes at the tool adapter boundary.
///
/// "No results" is never an error; adapters return an empty payload instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("request rejected: {0}")]
    Validation(String),
}

impl AdapterError {
    /// Timeouts and transient (5xx-class) failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AdapterError::Timeout(_) | AdapterError::Transient(_))
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            AdapterError::Timeout(_) => FailureKind::Timeout,
            AdapterError::Transient(_) => FailureKind::Transient,
            AdapterError::Validation(_) => FailureKind::Validation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AdapterError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(AdapterError::Transient("503".into()).is_retryable());
        assert!(!AdapterError::Validation("bad symbol".into()).is_retryable());
    }

    #[test]
    fn test_failure_kind() {
        assert_eq!(AdapterError::Timeout(Duration::from_secs(1)).kind(), FailureKind::Timeout);
        assert_eq!(AdapterError::Transient("503".into()).kind(), FailureKind::Transient);
        assert_eq!(AdapterError::Validation("no ticker".into()).kind(), FailureKind::Validation);
    }
}
