use std::time::Duration;
use thiserror::Error;

/// Whether retrying the same proposal could plausibly succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Permanent,
}

/// Failure reported by a proposal sink for a single ingest attempt
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error("metadata service unavailable: {0}")]
    Transient(String),

    #[error("ingest attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("proposal rejected by metadata service: {0}")]
    Permanent(String),
}

impl IngestError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent(message.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            IngestError::Transient(_) | IngestError::Timeout(_) => ErrorClass::Transient,
            IngestError::Permanent(_) => ErrorClass::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// Dead-letter publishing is best effort; this error is logged, never retried
#[derive(Debug, Error)]
#[error("dead-letter publish failed: {0:#}")]
pub struct DeadLetterPublishError(#[from] pub anyhow::Error);
