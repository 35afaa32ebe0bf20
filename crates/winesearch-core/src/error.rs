use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::types::{BackendKind, Capability, WineId};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// One rejected field of a raw record.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldIssue {
    pub field: String,
    pub problem: String,
}

/// Every problem found in one raw record. `id` is absent when the record has
/// no usable id.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize)]
pub struct ValidationError {
    pub id: Option<WineId>,
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    pub fn has_issue(&self, field: &str) -> bool {
        self.issues.iter().any(|i| i.field == field)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "record {} rejected: ", id)?,
            None => f.write_str("record rejected: ")?,
        }
        for (i, issue) in self.issues.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{} {}", issue.field, issue.problem)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    #[error("embedding model unavailable: {0}")]
    Unavailable(String),

    #[error("embedding timed out after {0:?}")]
    Timeout(Duration),

    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("nothing to embed")]
    EmptyInput,

    #[error("embedding failed: {0}")]
    Failed(String),
}

/// Backend-side failure, classified for the retry envelope.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("transient backend error: {0}")]
    Transient(String),

    #[error("permanent backend error: {0}")]
    Permanent(String),
}

impl BackendError {
    pub fn transient(msg: impl fmt::Display) -> Self {
        BackendError::Transient(msg.to_string())
    }

    pub fn permanent(msg: impl fmt::Display) -> Self {
        BackendError::Permanent(msg.to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum QueryError {
    #[error("{backend} backend does not support {capability}")]
    UnsupportedOperation { backend: BackendKind, capability: Capability },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("{backend} backend unavailable: {reason}")]
    BackendUnavailable { backend: BackendKind, reason: String },

    #[error("{backend} backend rejected the query: {reason}")]
    BackendRejected { backend: BackendKind, reason: String },
}

impl QueryError {
    /// Maps a backend failure to its caller-facing form. The backend's own
    /// message is dropped; callers log it before converting.
    pub fn from_backend(backend: BackendKind, err: &BackendError) -> Self {
        match err {
            BackendError::Transient(_) => QueryError::BackendUnavailable {
                backend,
                reason: "no answer after retries".to_string(),
            },
            BackendError::Permanent(_) => QueryError::BackendRejected {
                backend,
                reason: "query not accepted".to_string(),
            },
        }
    }
}

/// Errors the retry envelope knows how to classify.
pub trait Retryable {
    fn is_transient(&self) -> bool;
    fn timed_out(after: Duration) -> Self;
}

impl Retryable for BackendError {
    fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transient(_))
    }

    fn timed_out(after: Duration) -> Self {
        BackendError::Transient(format!("timed out after {:?}", after))
    }
}

impl Retryable for EmbeddingError {
    fn is_transient(&self) -> bool {
        !matches!(self, EmbeddingError::DimensionMismatch { .. } | EmbeddingError::EmptyInput)
    }

    fn timed_out(after: Duration) -> Self {
        EmbeddingError::Timeout(after)
    }
}
