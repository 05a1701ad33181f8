//! Error taxonomy for the risk service
//!
//! Every failure the core can produce maps to one [`ServiceError`] variant so
//! callers can tell bad input apart from a broken server or a retrain that
//! did not take.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the serving and retrain paths
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ServiceError {
    /// Malformed or missing request field
    #[error("validation error: {0}")]
    Validation(String),

    /// No persisted artifact (or its schema) at the configured location
    #[error("model artifact missing: {0}")]
    ArtifactMissing(String),

    /// Artifact exists but cannot be deserialized or its schema is malformed
    #[error("model artifact corrupt: {0}")]
    ArtifactCorrupt(String),

    /// The active backend could not score a validated input
    #[error("inference error: {0}")]
    Inference(String),

    /// Training upload has the wrong shape or non-binary labels
    #[error("dataset shape error: {0}")]
    DatasetShape(String),

    /// Training, persistence, or reload failed during retrain
    #[error("retrain failed: {0}")]
    Retrain(String),
}

/// Stable, serializable error kind exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    ArtifactMissing,
    ArtifactCorrupt,
    InferenceError,
    DatasetShapeError,
    RetrainError,
}

impl ServiceError {
    /// Kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Validation(_) => ErrorKind::ValidationError,
            ServiceError::ArtifactMissing(_) => ErrorKind::ArtifactMissing,
            ServiceError::ArtifactCorrupt(_) => ErrorKind::ArtifactCorrupt,
            ServiceError::Inference(_) => ErrorKind::InferenceError,
            ServiceError::DatasetShape(_) => ErrorKind::DatasetShapeError,
            ServiceError::Retrain(_) => ErrorKind::RetrainError,
        }
    }

    /// True when the caller can fix the problem by changing its input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServiceError::Validation(_) | ServiceError::DatasetShape(_)
        )
    }

    /// Wire body for this error
    pub fn to_reply(&self) -> ErrorReply {
        ErrorReply {
            error: self.kind(),
            message: self.to_string(),
            client_error: self.is_client_error(),
        }
    }
}

/// Error body returned in place of a successful reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: ErrorKind,
    pub message: String,
    pub client_error: bool,
}
