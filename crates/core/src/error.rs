use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error sum shared by every stage of both cores.
///
/// Only the HTTP edge translates these into status codes; everything below it
/// matches on the variant to decide between degrading (cache, sentiment) and
/// propagating (repository, embedding).
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input: unparseable UUIDs, out-of-range scores, bad matrices.
    /// Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// A referenced entity does not exist (unknown task id, missing anchor).
    #[error("not found: {0}")]
    NotFound(String),

    /// A backing service could not be reached or answered with an error.
    #[error("{service} unavailable: {detail}")]
    Unavailable { service: &'static str, detail: String },

    /// Model inference failed after the engine was loaded.
    #[error("inference error: {0}")]
    Inference(String),

    /// The request was cancelled or the task revoked before completion.
    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Internal(String),
}

impl Error {
    pub fn validation(detail: impl Into<String>) -> Self {
        Self::Validation(detail.into())
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::NotFound(detail.into())
    }

    pub fn unavailable(service: &'static str, detail: impl std::fmt::Display) -> Self {
        Self::Unavailable { service, detail: detail.to_string() }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal(detail.into())
    }

    /// Terminal errors are not retried by the task runner.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound(_) | Self::Cancelled)
    }
}
