use std::time::Duration;

use thiserror::Error;

use crate::models::Phase;

/// How an error should be handled by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// User input problem; retry the same action after fixing it.
    Validation,
    /// Network or upstream hiccup; safe to retry.
    Transient,
    /// Credentials rejected; re-authenticate, progress stays on disk.
    Authentication,
    Other,
}

#[derive(Debug, Error)]
pub enum QuizError {
    #[error("Answer Required: select an answer before continuing")]
    AnswerRequired,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid phase transition from {from} to {to}")]
    InvalidTransition { from: Phase, to: Phase },

    #[error("No question batch is loaded")]
    NoActiveBatch,

    #[error("Session is paused")]
    Paused,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Authentication required (status {status})")]
    Unauthorized { status: u16 },

    #[error("Rate limit exceeded for {endpoint}, retry after {retry_after:?}")]
    RateLimited {
        endpoint: String,
        retry_after: Duration,
    },

    #[error("Quiz API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected response from quiz API: {0}")]
    InvalidResponse(String),

    #[error("Progress storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl QuizError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QuizError::AnswerRequired
            | QuizError::Validation(_)
            | QuizError::InvalidTransition { .. }
            | QuizError::NoActiveBatch => ErrorKind::Validation,
            QuizError::Network(_) | QuizError::RateLimited { .. } => ErrorKind::Transient,
            QuizError::Api { status, .. } if *status >= 500 || *status == 408 => {
                ErrorKind::Transient
            }
            QuizError::Unauthorized { .. } => ErrorKind::Authentication,
            _ => ErrorKind::Other,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Transient and worth an immediate backoff retry. A rate limit carries
    /// its own wait, so it goes straight back to the caller.
    pub fn is_retryable(&self) -> bool {
        self.is_transient() && !matches!(self, QuizError::RateLimited { .. })
    }
}

impl From<validator::ValidationErrors> for QuizError {
    fn from(errors: validator::ValidationErrors) -> Self {
        QuizError::Validation(errors.to_string())
    }
}

pub type Result<T, E = QuizError> = std::result::Result<T, E>;
