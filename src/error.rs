//! Error types shared by the form, the service client and the controllers.

use thiserror::Error;

/// Local, pre-network rejection of the form. Blocks the triggering action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a repository path.")]
    MissingRepoPath,

    #[error("{field} must be a whole number of at least {min} pixels (got {input:?})")]
    InvalidDimension {
        field: &'static str,
        input: String,
        min: u32,
    },

    #[error("{field} must be a positive whole number (got {input:?})")]
    InvalidNumber { field: &'static str, input: String },
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Failure talking to the rendering service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Transport failure or non-success HTTP status.
    #[error("{0}")]
    Request(String),

    /// Transport success, but the body carried an explicit `error` field.
    #[error("{0}")]
    Server(String),

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a user-triggered action that did not go through.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("{0}")]
    Unavailable(String),
}
