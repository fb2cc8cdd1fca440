use thiserror::Error;

use crate::{generator::GenerationError, services::ServiceError};

/// Errors surfaced by the assessment pipeline
#[derive(Error, Debug)]
pub enum FlowError {
    /// Missing or unusable user input; the session is left untouched
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The primary generate step failed; blocks the transition to results
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Sub-flow not found: {0}")]
    SubFlowNotFound(String),

    /// The sub-flow exists but its guard does not hold for the current session
    #[error("Sub-flow {id} is unavailable: {reason}")]
    SubFlowUnavailable { id: String, reason: String },

    /// A sub-flow whose single collaborator call failed outright
    #[error("Sub-flow {id} failed: {source}")]
    SubFlowFailed {
        id: String,
        #[source]
        source: ServiceError,
    },

    #[error("Document export failed: {0}")]
    ExportFailed(#[source] ServiceError),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FlowError>;
