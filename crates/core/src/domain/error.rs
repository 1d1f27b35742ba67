// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid job state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Unknown tier: {0}")]
    UnknownTier(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
