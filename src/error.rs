//! Error kinds shared by the store backends, the ontology logic and the HTTP layer.
//!
//! Every failure is classified so callers can react to the kind instead of parsing
//! messages. Backend failures are wrapped untouched in [`OntologyError::Storage`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OntologyError {
    /// Organisation, repository, entity or version does not exist, or is not owned by the
    /// stated repository.
    #[error("{0}")]
    NotFound(String),

    /// Identity already taken, or an update tries to change an immutable field.
    #[error("{0}")]
    Conflict(String),

    /// The request is well formed but the current state forbids it.
    #[error("{0}")]
    NotAcceptable(String),

    /// A required field is missing or contradicts another field.
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, OntologyError>;

impl OntologyError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn not_acceptable(message: impl Into<String>) -> Self {
        Self::NotAcceptable(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
