//! Collaborator call errors

use prana_domain::{DomainError, Party};
use thiserror::Error;

/// Errors returned by a [`TripBackend`](crate::TripBackend)
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BackendError {
    /// Record does not exist (or is not visible yet)
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Record kind
        kind: &'static str,
        /// Record identifier
        id: u64,
    },

    /// The acting party does not own this action or record
    #[error("Forbidden: {party} may not {operation}")]
    Forbidden {
        /// Acting party kind
        party: Party,
        /// What was attempted
        operation: String,
    },

    /// Request conflicts with existing state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Request rejected by a domain rule
    #[error("Domain rule violated: {0}")]
    Domain(#[from] DomainError),

    /// The collaborator could not be reached
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// Whether retrying the same call later could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Unavailable(_))
    }
}

/// Result alias for backend calls
pub type Result<T> = std::result::Result<T, BackendError>;
