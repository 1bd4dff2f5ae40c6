//! Domain errors
//!
//! Pure domain errors with no infrastructure dependencies

use thiserror::Error;

use crate::trip::{TripAction, TripStatus};

/// Errors raised by domain rules
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Input failed validation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The action is not allowed from the trip's current status
    #[error("Action {action} not allowed while trip is {status}")]
    InvalidTransition {
        /// Requested action
        action: TripAction,
        /// Status at the time of the request
        status: TripStatus,
    },

    /// Signal priority was already granted for this trip
    #[error("Signal priority already active")]
    PriorityAlreadyActive,

    /// ETA value is not a finite number
    #[error("Invalid ETA value: {0}")]
    InvalidEta(f64),
}

/// Result alias for domain operations
pub type Result<T> = std::result::Result<T, DomainError>;
