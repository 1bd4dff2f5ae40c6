//! Errors raised by the party-side synchronization layer

use prana_backend::BackendError;
use prana_channel::ChannelError;
use prana_domain::{AmbulanceId, DomainError, TripId};
use thiserror::Error;

/// Synchronization errors
#[derive(Debug, Error)]
pub enum SyncError {
    /// The ambulance already carries a non-terminal trip
    #[error("Ambulance {ambulance} already has active trip {trip}")]
    TripAlreadyActive {
        /// Ambulance
        ambulance: AmbulanceId,
        /// Its active trip
        trip: TripId,
    },

    /// No trip is active for this party
    #[error("No active trip")]
    NoActiveTrip,

    /// Signal priority was already granted; it is never requested twice
    #[error("Signal priority already requested for trip {0}")]
    PriorityAlreadyRequested(TripId),

    /// The trip has arrived and accepts no further requests
    #[error("Trip {0} has already arrived")]
    TripTerminal(TripId),

    /// The caller abandoned a dispatch; the staged trip was discarded
    #[error("Dispatch of trip {0} abandoned")]
    Abandoned(TripId),

    /// Collaborator call failed
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Channel failure
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Domain rule violated locally
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

/// Result alias for synchronization operations
pub type Result<T> = std::result::Result<T, SyncError>;
