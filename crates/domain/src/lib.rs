//! Domain module for the PRANA trip synchronization core
//!
//! This crate contains pure domain logic with no I/O dependencies:
//! - Incident, hospital and match candidate records
//! - The trip lifecycle state machine and its invariants
//! - Channel event payloads shared by both parties
//! - Explicit party context (who is acting)

#![warn(missing_docs)]

pub mod error;
pub mod event;
pub mod geo;
pub mod hospital;
pub mod ids;
pub mod incident;
pub mod matching;
pub mod party;
pub mod trip;

pub use error::{DomainError, Result};
pub use event::{ChannelEvent, TimelineEntry, TimelineKind};
pub use geo::GeoPoint;
pub use hospital::{Hospital, HospitalResources, Specialties};
pub use ids::{AmbulanceId, HospitalId, IncidentId, TripId};
pub use incident::{AffordabilityTier, EmergencyType, Incident, NewIncident, Vitals};
pub use matching::{HospitalSummary, MatchCandidate, RouteType};
pub use party::{Party, PartyContext};
pub use trip::{
    EtaBand, NewTrip, NoOpReason, PreparationAction, Transition, Trip, TripAction, TripStatus,
};
