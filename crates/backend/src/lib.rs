//! Backend collaborator boundary for PRANA
//!
//! The synchronization core never owns persistent state. Incidents,
//! hospitals and the authoritative trip record live behind the
//! [`TripBackend`] trait, reached through request/response calls.
//!
//! [`InMemoryBackend`] is a reference implementation used by the relay
//! service and by tests. Trips are created in a staged state and become
//! visible to listings only once committed, which lets the dispatcher
//! create a trip, open its channel and start estimation as one unit.

#![warn(missing_docs)]

pub mod error;
pub mod memory;
pub mod ranking;
pub mod seed;

use async_trait::async_trait;
use prana_domain::{
    AmbulanceId, Hospital, HospitalId, HospitalResources, Incident, IncidentId, MatchCandidate,
    NewIncident, NewTrip, PartyContext, TimelineEntry, Trip, TripAction, TripId,
};

pub use error::{BackendError, Result};
pub use memory::InMemoryBackend;

/// Which trips to list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripFilter {
    /// Trips carried by this ambulance
    Ambulance(AmbulanceId),
    /// Trips destined for this hospital
    Hospital(HospitalId),
}

impl TripFilter {
    /// Whether `trip` matches the filter
    pub fn matches(&self, trip: &Trip) -> bool {
        match self {
            TripFilter::Ambulance(id) => trip.ambulance_id == *id,
            TripFilter::Hospital(id) => trip.hospital_id == *id,
        }
    }
}

/// Ranked candidates for one incident, best first.
///
/// Single pass: once consumed the sequence is gone; rank again for a fresh
/// one.
#[derive(Debug)]
pub struct MatchCandidates {
    inner: std::vec::IntoIter<MatchCandidate>,
}

impl MatchCandidates {
    /// Wrap an already ordered list
    pub fn new(ordered: Vec<MatchCandidate>) -> Self {
        Self {
            inner: ordered.into_iter(),
        }
    }
}

impl Iterator for MatchCandidates {
    type Item = MatchCandidate;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for MatchCandidates {}

/// Request/response operations offered by the state and matching collaborator
#[async_trait]
pub trait TripBackend: Send + Sync {
    /// Record a new incident
    async fn create_incident(&self, request: NewIncident) -> Result<Incident>;

    /// Rank hospitals for an incident
    async fn rank_hospitals(&self, incident_id: IncidentId) -> Result<MatchCandidates>;

    /// Create a staged trip, invisible to listings until committed
    async fn create_trip(&self, request: NewTrip) -> Result<Trip>;

    /// Make a staged trip visible. Committing twice is a no-op.
    async fn commit_trip(&self, trip_id: TripId) -> Result<Trip>;

    /// Drop a staged trip. Unknown ids are ignored.
    async fn discard_trip(&self, trip_id: TripId) -> Result<()>;

    /// Committed trips matching `filter`, ordered by id
    async fn list_trips(&self, filter: TripFilter) -> Result<Vec<Trip>>;

    /// A committed trip by id
    async fn get_trip(&self, trip_id: TripId) -> Result<Option<Trip>>;

    /// Apply a party's action; the returned trip carries any new ETA
    async fn apply_action(
        &self,
        party: &PartyContext,
        trip_id: TripId,
        action: TripAction,
    ) -> Result<Trip>;

    /// Store an ETA observed by the ambulance. Returns `None` when the trip
    /// is unknown, staged or terminal.
    async fn record_eta(&self, trip_id: TripId, eta: f64) -> Result<Option<Trip>>;

    /// A trip's timeline, oldest first
    async fn trip_timeline(&self, trip_id: TripId) -> Result<Vec<TimelineEntry>>;

    /// All hospitals
    async fn list_hospitals(&self) -> Result<Vec<Hospital>>;

    /// One hospital
    async fn get_hospital(&self, hospital_id: HospitalId) -> Result<Hospital>;

    /// Replace a hospital's resource record; only that hospital may do so
    async fn update_hospital(
        &self,
        party: &PartyContext,
        hospital_id: HospitalId,
        resources: HospitalResources,
    ) -> Result<Hospital>;
}
