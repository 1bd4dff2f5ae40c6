//! Ambulance console: incident intake, matching and the single active trip

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use prana_backend::MatchCandidates;
use prana_domain::{Incident, IncidentId, MatchCandidate, NewIncident, Trip};

use crate::active::ActiveTrip;
use crate::error::{Result, SyncError};
use crate::orchestrator::DispatchOrchestrator;

/// Ambulance-side driver.
///
/// Holds at most one active trip, so two estimators never run for the
/// same ambulance.
#[derive(Debug)]
pub struct AmbulanceConsole {
    orchestrator: Arc<DispatchOrchestrator>,
    active: Option<ActiveTrip>,
}

impl AmbulanceConsole {
    /// Console over `orchestrator`. Call [`resume`](Self::resume) to pick
    /// up a trip left active by a previous run.
    pub fn new(orchestrator: Arc<DispatchOrchestrator>) -> Self {
        Self {
            orchestrator,
            active: None,
        }
    }

    /// Resume a non-terminal trip on record, if any
    pub async fn resume(&mut self) -> Result<Option<Trip>> {
        if let Some(active) = self.current() {
            return Ok(active.snapshot());
        }
        self.active = self.orchestrator.resume().await?;
        Ok(self.active.as_ref().and_then(ActiveTrip::snapshot))
    }

    /// Record a new incident
    pub async fn report_incident(&self, request: NewIncident) -> Result<Incident> {
        let incident = self.orchestrator.backend().create_incident(request).await?;
        info!(incident_id = %incident.id, emergency = %incident.emergency_type, "Incident reported");
        Ok(incident)
    }

    /// Ranked hospitals for an incident, best first
    pub async fn rank(&self, incident_id: IncidentId) -> Result<MatchCandidates> {
        Ok(self.orchestrator.backend().rank_hospitals(incident_id).await?)
    }

    /// Dispatch to the chosen candidate
    pub async fn dispatch(&mut self, incident: &Incident, candidate: &MatchCandidate) -> Result<Trip> {
        self.dispatch_until(incident, candidate, &CancellationToken::new())
            .await
    }

    /// Dispatch, abandoning if `cancel` fires before the trip goes live
    pub async fn dispatch_until(
        &mut self,
        incident: &Incident,
        candidate: &MatchCandidate,
        cancel: &CancellationToken,
    ) -> Result<Trip> {
        if let Some(active) = self.current() {
            return Err(SyncError::TripAlreadyActive {
                ambulance: self.orchestrator.ambulance_id(),
                trip: active.trip_id(),
            });
        }
        let active = self
            .orchestrator
            .dispatch_until(incident, candidate, cancel)
            .await?;
        let trip = active.snapshot().ok_or(SyncError::NoActiveTrip)?;
        self.active = Some(active);
        Ok(trip)
    }

    /// The active trip, if one is under way
    pub fn current(&self) -> Option<&ActiveTrip> {
        self.active.as_ref().filter(|active| active.is_active())
    }

    /// Request signal priority on the active trip
    pub async fn request_priority(&mut self) -> Result<Trip> {
        match self.active.as_mut() {
            Some(active) => active.request_priority().await,
            None => Err(SyncError::NoActiveTrip),
        }
    }

    /// Report arrival of the active trip and release it
    pub async fn mark_arrived(&mut self) -> Result<Trip> {
        let Some(active) = self.active.as_mut() else {
            return Err(SyncError::NoActiveTrip);
        };
        let trip = active.mark_arrived().await?;
        self.active = None;
        Ok(trip)
    }

    /// Stop local activity, leaving any active trip on record
    pub async fn shutdown(&mut self) {
        if let Some(active) = self.active.take() {
            active.detach().await;
        }
    }
}
