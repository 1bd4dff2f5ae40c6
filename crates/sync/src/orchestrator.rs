//! Dispatch: trip creation, session and estimator as one unit

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use prana_backend::{TripBackend, TripFilter};
use prana_channel::{ChannelConnector, ChannelScope, ChannelSession};
use prana_core::EstimatorConfig;
use prana_domain::{AmbulanceId, Incident, MatchCandidate, NewTrip, PartyContext, Trip, TripId};

use crate::active::ActiveTrip;
use crate::error::{Result, SyncError};
use crate::estimator::{EstimatorHandle, EtaEstimator};
use crate::mirror::TripMirror;

/// Creates trips for one ambulance and brings them live.
///
/// A trip is created staged, its session is opened and its estimator
/// started, and only then is it committed. Any failure, or the caller
/// abandoning the dispatch, discards the staged trip so the hospital never
/// sees a half-created one.
pub struct DispatchOrchestrator {
    ambulance_id: AmbulanceId,
    backend: Arc<dyn TripBackend>,
    connector: Arc<dyn ChannelConnector>,
    estimator: EtaEstimator,
}

impl DispatchOrchestrator {
    /// Orchestrator acting for `ambulance_id`
    pub fn new(
        ambulance_id: AmbulanceId,
        backend: Arc<dyn TripBackend>,
        connector: Arc<dyn ChannelConnector>,
        estimator: &EstimatorConfig,
    ) -> Self {
        Self {
            ambulance_id,
            backend,
            connector,
            estimator: EtaEstimator::new(estimator),
        }
    }

    /// Acting ambulance
    pub fn ambulance_id(&self) -> AmbulanceId {
        self.ambulance_id
    }

    /// Party context used for collaborator calls
    pub fn context(&self) -> PartyContext {
        PartyContext::Ambulance(self.ambulance_id)
    }

    /// Collaborator this orchestrator talks to
    pub fn backend(&self) -> &Arc<dyn TripBackend> {
        &self.backend
    }

    /// Dispatch to `candidate`'s hospital
    pub async fn dispatch(&self, incident: &Incident, candidate: &MatchCandidate) -> Result<ActiveTrip> {
        self.dispatch_until(incident, candidate, &CancellationToken::new())
            .await
    }

    /// Dispatch, giving up if `cancel` fires before the trip is committed
    pub async fn dispatch_until(
        &self,
        incident: &Incident,
        candidate: &MatchCandidate,
        cancel: &CancellationToken,
    ) -> Result<ActiveTrip> {
        let request = NewTrip {
            incident_id: incident.id,
            ambulance_id: self.ambulance_id,
            hospital_id: candidate.hospital.id,
            eta_minutes: candidate.eta_min,
            distance_km: candidate.dist_km,
        };
        let staged = self.backend.create_trip(request).await?;
        let trip_id = staged.id;

        let prepared = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.go_live(staged) => Some(result),
        };

        let (session, mirror, estimator) = match prepared {
            Some(Ok(parts)) if !cancel.is_cancelled() => parts,
            Some(Ok((session, _, estimator))) => {
                estimator.stop().await;
                session.close().await;
                self.discard(trip_id).await;
                return Err(SyncError::Abandoned(trip_id));
            }
            Some(Err(e)) => {
                self.discard(trip_id).await;
                return Err(e);
            }
            None => {
                self.discard(trip_id).await;
                return Err(SyncError::Abandoned(trip_id));
            }
        };

        if let Err(e) = self.backend.commit_trip(trip_id).await {
            estimator.stop().await;
            session.close().await;
            self.discard(trip_id).await;
            return Err(e.into());
        }

        info!(
            %trip_id,
            ambulance_id = %self.ambulance_id,
            hospital_id = %candidate.hospital.id,
            eta = candidate.eta_min,
            "Trip dispatched"
        );
        Ok(ActiveTrip::start(
            self.context(),
            Arc::clone(&self.backend),
            mirror,
            session,
            estimator,
            trip_id,
        ))
    }

    /// Pick up a non-terminal trip already on record for this ambulance.
    ///
    /// The estimator restarts from the recorded ETA.
    pub async fn resume(&self) -> Result<Option<ActiveTrip>> {
        let trips = self
            .backend
            .list_trips(TripFilter::Ambulance(self.ambulance_id))
            .await?;
        let Some(trip) = trips.into_iter().find(Trip::is_active) else {
            return Ok(None);
        };
        let trip_id = trip.id;
        let (session, mirror, estimator) = self.go_live(trip).await?;
        info!(%trip_id, ambulance_id = %self.ambulance_id, "Resumed active trip");
        Ok(Some(ActiveTrip::start(
            self.context(),
            Arc::clone(&self.backend),
            mirror,
            session,
            estimator,
            trip_id,
        )))
    }

    async fn go_live(&self, trip: Trip) -> Result<(ChannelSession, TripMirror, EstimatorHandle)> {
        let session = self.connector.open(ChannelScope::Trip(trip.id)).await?;
        let mirror = TripMirror::new(trip);
        let estimator = self.estimator.spawn(mirror.clone(), session.publisher());
        Ok((session, mirror, estimator))
    }

    async fn discard(&self, trip_id: TripId) {
        if let Err(e) = self.backend.discard_trip(trip_id).await {
            warn!(%trip_id, error = %e, "Failed to discard staged trip");
        }
    }
}

impl std::fmt::Debug for DispatchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchOrchestrator")
            .field("ambulance_id", &self.ambulance_id)
            .field("estimator", &self.estimator)
            .finish()
    }
}
