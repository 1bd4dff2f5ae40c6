//! The ambulance's handle on its one active trip

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use prana_backend::{BackendError, TripBackend};
use prana_channel::{ChannelSession, SessionPublisher};
use prana_domain::{ChannelEvent, DomainError, PartyContext, TimelineEntry, Trip, TripAction, TripId};

use crate::error::{Result, SyncError};
use crate::estimator::{EstimatorExit, EstimatorHandle};
use crate::mirror::TripMirror;

/// A dispatched trip together with its session, estimator and inbound
/// listener.
///
/// All three are torn down on arrival. Dropping the handle stops them
/// without notifying the hospital.
pub struct ActiveTrip {
    context: PartyContext,
    trip_id: TripId,
    backend: Arc<dyn TripBackend>,
    mirror: TripMirror,
    publisher: SessionPublisher,
    session: Option<ChannelSession>,
    estimator: Option<EstimatorHandle>,
    listener: Option<JoinHandle<()>>,
    priority_granted: bool,
}

impl ActiveTrip {
    pub(crate) fn start(
        context: PartyContext,
        backend: Arc<dyn TripBackend>,
        mirror: TripMirror,
        mut session: ChannelSession,
        estimator: EstimatorHandle,
        trip_id: TripId,
    ) -> Self {
        let listener = session
            .take_events()
            .map(|events| tokio::spawn(listen(events, trip_id, Arc::clone(&backend), mirror.clone())));
        let priority_granted = mirror
            .snapshot()
            .is_some_and(|trip| trip.signal_priority_active);

        Self {
            context,
            trip_id,
            backend,
            publisher: session.publisher(),
            mirror,
            session: Some(session),
            estimator: Some(estimator),
            listener,
            priority_granted,
        }
    }

    /// Trip id
    pub fn trip_id(&self) -> TripId {
        self.trip_id
    }

    /// Current local view of the trip
    pub fn snapshot(&self) -> Option<Trip> {
        self.mirror.snapshot()
    }

    /// Shared mirror the estimator works on
    pub fn mirror(&self) -> &TripMirror {
        &self.mirror
    }

    /// Whether the trip is still under way
    pub fn is_active(&self) -> bool {
        self.session.is_some() && self.snapshot().is_some_and(|trip| trip.is_active())
    }

    /// The trip's timeline as recorded by the collaborator
    pub async fn timeline(&self) -> Result<Vec<TimelineEntry>> {
        Ok(self.backend.trip_timeline(self.trip_id).await?)
    }

    /// Request traffic-signal priority.
    ///
    /// One shot: once granted, further requests are rejected here and never
    /// reach the collaborator. The collaborator's new ETA replaces the local
    /// one, even when it is higher, and is published immediately.
    pub async fn request_priority(&mut self) -> Result<Trip> {
        if self.priority_granted {
            return Err(SyncError::PriorityAlreadyRequested(self.trip_id));
        }
        if !self.is_active() {
            return Err(SyncError::TripTerminal(self.trip_id));
        }

        let trip = match self
            .backend
            .apply_action(&self.context, self.trip_id, TripAction::RequestPriority)
            .await
        {
            Ok(trip) => trip,
            Err(BackendError::Domain(DomainError::PriorityAlreadyActive)) => {
                self.priority_granted = true;
                return Err(SyncError::PriorityAlreadyRequested(self.trip_id));
            }
            Err(e) => return Err(e.into()),
        };
        self.priority_granted = true;
        self.mirror.update(|local| local.merge_remote(&trip));
        info!(trip_id = %self.trip_id, eta = trip.eta_minutes, "Signal priority granted");

        if let Err(e) = self.publisher.publish(ChannelEvent::eta_update(trip.eta_minutes)) {
            warn!(trip_id = %self.trip_id, error = %e, "Priority ETA not published");
        }
        Ok(self.snapshot().unwrap_or(trip))
    }

    /// Report arrival.
    ///
    /// On success the estimator is stopped, a final `status_change` is
    /// flushed to the hospital and the session is closed. If the
    /// collaborator call fails nothing changes locally. Calling it again
    /// after arrival returns the terminal trip.
    pub async fn mark_arrived(&mut self) -> Result<Trip> {
        if self.session.is_none() {
            return self.snapshot().ok_or(SyncError::NoActiveTrip);
        }

        let trip = self
            .backend
            .apply_action(&self.context, self.trip_id, TripAction::Arrive)
            .await?;
        self.mirror.update(|local| local.merge_remote(&trip));

        if let Some(estimator) = self.estimator.take() {
            let exit = estimator.stop().await;
            debug!(trip_id = %self.trip_id, ?exit, "Estimator stopped on arrival");
        }
        if let Err(e) = self.publisher.publish(ChannelEvent::StatusChange {
            trip_id: self.trip_id,
            status: trip.status,
        }) {
            warn!(trip_id = %self.trip_id, error = %e, "Arrival not published");
        }
        self.teardown().await;
        info!(trip_id = %self.trip_id, "Trip arrived");
        Ok(self.snapshot().unwrap_or(trip))
    }

    /// Stop local activity without changing the trip. The trip stays
    /// active on record and can be resumed later.
    pub async fn detach(mut self) -> Option<EstimatorExit> {
        let exit = match self.estimator.take() {
            Some(estimator) => Some(estimator.stop().await),
            None => None,
        };
        self.teardown().await;
        exit
    }

    async fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
        if let Some(listener) = self.listener.take() {
            listener.abort();
            let _ = listener.await;
        }
    }
}

impl std::fmt::Debug for ActiveTrip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveTrip")
            .field("context", &self.context)
            .field("trip_id", &self.trip_id)
            .field("trip", &self.mirror.snapshot())
            .field("live", &self.session.is_some())
            .field("priority_granted", &self.priority_granted)
            .finish()
    }
}

impl Drop for ActiveTrip {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

/// Fold remote changes into the mirror when the hospital side reports one
async fn listen(
    mut events: mpsc::Receiver<ChannelEvent>,
    trip_id: TripId,
    backend: Arc<dyn TripBackend>,
    mirror: TripMirror,
) {
    while let Some(event) = events.recv().await {
        match event {
            ChannelEvent::StatusChange { trip_id: changed, status } if changed == trip_id => {
                match backend.get_trip(trip_id).await {
                    Ok(Some(remote)) => {
                        let transition = mirror.update(|local| local.merge_remote(&remote));
                        debug!(%trip_id, %status, ?transition, "Merged remote trip state");
                    }
                    Ok(None) => debug!(%trip_id, "Trip not visible yet"),
                    Err(e) => warn!(%trip_id, error = %e, "Refetch after status change failed"),
                }
            }
            other => debug!(%trip_id, event = other.kind(), "Ignored inbound event"),
        }
    }
}
