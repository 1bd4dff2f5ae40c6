//! Hospital console synchronizer
//!
//! The hospital never patches its view from event payloads. Any trip event
//! on its channel triggers a full re-read of its trips from the
//! collaborator. Each refresh carries a generation number and results older
//! than the last applied one are dropped, so overlapping refreshes cannot
//! roll the view back.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use prana_backend::{TripBackend, TripFilter};
use prana_channel::{ChannelConnector, ChannelScope, ChannelSession, LinkState, SessionPublisher};
use prana_domain::{
    ChannelEvent, Hospital, HospitalId, HospitalResources, PartyContext, TimelineEntry, Trip,
    TripAction, TripId, TripStatus,
};

use crate::error::Result;

/// Change derived from one refresh
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleChange {
    /// A trip seen for the first time
    Incoming(Trip),
    /// A known trip changed
    Updated(Trip),
    /// A trip arrived. Reported once per trip.
    Arrived(Trip),
}

/// Outcome of a refresh
#[derive(Debug, Clone, PartialEq)]
pub enum Refresh {
    /// Applied; these are the changes it produced
    Applied(Vec<ConsoleChange>),
    /// A newer refresh already landed; this one was dropped
    Stale,
}

#[derive(Debug, Default)]
struct ConsoleView {
    applied: u64,
    loaded: bool,
    active: BTreeMap<TripId, Trip>,
    arrived: HashSet<TripId>,
}

impl ConsoleView {
    /// Replace the active set with `trips` and report what changed
    fn apply(&mut self, trips: Vec<Trip>) -> Vec<ConsoleChange> {
        let mut changes = Vec::new();
        let mut active = BTreeMap::new();

        for trip in trips {
            if trip.status == TripStatus::Arrived {
                // arrivals already on record at session start are history
                if self.arrived.insert(trip.id) && self.loaded {
                    changes.push(ConsoleChange::Arrived(trip));
                }
                continue;
            }
            match self.active.get(&trip.id) {
                None => changes.push(ConsoleChange::Incoming(trip.clone())),
                Some(known) if *known != trip => changes.push(ConsoleChange::Updated(trip.clone())),
                Some(_) => {}
            }
            active.insert(trip.id, trip);
        }

        self.active = active;
        self.loaded = true;
        changes
    }
}

struct Inner {
    context: PartyContext,
    hospital_id: HospitalId,
    backend: Arc<dyn TripBackend>,
    view: RwLock<ConsoleView>,
    generation: AtomicU64,
    changes: broadcast::Sender<ConsoleChange>,
}

impl Inner {
    async fn refresh(&self) -> Result<Refresh> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let trips = self
            .backend
            .list_trips(TripFilter::Hospital(self.hospital_id))
            .await?;

        let changes = {
            let mut view = self.view.write();
            if generation <= view.applied {
                debug!(hospital_id = %self.hospital_id, generation, applied = view.applied, "Stale refresh dropped");
                return Ok(Refresh::Stale);
            }
            view.applied = generation;
            view.apply(trips)
        };

        for change in &changes {
            if let ConsoleChange::Arrived(trip) = change {
                info!(hospital_id = %self.hospital_id, trip_id = %trip.id, "Ambulance arrived");
            }
            // no receivers is fine
            let _ = self.changes.send(change.clone());
        }
        debug!(hospital_id = %self.hospital_id, generation, changes = changes.len(), "Console refreshed");
        Ok(Refresh::Applied(changes))
    }
}

/// Keeps a hospital's view of its incoming trips current.
///
/// Subscribed on the hospital scope for the lifetime of the hospital
/// session. Arrivals are reported exactly once per session.
pub struct HospitalConsoleSynchronizer {
    inner: Arc<Inner>,
    publisher: SessionPublisher,
    link: watch::Receiver<LinkState>,
    session: Option<ChannelSession>,
    listener: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl HospitalConsoleSynchronizer {
    /// Open the hospital session, load the current trips and start
    /// listening
    pub async fn start(
        hospital_id: HospitalId,
        backend: Arc<dyn TripBackend>,
        connector: &dyn ChannelConnector,
    ) -> Result<Self> {
        let mut session = connector.open(ChannelScope::Hospital(hospital_id)).await?;
        let (changes, _) = broadcast::channel(256);
        let inner = Arc::new(Inner {
            context: PartyContext::Hospital(hospital_id),
            hospital_id,
            backend,
            view: RwLock::new(ConsoleView::default()),
            generation: AtomicU64::new(0),
            changes,
        });

        inner.refresh().await?;

        let cancel = CancellationToken::new();
        let listener = session.take_events().map(|events| {
            tokio::spawn(listen(
                Arc::clone(&inner),
                events,
                session.link_state(),
                cancel.clone(),
            ))
        });
        info!(%hospital_id, "Hospital console started");

        Ok(Self {
            inner,
            publisher: session.publisher(),
            link: session.link_state(),
            session: Some(session),
            listener,
            cancel,
        })
    }

    /// Hospital this console serves
    pub fn hospital_id(&self) -> HospitalId {
        self.inner.hospital_id
    }

    /// Party context used for collaborator calls
    pub fn context(&self) -> PartyContext {
        self.inner.context
    }

    /// Non-arrived trips bound for this hospital, by id
    pub fn active_trips(&self) -> Vec<Trip> {
        self.inner.view.read().active.values().cloned().collect()
    }

    /// Watch the hospital session's link to the relay. After a lost link
    /// comes back the console re-reads its trips.
    pub fn link_state(&self) -> watch::Receiver<LinkState> {
        self.link.clone()
    }

    /// Receive changes as refreshes land
    pub fn subscribe(&self) -> broadcast::Receiver<ConsoleChange> {
        self.inner.changes.subscribe()
    }

    /// Re-read all trips now
    pub async fn refresh(&self) -> Result<Refresh> {
        self.inner.refresh().await
    }

    /// Acknowledge an incoming trip
    pub async fn acknowledge(&self, trip_id: TripId) -> Result<Trip> {
        self.act(trip_id, TripAction::Acknowledge).await
    }

    /// Record that a doctor has been assigned
    pub async fn assign_doctor(&self, trip_id: TripId) -> Result<Trip> {
        self.act(trip_id, TripAction::AssignDoc).await
    }

    /// Record that a bed has been reserved
    pub async fn reserve_bed(&self, trip_id: TripId) -> Result<Trip> {
        self.act(trip_id, TripAction::ReserveBed).await
    }

    async fn act(&self, trip_id: TripId, action: TripAction) -> Result<Trip> {
        let trip = self
            .inner
            .backend
            .apply_action(&self.inner.context, trip_id, action)
            .await?;

        if let Err(e) = self.publisher.publish(ChannelEvent::StatusChange {
            trip_id,
            status: trip.status,
        }) {
            warn!(%trip_id, %action, error = %e, "Status change not published");
        }
        if let Err(e) = self.inner.refresh().await {
            warn!(%trip_id, %action, error = %e, "Refresh after action failed");
        }
        Ok(trip)
    }

    /// A trip's timeline
    pub async fn timeline(&self, trip_id: TripId) -> Result<Vec<TimelineEntry>> {
        Ok(self.inner.backend.trip_timeline(trip_id).await?)
    }

    /// This hospital's record
    pub async fn hospital(&self) -> Result<Hospital> {
        Ok(self.inner.backend.get_hospital(self.inner.hospital_id).await?)
    }

    /// Replace this hospital's resource record
    pub async fn update_resources(&self, resources: HospitalResources) -> Result<Hospital> {
        Ok(self
            .inner
            .backend
            .update_hospital(&self.inner.context, self.inner.hospital_id, resources)
            .await?)
    }

    /// Stop listening and close the session
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(listener) = self.listener.take() {
            let _ = listener.await;
        }
        if let Some(session) = self.session.take() {
            session.close().await;
        }
        info!(hospital_id = %self.inner.hospital_id, "Hospital console closed");
    }
}

impl Drop for HospitalConsoleSynchronizer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for HospitalConsoleSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HospitalConsoleSynchronizer")
            .field("hospital_id", &self.inner.hospital_id)
            .field("active", &self.inner.view.read().active.len())
            .finish()
    }
}

/// Refresh on every trip event, and after the link comes back
async fn listen(
    inner: Arc<Inner>,
    mut events: mpsc::Receiver<ChannelEvent>,
    mut link: watch::Receiver<LinkState>,
    cancel: CancellationToken,
) {
    let mut link_lost = false;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            event = events.recv() => {
                let Some(event) = event else { break };
                if !event.is_trip_change() {
                    continue;
                }
                // coalesce a burst into one refresh
                let mut burst = 1;
                while let Ok(queued) = events.try_recv() {
                    if queued.is_trip_change() {
                        burst += 1;
                    }
                }
                debug!(hospital_id = %inner.hospital_id, burst, "Trip event received");
                if let Err(e) = inner.refresh().await {
                    warn!(hospital_id = %inner.hospital_id, error = %e, "Refresh failed");
                }
            }

            changed = link.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *link.borrow_and_update();
                match state {
                    LinkState::Connected if link_lost => {
                        link_lost = false;
                        if let Err(e) = inner.refresh().await {
                            warn!(hospital_id = %inner.hospital_id, error = %e, "Refresh after reconnect failed");
                        }
                    }
                    LinkState::Reconnecting { .. } => link_lost = true,
                    LinkState::Closed => break,
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prana_backend::InMemoryBackend;
    use prana_channel::{LocalConnector, RelayHub};
    use prana_core::{ChannelConfig, EstimatorConfig, MatchingConfig};
    use prana_domain::{
        AmbulanceId, EmergencyType, IncidentId, NewIncident, NewTrip, PreparationAction,
    };
    use std::time::Duration;

    use crate::orchestrator::DispatchOrchestrator;

    fn trip(id: u64, eta: f64) -> Trip {
        Trip::dispatched(
            TripId(id),
            NewTrip {
                incident_id: IncidentId(id),
                ambulance_id: AmbulanceId(id),
                hospital_id: HospitalId(1),
                eta_minutes: eta,
                distance_km: 3.0,
            },
        )
        .unwrap()
    }

    fn arrived(mut trip: Trip) -> Trip {
        trip.arrive();
        trip
    }

    async fn next_change(
        changes: &mut broadcast::Receiver<ConsoleChange>,
        mut wanted: impl FnMut(&ConsoleChange) -> bool,
    ) -> ConsoleChange {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let change = changes.recv().await.unwrap();
                if wanted(&change) {
                    return change;
                }
            }
        })
        .await
        .expect("no matching change")
    }

    #[test]
    fn test_view_reports_incoming_then_updates() {
        let mut view = ConsoleView::default();
        assert_eq!(
            view.apply(vec![trip(1, 9.0)]),
            vec![ConsoleChange::Incoming(trip(1, 9.0))]
        );
        assert!(view.apply(vec![trip(1, 9.0)]).is_empty());
        assert_eq!(
            view.apply(vec![trip(1, 8.5), trip(2, 12.0)]),
            vec![
                ConsoleChange::Updated(trip(1, 8.5)),
                ConsoleChange::Incoming(trip(2, 12.0)),
            ]
        );
    }

    #[test]
    fn test_view_reports_arrival_once() {
        let mut view = ConsoleView::default();
        view.apply(vec![trip(1, 2.0)]);

        let landed = arrived(trip(1, 2.0));
        assert_eq!(
            view.apply(vec![landed.clone()]),
            vec![ConsoleChange::Arrived(landed.clone())]
        );
        assert!(view.apply(vec![landed]).is_empty());
        assert!(view.active.is_empty());
    }

    #[test]
    fn test_view_treats_initial_arrivals_as_history() {
        let mut view = ConsoleView::default();
        let changes = view.apply(vec![arrived(trip(1, 0.0)), trip(2, 7.0)]);
        assert_eq!(changes, vec![ConsoleChange::Incoming(trip(2, 7.0))]);
        assert!(view.apply(vec![arrived(trip(1, 0.0)), trip(2, 7.0)]).is_empty());
    }

    struct Fixture {
        backend: Arc<InMemoryBackend>,
        local: Arc<LocalConnector>,
        orchestrator: DispatchOrchestrator,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(InMemoryBackend::with_demo_data(MatchingConfig::default()));
        let hub = Arc::new(RelayHub::new(backend.clone(), 32));
        let local = Arc::new(LocalConnector::new(hub, ChannelConfig::default()));
        let orchestrator = DispatchOrchestrator::new(
            AmbulanceId(1),
            backend.clone(),
            local.clone(),
            &EstimatorConfig {
                period_ms: 60_000,
                decrement_minutes: 0.5,
            },
        );
        Fixture {
            backend,
            local,
            orchestrator,
        }
    }

    async fn dispatch_to(fx: &Fixture, hospital_id: HospitalId) -> crate::ActiveTrip {
        let incident = fx
            .backend
            .create_incident(NewIncident::new(EmergencyType::Trauma, 12.95, 77.58))
            .await
            .unwrap();
        let candidate = fx
            .backend
            .rank_hospitals(incident.id)
            .await
            .unwrap()
            .find(|c| c.hospital.id == hospital_id)
            .unwrap_or_else(|| panic!("hospital {hospital_id} not ranked"));
        fx.orchestrator.dispatch(&incident, &candidate).await.unwrap()
    }

    async fn best_hospital(fx: &Fixture) -> HospitalId {
        let incident = fx
            .backend
            .create_incident(NewIncident::new(EmergencyType::Trauma, 12.95, 77.58))
            .await
            .unwrap();
        fx.backend
            .rank_hospitals(incident.id)
            .await
            .unwrap()
            .next()
            .unwrap()
            .hospital
            .id
    }

    #[tokio::test]
    async fn test_console_follows_trip_lifecycle() {
        let fx = fixture();
        let hospital_id = best_hospital(&fx).await;
        let console = HospitalConsoleSynchronizer::start(hospital_id, fx.backend.clone(), fx.local.as_ref())
            .await
            .unwrap();
        let mut changes = console.subscribe();
        assert!(console.active_trips().is_empty());

        let mut active = dispatch_to(&fx, hospital_id).await;
        let trip_id = active.trip_id();
        let Refresh::Applied(found) = console.refresh().await.unwrap() else {
            panic!("refresh dropped");
        };
        assert!(matches!(&found[..], [ConsoleChange::Incoming(t)] if t.id == trip_id));

        // relayed eta triggers a re-read
        let boosted = active.request_priority().await.unwrap();
        let change = next_change(&mut changes, |c| {
            matches!(c, ConsoleChange::Updated(t) if t.signal_priority_active)
        })
        .await;
        let ConsoleChange::Updated(seen) = change else { unreachable!() };
        assert!((seen.eta_minutes - boosted.eta_minutes).abs() < 1e-9);

        let acked = console.acknowledge(trip_id).await.unwrap();
        assert_eq!(acked.status, TripStatus::Acknowledged);
        assert_eq!(
            console.acknowledge(trip_id).await.unwrap().status,
            TripStatus::Acknowledged
        );
        let prepared = console.assign_doctor(trip_id).await.unwrap();
        assert!(prepared.preparations.contains(&PreparationAction::AssignDoc));

        active.mark_arrived().await.unwrap();
        let change = next_change(&mut changes, |c| matches!(c, ConsoleChange::Arrived(_))).await;
        assert!(matches!(change, ConsoleChange::Arrived(t) if t.id == trip_id));
        assert!(console.active_trips().is_empty());

        let Refresh::Applied(after) = console.refresh().await.unwrap() else {
            panic!("refresh dropped");
        };
        assert!(after.is_empty());

        let timeline = console.timeline(trip_id).await.unwrap();
        assert!(timeline.len() >= 4);
        console.close().await;
    }

    #[tokio::test]
    async fn test_stale_refresh_dropped() {
        let fx = fixture();
        let console = HospitalConsoleSynchronizer::start(HospitalId(1), fx.backend.clone(), fx.local.as_ref())
            .await
            .unwrap();
        console.inner.view.write().applied = u64::MAX;
        assert_eq!(console.refresh().await.unwrap(), Refresh::Stale);
        console.close().await;
    }

    #[tokio::test]
    async fn test_update_resources_own_hospital() {
        let fx = fixture();
        let console = HospitalConsoleSynchronizer::start(HospitalId(2), fx.backend.clone(), fx.local.as_ref())
            .await
            .unwrap();
        let mut resources = console.hospital().await.unwrap().resources;
        resources.icu_beds += 3;

        let updated = console.update_resources(resources.clone()).await.unwrap();
        assert_eq!(updated.resources, resources);
        assert_eq!(console.hospital().await.unwrap().resources.icu_beds, resources.icu_beds);
        console.close().await;
    }
}
