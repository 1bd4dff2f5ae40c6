//! In-memory reference backend

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use prana_core::MatchingConfig;
use prana_domain::{
    AmbulanceId, Hospital, HospitalId, HospitalResources, Incident, IncidentId, NewIncident,
    NewTrip, PartyContext, PreparationAction, TimelineEntry, TimelineKind, Trip, TripAction,
    TripId,
};

use crate::error::{BackendError, Result};
use crate::ranking;
use crate::seed;
use crate::{MatchCandidates, TripBackend, TripFilter};

struct StoredTrip {
    trip: Trip,
    committed: bool,
}

#[derive(Default)]
struct State {
    next_incident: u64,
    next_trip: u64,
    incidents: HashMap<IncidentId, Incident>,
    hospitals: BTreeMap<HospitalId, Hospital>,
    ambulances: BTreeSet<AmbulanceId>,
    trips: BTreeMap<TripId, StoredTrip>,
    timelines: HashMap<TripId, Vec<TimelineEntry>>,
}

impl State {
    fn committed(&self, trip_id: TripId) -> Option<&Trip> {
        self.trips
            .get(&trip_id)
            .filter(|stored| stored.committed)
            .map(|stored| &stored.trip)
    }

    fn committed_mut(&mut self, trip_id: TripId) -> Result<&mut Trip> {
        self.trips
            .get_mut(&trip_id)
            .filter(|stored| stored.committed)
            .map(|stored| &mut stored.trip)
            .ok_or(BackendError::NotFound {
                kind: "trip",
                id: trip_id.get(),
            })
    }

    /// Committed trips block a new one for the same incident, or for the
    /// same ambulance while active. Staged trips never block.
    fn check_conflicts(
        &self,
        ambulance_id: AmbulanceId,
        incident_id: IncidentId,
        except: Option<TripId>,
    ) -> Result<()> {
        let committed = self
            .trips
            .values()
            .filter(|stored| stored.committed && Some(stored.trip.id) != except)
            .map(|stored| &stored.trip);
        for trip in committed {
            if trip.ambulance_id == ambulance_id && trip.is_active() {
                return Err(BackendError::Conflict(format!(
                    "ambulance {ambulance_id} already carries trip {}",
                    trip.id
                )));
            }
            if trip.incident_id == incident_id {
                return Err(BackendError::Conflict(format!(
                    "incident {incident_id} already has trip {}",
                    trip.id
                )));
            }
        }
        Ok(())
    }

    fn push_timeline(&mut self, trip_id: TripId, kind: TimelineKind, message: String) {
        self.timelines.entry(trip_id).or_default().push(TimelineEntry {
            trip_id,
            kind,
            message,
            at: Utc::now(),
        });
    }

    fn hospital_name(&self, hospital_id: HospitalId) -> String {
        self.hospitals
            .get(&hospital_id)
            .map(|h| h.name.clone())
            .unwrap_or_else(|| format!("hospital {hospital_id}"))
    }
}

/// Thread-safe in-memory [`TripBackend`]
pub struct InMemoryBackend {
    config: MatchingConfig,
    state: RwLock<State>,
    available: AtomicBool,
}

impl InMemoryBackend {
    /// Empty backend
    pub fn new(config: MatchingConfig) -> Self {
        Self {
            config,
            state: RwLock::new(State::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Backend seeded with the demo hospitals and ambulance
    pub fn with_demo_data(config: MatchingConfig) -> Self {
        let backend = Self::new(config);
        for hospital in seed::demo_hospitals() {
            backend.add_hospital(hospital);
        }
        backend.add_ambulance(seed::DEMO_AMBULANCE);
        backend
    }

    /// Register or replace a hospital
    pub fn add_hospital(&self, hospital: Hospital) {
        self.state.write().hospitals.insert(hospital.id, hospital);
    }

    /// Register an ambulance
    pub fn add_ambulance(&self, ambulance_id: AmbulanceId) {
        self.state.write().ambulances.insert(ambulance_id);
    }

    /// Simulate an outage. While unavailable every call fails with
    /// [`BackendError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::Unavailable("backend offline".to_string()))
        }
    }
}

fn forbidden(party: &PartyContext, operation: impl Into<String>) -> BackendError {
    BackendError::Forbidden {
        party: party.party(),
        operation: operation.into(),
    }
}

#[async_trait]
impl TripBackend for InMemoryBackend {
    async fn create_incident(&self, request: NewIncident) -> Result<Incident> {
        self.ensure_available()?;
        let mut state = self.state.write();
        state.next_incident += 1;
        let id = IncidentId(state.next_incident);
        let incident = Incident::from_request(id, request, Utc::now())?;
        state.incidents.insert(id, incident.clone());
        info!(incident_id = %id, emergency = %incident.emergency_type, "Incident recorded");
        Ok(incident)
    }

    async fn rank_hospitals(&self, incident_id: IncidentId) -> Result<MatchCandidates> {
        self.ensure_available()?;
        let state = self.state.read();
        let incident = state.incidents.get(&incident_id).ok_or(BackendError::NotFound {
            kind: "incident",
            id: incident_id.get(),
        })?;
        let ranked = ranking::rank(incident, state.hospitals.values(), &self.config);
        debug!(incident_id = %incident_id, candidates = ranked.len(), "Ranked hospitals");
        Ok(MatchCandidates::new(ranked))
    }

    async fn create_trip(&self, request: NewTrip) -> Result<Trip> {
        self.ensure_available()?;
        let mut state = self.state.write();

        if !state.incidents.contains_key(&request.incident_id) {
            return Err(BackendError::NotFound {
                kind: "incident",
                id: request.incident_id.get(),
            });
        }
        if !state.hospitals.contains_key(&request.hospital_id) {
            return Err(BackendError::NotFound {
                kind: "hospital",
                id: request.hospital_id.get(),
            });
        }
        if !state.ambulances.contains(&request.ambulance_id) {
            return Err(BackendError::NotFound {
                kind: "ambulance",
                id: request.ambulance_id.get(),
            });
        }
        // a staged trip left by this ambulance was abandoned without a
        // successful discard; the new dispatch supersedes it
        let superseded: Vec<TripId> = state
            .trips
            .values()
            .filter(|stored| !stored.committed && stored.trip.ambulance_id == request.ambulance_id)
            .map(|stored| stored.trip.id)
            .collect();
        for trip_id in superseded {
            state.trips.remove(&trip_id);
            info!(%trip_id, ambulance_id = %request.ambulance_id, "Superseded stale staged trip");
        }
        state.check_conflicts(request.ambulance_id, request.incident_id, None)?;

        let id = TripId(state.next_trip + 1);
        let trip = Trip::dispatched(id, request)?;
        state.next_trip += 1;
        state.trips.insert(
            id,
            StoredTrip {
                trip: trip.clone(),
                committed: false,
            },
        );
        debug!(trip_id = %id, "Staged trip");
        Ok(trip)
    }

    async fn commit_trip(&self, trip_id: TripId) -> Result<Trip> {
        self.ensure_available()?;
        let mut state = self.state.write();
        let stored = state.trips.get_mut(&trip_id).ok_or(BackendError::NotFound {
            kind: "trip",
            id: trip_id.get(),
        })?;
        if stored.committed {
            return Ok(stored.trip.clone());
        }
        let trip = stored.trip.clone();
        state.check_conflicts(trip.ambulance_id, trip.incident_id, Some(trip_id))?;
        if let Some(stored) = state.trips.get_mut(&trip_id) {
            stored.committed = true;
        }

        let hospital = state.hospital_name(trip.hospital_id);
        state.push_timeline(
            trip_id,
            TimelineKind::Dispatched,
            format!("Ambulance {} dispatched to {hospital}", trip.ambulance_id),
        );
        info!(trip_id = %trip_id, hospital_id = %trip.hospital_id, eta = trip.eta_minutes, "Trip committed");
        Ok(trip)
    }

    async fn discard_trip(&self, trip_id: TripId) -> Result<()> {
        self.ensure_available()?;
        let mut state = self.state.write();
        if state.trips.get(&trip_id).is_some_and(|stored| !stored.committed) {
            state.trips.remove(&trip_id);
            debug!(trip_id = %trip_id, "Discarded staged trip");
        }
        Ok(())
    }

    async fn list_trips(&self, filter: TripFilter) -> Result<Vec<Trip>> {
        self.ensure_available()?;
        let state = self.state.read();
        Ok(state
            .trips
            .values()
            .filter(|stored| stored.committed && filter.matches(&stored.trip))
            .map(|stored| stored.trip.clone())
            .collect())
    }

    async fn get_trip(&self, trip_id: TripId) -> Result<Option<Trip>> {
        self.ensure_available()?;
        Ok(self.state.read().committed(trip_id).cloned())
    }

    async fn apply_action(
        &self,
        party: &PartyContext,
        trip_id: TripId,
        action: TripAction,
    ) -> Result<Trip> {
        self.ensure_available()?;
        if party.party() != action.owner() {
            return Err(forbidden(party, action.to_string()));
        }

        let factor = self.config.priority_eta_factor;
        let mut state = self.state.write();
        let trip = state.committed_mut(trip_id)?;

        let bound = match party {
            PartyContext::Ambulance(id) => trip.ambulance_id == *id,
            PartyContext::Hospital(id) => trip.hospital_id == *id,
        };
        if !bound {
            return Err(forbidden(party, format!("{action} on trip {trip_id}")));
        }

        let transition = match action {
            TripAction::Acknowledge => trip.acknowledge(),
            TripAction::AssignDoc => trip.prepare(PreparationAction::AssignDoc)?,
            TripAction::ReserveBed => trip.prepare(PreparationAction::ReserveBed)?,
            TripAction::Arrive => trip.arrive(),
            TripAction::RequestPriority => {
                let new_eta = trip.eta_minutes * factor;
                trip.activate_priority(new_eta)?
            }
        };
        let snapshot = trip.clone();

        if transition.is_applied() {
            let (kind, message) = match action {
                TripAction::Acknowledge => (
                    TimelineKind::HospitalAck,
                    "Hospital acknowledged and is preparing".to_string(),
                ),
                TripAction::AssignDoc => (
                    TimelineKind::Preparation(PreparationAction::AssignDoc),
                    "Doctor assigned".to_string(),
                ),
                TripAction::ReserveBed => (
                    TimelineKind::Preparation(PreparationAction::ReserveBed),
                    "Bed reserved".to_string(),
                ),
                TripAction::Arrive => (
                    TimelineKind::Arrived,
                    "Ambulance arrived at hospital".to_string(),
                ),
                TripAction::RequestPriority => (
                    TimelineKind::PriorityActive,
                    format!(
                        "Signal priority granted, ETA now {:.1} min",
                        snapshot.eta_minutes
                    ),
                ),
            };
            state.push_timeline(trip_id, kind, message);
            info!(trip_id = %trip_id, %party, %action, status = %snapshot.status, "Trip action applied");
        } else {
            debug!(trip_id = %trip_id, %party, %action, ?transition, "Trip action was a no-op");
        }
        Ok(snapshot)
    }

    async fn record_eta(&self, trip_id: TripId, eta: f64) -> Result<Option<Trip>> {
        self.ensure_available()?;
        let mut state = self.state.write();
        let Some(stored) = state.trips.get_mut(&trip_id) else {
            return Ok(None);
        };
        if !stored.committed || !stored.trip.is_active() {
            return Ok(None);
        }
        stored.trip.observe_eta(eta)?;
        Ok(Some(stored.trip.clone()))
    }

    async fn trip_timeline(&self, trip_id: TripId) -> Result<Vec<TimelineEntry>> {
        self.ensure_available()?;
        let state = self.state.read();
        if state.committed(trip_id).is_none() {
            return Err(BackendError::NotFound {
                kind: "trip",
                id: trip_id.get(),
            });
        }
        Ok(state.timelines.get(&trip_id).cloned().unwrap_or_default())
    }

    async fn list_hospitals(&self) -> Result<Vec<Hospital>> {
        self.ensure_available()?;
        Ok(self.state.read().hospitals.values().cloned().collect())
    }

    async fn get_hospital(&self, hospital_id: HospitalId) -> Result<Hospital> {
        self.ensure_available()?;
        self.state
            .read()
            .hospitals
            .get(&hospital_id)
            .cloned()
            .ok_or(BackendError::NotFound {
                kind: "hospital",
                id: hospital_id.get(),
            })
    }

    async fn update_hospital(
        &self,
        party: &PartyContext,
        hospital_id: HospitalId,
        resources: HospitalResources,
    ) -> Result<Hospital> {
        self.ensure_available()?;
        if *party != PartyContext::Hospital(hospital_id) {
            return Err(forbidden(party, format!("update hospital {hospital_id}")));
        }
        let mut state = self.state.write();
        let hospital = state.hospitals.get_mut(&hospital_id).ok_or(BackendError::NotFound {
            kind: "hospital",
            id: hospital_id.get(),
        })?;
        hospital.apply_resources(resources)?;
        info!(hospital_id = %hospital_id, icu = hospital.resources.icu_beds, general = hospital.resources.general_beds, "Hospital resources updated");
        Ok(hospital.clone())
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("InMemoryBackend")
            .field("hospitals", &state.hospitals.len())
            .field("trips", &state.trips.len())
            .field("available", &self.available.load(Ordering::Relaxed))
            .finish()
    }
}
