//! Trip lifecycle state machine
//!
//! A trip moves `DISPATCHED -> ACKNOWLEDGED -> ARRIVED` and never backwards.
//! Each transition has exactly one owning party: the hospital acknowledges and
//! records preparation, the ambulance arrives and requests signal priority.
//!
//! Repeated or late requests are reported as [`Transition::NoOp`] instead of
//! errors so that replayed channel events converge on the same state.
//! `ARRIVED` is absorbing: once reached, every mutation is a no-op.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{DomainError, Result};
use crate::ids::{AmbulanceId, HospitalId, IncidentId, TripId};
use crate::party::Party;

/// ETA below which arrival is imminent (minutes)
pub const CRITICAL_ETA_MINUTES: f64 = 5.0;
/// ETA below which the hospital should be preparing (minutes)
pub const PREPARING_ETA_MINUTES: f64 = 15.0;

/// Lifecycle stage of a trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    /// Ambulance dispatched, hospital has not responded
    Dispatched,
    /// Hospital has started preparing
    Acknowledged,
    /// Ambulance arrived; terminal
    Arrived,
}

impl TripStatus {
    /// Whether no further mutation is accepted
    pub fn is_terminal(&self) -> bool {
        matches!(self, TripStatus::Arrived)
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TripStatus::Dispatched => f.write_str("DISPATCHED"),
            TripStatus::Acknowledged => f.write_str("ACKNOWLEDGED"),
            TripStatus::Arrived => f.write_str("ARRIVED"),
        }
    }
}

/// Hospital-side preparation steps recorded on a trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PreparationAction {
    /// A doctor has been assigned
    AssignDoc,
    /// A bed has been reserved
    ReserveBed,
}

/// Actions either party may submit against a trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripAction {
    /// Hospital acknowledges the incoming trip
    Acknowledge,
    /// Hospital assigns a doctor
    AssignDoc,
    /// Hospital reserves a bed
    ReserveBed,
    /// Ambulance reports arrival
    Arrive,
    /// Ambulance requests traffic-signal priority
    RequestPriority,
}

impl TripAction {
    /// The only party allowed to submit this action
    pub fn owner(&self) -> Party {
        match self {
            TripAction::Acknowledge | TripAction::AssignDoc | TripAction::ReserveBed => {
                Party::Hospital
            }
            TripAction::Arrive | TripAction::RequestPriority => Party::Ambulance,
        }
    }

    /// Preparation step carried by this action, if any
    pub fn preparation(&self) -> Option<PreparationAction> {
        match self {
            TripAction::AssignDoc => Some(PreparationAction::AssignDoc),
            TripAction::ReserveBed => Some(PreparationAction::ReserveBed),
            _ => None,
        }
    }
}

impl From<PreparationAction> for TripAction {
    fn from(action: PreparationAction) -> Self {
        match action {
            PreparationAction::AssignDoc => TripAction::AssignDoc,
            PreparationAction::ReserveBed => TripAction::ReserveBed,
        }
    }
}

impl fmt::Display for TripAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TripAction::Acknowledge => "ACKNOWLEDGE",
            TripAction::AssignDoc => "ASSIGN_DOC",
            TripAction::ReserveBed => "RESERVE_BED",
            TripAction::Arrive => "ARRIVE",
            TripAction::RequestPriority => "REQUEST_PRIORITY",
        };
        f.write_str(name)
    }
}

/// Why a request left the trip unchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoOpReason {
    /// The request's effect is already in place
    AlreadyApplied,
    /// The trip is terminal
    Terminal,
}

/// Result of applying a request to a trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    /// State changed
    Applied,
    /// State unchanged
    NoOp(NoOpReason),
}

impl Transition {
    /// Whether the trip changed
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied)
    }
}

/// Urgency band derived from the remaining ETA
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EtaBand {
    /// Arrival imminent
    Critical,
    /// Close enough that preparation should be under way
    Preparing,
    /// Still en route
    EnRoute,
}

impl EtaBand {
    /// Band for an ETA in minutes
    pub fn from_minutes(eta_minutes: f64) -> Self {
        if eta_minutes < CRITICAL_ETA_MINUTES {
            EtaBand::Critical
        } else if eta_minutes < PREPARING_ETA_MINUTES {
            EtaBand::Preparing
        } else {
            EtaBand::EnRoute
        }
    }
}

/// Trip creation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTrip {
    /// Originating incident
    pub incident_id: IncidentId,
    /// Transporting unit
    pub ambulance_id: AmbulanceId,
    /// Selected hospital
    pub hospital_id: HospitalId,
    /// Seed ETA in minutes
    pub eta_minutes: f64,
    /// Seed distance in kilometers
    pub distance_km: f64,
}

/// One ambulance-to-hospital transport episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    /// Identifier
    pub id: TripId,
    /// Originating incident
    pub incident_id: IncidentId,
    /// Transporting unit
    pub ambulance_id: AmbulanceId,
    /// Receiving hospital
    pub hospital_id: HospitalId,
    /// Lifecycle stage
    pub status: TripStatus,
    /// Remaining travel time in minutes, never negative
    pub eta_minutes: f64,
    /// Distance at dispatch in kilometers
    pub distance_km: f64,
    /// Signal priority granted; never reverts
    pub signal_priority_active: bool,
    /// Preparation steps recorded by the hospital
    #[serde(default)]
    pub preparations: BTreeSet<PreparationAction>,
}

fn finite_non_negative(value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value.max(0.0))
    } else {
        Err(DomainError::InvalidEta(value))
    }
}

impl Trip {
    /// Create a freshly dispatched trip
    pub fn dispatched(id: TripId, request: NewTrip) -> Result<Self> {
        let eta_minutes = finite_non_negative(request.eta_minutes)?;
        if !request.distance_km.is_finite() || request.distance_km < 0.0 {
            return Err(DomainError::ValidationError(format!(
                "distance must be a non-negative number, got {}",
                request.distance_km
            )));
        }
        Ok(Self {
            id,
            incident_id: request.incident_id,
            ambulance_id: request.ambulance_id,
            hospital_id: request.hospital_id,
            status: TripStatus::Dispatched,
            eta_minutes,
            distance_km: request.distance_km,
            signal_priority_active: false,
            preparations: BTreeSet::new(),
        })
    }

    /// Whether the trip still accepts mutation
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Urgency band for the current ETA
    pub fn band(&self) -> EtaBand {
        EtaBand::from_minutes(self.eta_minutes)
    }

    /// Hospital acknowledgment. Repeats and terminal trips are no-ops.
    pub fn acknowledge(&mut self) -> Transition {
        match self.status {
            TripStatus::Dispatched => {
                self.status = TripStatus::Acknowledged;
                Transition::Applied
            }
            TripStatus::Acknowledged => Transition::NoOp(NoOpReason::AlreadyApplied),
            TripStatus::Arrived => Transition::NoOp(NoOpReason::Terminal),
        }
    }

    /// Record a preparation step. Only valid once acknowledged.
    pub fn prepare(&mut self, action: PreparationAction) -> Result<Transition> {
        match self.status {
            TripStatus::Dispatched => Err(DomainError::InvalidTransition {
                action: action.into(),
                status: self.status,
            }),
            TripStatus::Acknowledged => {
                if self.preparations.insert(action) {
                    Ok(Transition::Applied)
                } else {
                    Ok(Transition::NoOp(NoOpReason::AlreadyApplied))
                }
            }
            TripStatus::Arrived => Ok(Transition::NoOp(NoOpReason::Terminal)),
        }
    }

    /// Ambulance arrival, valid from any non-terminal status
    pub fn arrive(&mut self) -> Transition {
        if self.status.is_terminal() {
            return Transition::NoOp(NoOpReason::Terminal);
        }
        self.status = TripStatus::Arrived;
        Transition::Applied
    }

    /// Grant signal priority and overwrite the ETA with `new_eta`.
    ///
    /// The new ETA may be higher than the current one. A second grant is
    /// rejected rather than silently repeated.
    pub fn activate_priority(&mut self, new_eta: f64) -> Result<Transition> {
        if self.status.is_terminal() {
            return Err(DomainError::InvalidTransition {
                action: TripAction::RequestPriority,
                status: self.status,
            });
        }
        if self.signal_priority_active {
            return Err(DomainError::PriorityAlreadyActive);
        }
        self.eta_minutes = finite_non_negative(new_eta)?;
        self.signal_priority_active = true;
        Ok(Transition::Applied)
    }

    /// Subtract `decrement` minutes, clamping at zero.
    ///
    /// Returns the new ETA, or `None` when the trip is terminal.
    pub fn decay_eta(&mut self, decrement: f64) -> Option<f64> {
        if self.status.is_terminal() {
            return None;
        }
        self.eta_minutes = (self.eta_minutes - decrement.max(0.0)).max(0.0);
        Some(self.eta_minutes)
    }

    /// Store an ETA observed from the owning ambulance
    pub fn observe_eta(&mut self, eta: f64) -> Result<Transition> {
        let eta = finite_non_negative(eta)?;
        if self.status.is_terminal() {
            return Ok(Transition::NoOp(NoOpReason::Terminal));
        }
        if self.eta_minutes == eta {
            return Ok(Transition::NoOp(NoOpReason::AlreadyApplied));
        }
        self.eta_minutes = eta;
        Ok(Transition::Applied)
    }

    /// Fold a freshly fetched remote copy into this local view.
    ///
    /// Status, priority and preparations only move forward. The local ETA
    /// is kept (the ambulance owns it) unless the remote copy carries a
    /// priority grant this view has not seen yet.
    pub fn merge_remote(&mut self, remote: &Trip) -> Transition {
        if remote.id != self.id {
            return Transition::NoOp(NoOpReason::AlreadyApplied);
        }
        let before = self.clone();

        if remote.status > self.status {
            self.status = remote.status;
        }
        if remote.signal_priority_active && !self.signal_priority_active {
            self.signal_priority_active = true;
            self.eta_minutes = remote.eta_minutes.max(0.0);
        }
        self.preparations.extend(remote.preparations.iter().copied());

        if *self == before {
            Transition::NoOp(NoOpReason::AlreadyApplied)
        } else {
            Transition::Applied
        }
    }
}
