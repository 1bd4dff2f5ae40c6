//! Party-side trip synchronization for PRANA
//!
//! Each party keeps its own view of trip state and converges through the
//! channel protocol:
//!
//! - The ambulance side ([`AmbulanceConsole`], [`DispatchOrchestrator`],
//!   [`ActiveTrip`]) creates trips, runs the [`EtaEstimator`] and publishes
//!   on the trip scope.
//! - The hospital side ([`HospitalConsoleSynchronizer`]) listens on the
//!   hospital scope and re-reads its trips on every trip event.
//!
//! Both sides act through an explicit
//! [`PartyContext`](prana_domain::PartyContext); nothing here holds global
//! session state.

#![warn(missing_docs)]

pub mod active;
pub mod ambulance;
pub mod error;
pub mod estimator;
pub mod hospital;
pub mod mirror;
pub mod orchestrator;

pub use active::ActiveTrip;
pub use ambulance::AmbulanceConsole;
pub use error::{Result, SyncError};
pub use estimator::{EstimatorExit, EstimatorHandle, EtaEstimator, Tick};
pub use hospital::{ConsoleChange, HospitalConsoleSynchronizer, Refresh};
pub use mirror::TripMirror;
pub use orchestrator::DispatchOrchestrator;
