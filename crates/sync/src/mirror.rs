//! Local mirror of the trip this party is working on

use parking_lot::RwLock;
use std::sync::Arc;

use prana_domain::Trip;

/// Shared, lockable copy of one trip.
///
/// The estimator and the inbound listener update the same mirror; the lock
/// is never held across an await point.
#[derive(Debug, Clone, Default)]
pub struct TripMirror {
    inner: Arc<RwLock<Option<Trip>>>,
}

impl TripMirror {
    /// Mirror seeded with `trip`
    pub fn new(trip: Trip) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(trip))),
        }
    }

    /// Current copy, if the trip is still mirrored
    pub fn snapshot(&self) -> Option<Trip> {
        self.inner.read().clone()
    }

    /// Mutate the mirrored trip. Returns `None` when nothing is mirrored.
    pub fn update<R>(&self, f: impl FnOnce(&mut Trip) -> R) -> Option<R> {
        self.inner.write().as_mut().map(f)
    }

    /// Stop mirroring
    pub fn clear(&self) {
        *self.inner.write() = None;
    }
}
