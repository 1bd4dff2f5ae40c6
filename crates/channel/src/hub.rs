//! Relay hub: subscribers per scope and the forwarding rules between them

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use prana_backend::TripBackend;
use prana_domain::{ChannelEvent, TripId};

use crate::scope::ChannelScope;

/// Serialized event as delivered to subscribers
pub type Frame = Arc<str>;

/// A subscriber's receiving end
#[derive(Debug)]
pub struct Subscription {
    /// Subscriber id within its scope
    pub id: u64,
    /// Scope the subscriber is attached to
    pub scope: ChannelScope,
    /// Frames addressed to this subscriber
    pub frames: mpsc::Receiver<Frame>,
}

/// Holds the subscribers of every scope and applies the forwarding rules:
///
/// - `eta_update` on a trip scope is recorded on the trip and forwarded to
///   the trip's hospital scope with the trip id attached.
/// - `status_change` on a trip scope is forwarded to the hospital scope.
/// - `status_change` on a hospital scope for one of its own trips is
///   forwarded to that trip's scope.
///
/// Forwarded events carry the collaborator's view of the trip, so a stale
/// or terminal trip never produces an `eta_update` downstream.
pub struct RelayHub {
    backend: Arc<dyn TripBackend>,
    groups: RwLock<HashMap<ChannelScope, HashMap<u64, mpsc::Sender<Frame>>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl RelayHub {
    /// Create a hub with `buffer` frames queued per subscriber
    pub fn new(backend: Arc<dyn TripBackend>, buffer: usize) -> Self {
        Self {
            backend,
            groups: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Collaborator the hub records ETAs with
    pub fn backend(&self) -> &Arc<dyn TripBackend> {
        &self.backend
    }

    /// Add a subscriber to `scope`
    pub fn attach(&self, scope: ChannelScope) -> Subscription {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.groups.write().entry(scope).or_default().insert(id, tx);
        debug!(%scope, subscriber = id, "Subscriber attached");
        Subscription {
            id,
            scope,
            frames: rx,
        }
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub fn detach(&self, scope: &ChannelScope, id: u64) {
        let mut groups = self.groups.write();
        if let Some(group) = groups.get_mut(scope) {
            group.remove(&id);
            if group.is_empty() {
                groups.remove(scope);
            }
        }
        debug!(%scope, subscriber = id, "Subscriber detached");
    }

    /// Number of subscribers on `scope`
    pub fn subscriber_count(&self, scope: &ChannelScope) -> usize {
        self.groups.read().get(scope).map_or(0, HashMap::len)
    }

    /// Deliver `event` to every subscriber of `scope`. Returns how many
    /// subscribers accepted it.
    pub fn broadcast(&self, scope: &ChannelScope, event: &ChannelEvent) -> usize {
        let frame: Frame = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(%scope, event = event.kind(), error = %e, "Failed to serialize event");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut gone = Vec::new();
        {
            let groups = self.groups.read();
            let Some(group) = groups.get(scope) else {
                debug!(%scope, event = event.kind(), "No subscribers");
                return 0;
            };
            for (id, tx) in group {
                match tx.try_send(Arc::clone(&frame)) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(%scope, subscriber = id, event = event.kind(), "Subscriber queue full, event dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => gone.push(*id),
                }
            }
        }
        for id in gone {
            self.detach(scope, id);
        }
        debug!(%scope, event = event.kind(), recipients = delivered, "Broadcast event");
        delivered
    }

    /// Apply the forwarding rules to an event published on `origin`
    pub async fn relay(&self, origin: &ChannelScope, event: ChannelEvent) {
        match (*origin, event) {
            (ChannelScope::Trip(trip_id), ChannelEvent::EtaUpdate { eta, .. }) => {
                self.relay_eta(trip_id, eta).await;
            }
            (ChannelScope::Trip(scope_trip), ChannelEvent::StatusChange { trip_id, .. }) => {
                if trip_id != scope_trip {
                    warn!(%origin, %trip_id, "Status change for a different trip ignored");
                    return;
                }
                match self.backend.get_trip(trip_id).await {
                    Ok(Some(trip)) => {
                        self.broadcast(
                            &ChannelScope::Hospital(trip.hospital_id),
                            &ChannelEvent::StatusChange {
                                trip_id,
                                status: trip.status,
                            },
                        );
                    }
                    Ok(None) => debug!(%trip_id, "Status change for unknown trip ignored"),
                    Err(e) => warn!(%trip_id, error = %e, "Trip lookup failed"),
                }
            }
            (ChannelScope::Hospital(hospital_id), ChannelEvent::StatusChange { trip_id, .. }) => {
                match self.backend.get_trip(trip_id).await {
                    Ok(Some(trip)) if trip.hospital_id == hospital_id => {
                        self.broadcast(
                            &ChannelScope::Trip(trip_id),
                            &ChannelEvent::StatusChange {
                                trip_id,
                                status: trip.status,
                            },
                        );
                    }
                    Ok(Some(_)) => {
                        warn!(%origin, %trip_id, "Hospital published for a trip it does not receive")
                    }
                    Ok(None) => debug!(%trip_id, "Status change for unknown trip ignored"),
                    Err(e) => warn!(%trip_id, error = %e, "Trip lookup failed"),
                }
            }
            (_, event) => {
                debug!(%origin, event = event.kind(), "Event not forwarded");
            }
        }
    }

    async fn relay_eta(&self, trip_id: TripId, eta: f64) {
        match self.backend.record_eta(trip_id, eta).await {
            Ok(Some(trip)) => {
                self.broadcast(
                    &ChannelScope::Hospital(trip.hospital_id),
                    &ChannelEvent::EtaUpdate {
                        eta: trip.eta_minutes,
                        trip_id: Some(trip_id),
                    },
                );
            }
            Ok(None) => debug!(%trip_id, eta, "ETA for inactive trip ignored"),
            Err(e) => warn!(%trip_id, eta, error = %e, "Failed to record ETA"),
        }
    }
}

impl std::fmt::Debug for RelayHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayHub")
            .field("scopes", &self.groups.read().len())
            .field("buffer", &self.buffer)
            .finish()
    }
}
