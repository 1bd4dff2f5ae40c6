//! Channel event payloads and the per-trip timeline
//!
//! Channel events are JSON objects tagged by `type`:
//!
//! ```json
//! {"type": "eta_update", "eta": 11.5}
//! {"type": "eta_update", "eta": 11.5, "trip_id": 7}
//! {"type": "status_change", "trip_id": 7, "status": "ACKNOWLEDGED"}
//! {"type": "ack", "message": "subscribed to trip 7"}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::TripId;
use crate::trip::{PreparationAction, TripStatus};

/// Event carried over a channel session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelEvent {
    /// New remaining-time estimate for a trip
    EtaUpdate {
        /// Remaining minutes
        eta: f64,
        /// Trip the estimate belongs to. Implied by the scope on a trip
        /// channel; filled in by the relay for hospital subscribers.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trip_id: Option<TripId>,
    },

    /// A party changed the trip's lifecycle state or preparation record
    StatusChange {
        /// Affected trip
        trip_id: TripId,
        /// Status after the change
        status: TripStatus,
    },

    /// Connection acknowledgment sent by the relay on subscribe
    Ack {
        /// Human-readable status message
        message: String,
    },
}

impl ChannelEvent {
    /// Build an ETA update for a trip channel
    pub fn eta_update(eta: f64) -> Self {
        ChannelEvent::EtaUpdate { eta, trip_id: None }
    }

    /// Whether subscribers should treat this as a trip-state change
    pub fn is_trip_change(&self) -> bool {
        matches!(
            self,
            ChannelEvent::EtaUpdate { .. } | ChannelEvent::StatusChange { .. }
        )
    }

    /// Short event name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ChannelEvent::EtaUpdate { .. } => "eta_update",
            ChannelEvent::StatusChange { .. } => "status_change",
            ChannelEvent::Ack { .. } => "ack",
        }
    }
}

/// Kind of timeline entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimelineKind {
    /// Trip created and committed
    Dispatched,
    /// Hospital acknowledged
    HospitalAck,
    /// Hospital recorded a preparation step
    Preparation(PreparationAction),
    /// Signal priority granted
    PriorityActive,
    /// Ambulance arrived
    Arrived,
}

/// One entry in a trip's append-only timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// Trip the entry belongs to
    pub trip_id: TripId,
    /// Entry kind
    pub kind: TimelineKind,
    /// Human-readable description
    pub message: String,
    /// When it was recorded
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_eta_update_parses() {
        let event: ChannelEvent = serde_json::from_str(r#"{"type":"eta_update","eta":11.5}"#).unwrap();
        assert_eq!(event, ChannelEvent::eta_update(11.5));
        assert!(event.is_trip_change());
    }

    #[test]
    fn test_trip_id_omitted_when_absent() {
        let json = serde_json::to_value(ChannelEvent::eta_update(3.0)).unwrap();
        assert_eq!(json["type"], "eta_update");
        assert!(json.get("trip_id").is_none());

        let relayed = ChannelEvent::EtaUpdate {
            eta: 3.0,
            trip_id: Some(TripId(9)),
        };
        let json = serde_json::to_value(relayed).unwrap();
        assert_eq!(json["trip_id"], 9);
    }

    #[test]
    fn test_status_change_shape() {
        let event = ChannelEvent::StatusChange {
            trip_id: TripId(4),
            status: TripStatus::Arrived,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"type":"status_change","trip_id":4,"status":"ARRIVED"}"#
        );
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(serde_json::from_str::<ChannelEvent>(r#"{"type":"ping"}"#).is_err());
    }

    #[test]
    fn test_ack_is_not_a_trip_change() {
        let ack = ChannelEvent::Ack {
            message: "hello".to_string(),
        };
        assert!(!ack.is_trip_change());
        assert_eq!(ack.kind(), "ack");
    }
}
