//! Subscription scopes and their endpoint paths

use prana_domain::{HospitalId, Party, TripId};
use std::fmt;

use crate::error::{ChannelError, Result};

/// What a channel session is subscribed to.
///
/// The ambulance subscribes per trip, the hospital per hospital. The two
/// never share a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelScope {
    /// `/ws/trip/{trip_id}`
    Trip(TripId),
    /// `/ws/hospital/{hospital_id}`
    Hospital(HospitalId),
}

impl ChannelScope {
    /// Endpoint path for this scope
    pub fn path(&self) -> String {
        match self {
            ChannelScope::Trip(id) => format!("/ws/trip/{id}"),
            ChannelScope::Hospital(id) => format!("/ws/hospital/{id}"),
        }
    }

    /// Parse an endpoint path such as `/ws/trip/7`
    pub fn parse_path(path: &str) -> Result<Self> {
        let invalid = || ChannelError::InvalidScope(path.to_string());
        let mut segments = path.trim_start_matches('/').split('/');
        let (Some("ws"), Some(kind), Some(id), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(invalid());
        };
        match kind {
            "trip" => id.parse().map(ChannelScope::Trip).map_err(|_| invalid()),
            "hospital" => id.parse().map(ChannelScope::Hospital).map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }

    /// Party that subscribes on this scope
    pub fn party(&self) -> Party {
        match self {
            ChannelScope::Trip(_) => Party::Ambulance,
            ChannelScope::Hospital(_) => Party::Hospital,
        }
    }
}

impl fmt::Display for ChannelScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelScope::Trip(id) => write!(f, "trip:{id}"),
            ChannelScope::Hospital(id) => write!(f, "hospital:{id}"),
        }
    }
}
