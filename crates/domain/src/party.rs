//! Acting party context
//!
//! Every operation that mutates a trip is performed on behalf of exactly one
//! party. The context is passed explicitly; nothing holds it globally.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{AmbulanceId, HospitalId};

/// The two kinds of party in a trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    /// The transporting ambulance unit
    Ambulance,
    /// The receiving hospital
    Hospital,
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Party::Ambulance => f.write_str("ambulance"),
            Party::Hospital => f.write_str("hospital"),
        }
    }
}

/// A party together with the identity it acts as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "party", content = "id", rename_all = "snake_case")]
pub enum PartyContext {
    /// Acting as this ambulance unit
    Ambulance(AmbulanceId),
    /// Acting as staff of this hospital
    Hospital(HospitalId),
}

impl PartyContext {
    /// Which kind of party this is
    pub fn party(&self) -> Party {
        match self {
            PartyContext::Ambulance(_) => Party::Ambulance,
            PartyContext::Hospital(_) => Party::Hospital,
        }
    }
}

impl fmt::Display for PartyContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartyContext::Ambulance(id) => write!(f, "ambulance:{id}"),
            PartyContext::Hospital(id) => write!(f, "hospital:{id}"),
        }
    }
}
