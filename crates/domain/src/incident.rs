//! Emergency incident records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DomainError, Result};
use crate::geo::GeoPoint;
use crate::ids::IncidentId;

/// Category of emergency, used for specialist and bed matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmergencyType {
    /// Cardiac event
    Cardiac,
    /// Physical trauma
    Trauma,
    /// Stroke
    Stroke,
    /// Respiratory distress
    Respiratory,
    /// Anything else
    General,
}

impl EmergencyType {
    /// Whether this type needs an ICU bed to be handled well
    pub fn needs_icu(&self) -> bool {
        matches!(
            self,
            EmergencyType::Cardiac | EmergencyType::Stroke | EmergencyType::Respiratory
        )
    }
}

impl fmt::Display for EmergencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EmergencyType::Cardiac => "Cardiac",
            EmergencyType::Trauma => "Trauma",
            EmergencyType::Stroke => "Stroke",
            EmergencyType::Respiratory => "Respiratory",
            EmergencyType::General => "General",
        };
        f.write_str(name)
    }
}

/// Affordability tier, 1 (cheapest) to 3
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct AffordabilityTier(u8);

impl AffordabilityTier {
    /// Lowest tier
    pub const MIN: u8 = 1;
    /// Highest tier
    pub const MAX: u8 = 3;

    /// Tier 1, lowest cost
    pub const BUDGET: Self = Self(1);
    /// Tier 2
    pub const STANDARD: Self = Self(2);
    /// Tier 3, highest cost
    pub const PREMIUM: Self = Self(3);

    /// Validate a raw tier
    pub fn new(tier: u8) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&tier) {
            Ok(Self(tier))
        } else {
            Err(DomainError::ValidationError(format!(
                "affordability tier must be {}-{}, got {tier}",
                Self::MIN,
                Self::MAX
            )))
        }
    }

    /// Raw tier value
    pub fn get(self) -> u8 {
        self.0
    }

    /// Absolute distance between two tiers
    pub fn distance(self, other: AffordabilityTier) -> u8 {
        self.0.abs_diff(other.0)
    }
}

impl TryFrom<u8> for AffordabilityTier {
    type Error = DomainError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<AffordabilityTier> for u8 {
    fn from(tier: AffordabilityTier) -> Self {
        tier.0
    }
}

/// Optional patient vitals captured on scene
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vitals {
    /// Heart rate (bpm)
    pub heart_rate: Option<u32>,
    /// Oxygen saturation (%)
    pub spo2: Option<u32>,
    /// Systolic pressure (mmHg)
    pub bp_systolic: Option<u32>,
    /// Diastolic pressure (mmHg)
    pub bp_diastolic: Option<u32>,
}

/// Incident creation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewIncident {
    /// Emergency category
    pub emergency_type: EmergencyType,
    /// Latitude in decimal degrees
    pub lat: f64,
    /// Longitude in decimal degrees
    pub lng: f64,
    /// Vitals, if captured
    #[serde(default)]
    pub vitals: Option<Vitals>,
    /// Preferred affordability tier; `None` means any
    #[serde(default)]
    pub affordability: Option<AffordabilityTier>,
}

impl NewIncident {
    /// Minimal incident with no vitals and no tier preference
    pub fn new(emergency_type: EmergencyType, lat: f64, lng: f64) -> Self {
        Self {
            emergency_type,
            lat,
            lng,
            vitals: None,
            affordability: None,
        }
    }

    /// Validate coordinates
    pub fn location(&self) -> Result<GeoPoint> {
        GeoPoint::new(self.lat, self.lng)
    }
}

/// An emergency report. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    /// Identifier assigned by the backend
    pub id: IncidentId,
    /// Emergency category
    pub emergency_type: EmergencyType,
    /// Scene location
    pub location: GeoPoint,
    /// Vitals, if captured
    pub vitals: Option<Vitals>,
    /// Preferred affordability tier; `None` means any
    pub affordability: Option<AffordabilityTier>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Incident {
    /// Materialize a validated request under the given id
    pub fn from_request(id: IncidentId, request: NewIncident, created_at: DateTime<Utc>) -> Result<Self> {
        let location = request.location()?;
        Ok(Self {
            id,
            emergency_type: request.emergency_type,
            location,
            vitals: request.vitals,
            affordability: request.affordability,
            created_at,
        })
    }
}
