//! Scored hospital candidates produced by the matching collaborator

use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;
use crate::hospital::{Hospital, Specialties};
use crate::ids::HospitalId;
use crate::incident::AffordabilityTier;

/// How the travel estimate was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteType {
    /// Road-network routing
    Road,
    /// Straight-line fallback at an assumed average speed
    Haversine,
}

/// Read-only snapshot of a hospital attached to a candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HospitalSummary {
    /// Identifier
    pub id: HospitalId,
    /// Display name
    pub name: String,
    /// Location
    pub location: GeoPoint,
    /// Affordability tier
    pub affordability: AffordabilityTier,
    /// Free ICU beds
    pub icu_beds: u32,
    /// Free general beds
    pub general_beds: u32,
    /// Specialists on call
    pub specialties: Specialties,
}

impl From<&Hospital> for HospitalSummary {
    fn from(hospital: &Hospital) -> Self {
        Self {
            id: hospital.id,
            name: hospital.name.clone(),
            location: hospital.location,
            affordability: hospital.resources.affordability,
            icu_beds: hospital.resources.icu_beds,
            general_beds: hospital.resources.general_beds,
            specialties: hospital.resources.specialties,
        }
    }
}

/// One scored hospital option for an incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    /// Hospital being offered
    pub hospital: HospitalSummary,
    /// Score, 0 - 100
    pub score: f64,
    /// Estimated travel time in minutes
    pub eta_min: f64,
    /// Distance in kilometers
    pub dist_km: f64,
    /// Source of the travel estimate
    pub route_type: RouteType,
    /// Human-readable reasoning
    pub explanation: String,
}
