//! Hospital records and their updatable resource fields

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};
use crate::geo::GeoPoint;
use crate::ids::HospitalId;
use crate::incident::{AffordabilityTier, EmergencyType};

/// Specialist departments on call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specialties {
    /// Cardiology on call
    pub cardiology: bool,
    /// Trauma surgery on call
    pub trauma: bool,
    /// Neurology on call
    pub neurology: bool,
    /// Pulmonology on call
    pub pulmonology: bool,
}

impl Specialties {
    /// Whether the department matching `emergency` is available.
    /// General emergencies match every hospital.
    pub fn covers(&self, emergency: EmergencyType) -> bool {
        match emergency {
            EmergencyType::Cardiac => self.cardiology,
            EmergencyType::Trauma => self.trauma,
            EmergencyType::Stroke => self.neurology,
            EmergencyType::Respiratory => self.pulmonology,
            EmergencyType::General => true,
        }
    }
}

/// Fields a hospital party may update on its own record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HospitalResources {
    /// Free ICU beds
    pub icu_beds: u32,
    /// Free general beds
    pub general_beds: u32,
    /// Affordability tier
    pub affordability: AffordabilityTier,
    /// Rating 1.0 - 5.0
    pub rating: f64,
    /// Specialists on call
    pub specialties: Specialties,
}

impl HospitalResources {
    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if !self.rating.is_finite() || !(1.0..=5.0).contains(&self.rating) {
            return Err(DomainError::ValidationError(format!(
                "rating must be within 1.0-5.0, got {}",
                self.rating
            )));
        }
        Ok(())
    }
}

/// A receiving hospital
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hospital {
    /// Identifier
    pub id: HospitalId,
    /// Display name
    pub name: String,
    /// Location
    pub location: GeoPoint,
    /// Updatable resource fields
    #[serde(flatten)]
    pub resources: HospitalResources,
}

impl Hospital {
    /// Replace the resource record after validating it
    pub fn apply_resources(&mut self, resources: HospitalResources) -> Result<()> {
        resources.validate()?;
        self.resources = resources;
        Ok(())
    }

    /// Total free beds
    pub fn total_beds(&self) -> u32 {
        self.resources.icu_beds.saturating_add(self.resources.general_beds)
    }
}
