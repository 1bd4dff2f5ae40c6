//! Demo data for the reference backend

use prana_domain::{
    AffordabilityTier, AmbulanceId, GeoPoint, Hospital, HospitalId, HospitalResources, Specialties,
};

/// Ambulance registered by the demo data set
pub const DEMO_AMBULANCE: AmbulanceId = AmbulanceId(1);

/// Where the demo ambulance is parked
pub const DEMO_AMBULANCE_LOCATION: GeoPoint = GeoPoint {
    lat: 12.95,
    lng: 77.58,
};

const ALL: Specialties = Specialties {
    cardiology: true,
    trauma: true,
    neurology: true,
    pulmonology: true,
};

const NONE: Specialties = Specialties {
    cardiology: false,
    trauma: false,
    neurology: false,
    pulmonology: false,
};

struct Row {
    name: &'static str,
    lat: f64,
    lng: f64,
    icu: u32,
    general: u32,
    tier: AffordabilityTier,
    rating: f64,
    specialties: Specialties,
}

const ROWS: [Row; 6] = [
    Row {
        name: "City Central Hospital",
        lat: 12.9716,
        lng: 77.5946,
        icu: 10,
        general: 50,
        tier: AffordabilityTier::STANDARD,
        rating: 4.5,
        specialties: Specialties {
            cardiology: true,
            trauma: true,
            neurology: false,
            pulmonology: true,
        },
    },
    Row {
        name: "Apollo Care",
        lat: 12.9650,
        lng: 77.6000,
        icu: 20,
        general: 100,
        tier: AffordabilityTier::PREMIUM,
        rating: 4.8,
        specialties: ALL,
    },
    Row {
        name: "St. John's Medical",
        lat: 12.9244,
        lng: 77.6186,
        icu: 15,
        general: 150,
        tier: AffordabilityTier::BUDGET,
        rating: 4.2,
        specialties: Specialties {
            cardiology: false,
            trauma: true,
            neurology: false,
            pulmonology: true,
        },
    },
    Row {
        name: "Manipal Whitefield",
        lat: 12.9840,
        lng: 77.7523,
        icu: 25,
        general: 80,
        tier: AffordabilityTier::PREMIUM,
        rating: 4.7,
        specialties: Specialties {
            cardiology: true,
            trauma: true,
            neurology: true,
            pulmonology: false,
        },
    },
    Row {
        name: "Fortis Bannerghatta",
        lat: 12.8943,
        lng: 77.5980,
        icu: 30,
        general: 120,
        tier: AffordabilityTier::PREMIUM,
        rating: 4.6,
        specialties: ALL,
    },
    Row {
        name: "Sagar Clinic",
        lat: 12.9300,
        lng: 77.5800,
        icu: 2,
        general: 20,
        tier: AffordabilityTier::BUDGET,
        rating: 3.8,
        specialties: NONE,
    },
];

/// Six Bengaluru hospitals, ids 1 through 6
pub fn demo_hospitals() -> Vec<Hospital> {
    ROWS.iter()
        .zip(1u64..)
        .map(|(row, id)| Hospital {
            id: HospitalId(id),
            name: row.name.to_string(),
            location: GeoPoint {
                lat: row.lat,
                lng: row.lng,
            },
            resources: HospitalResources {
                icu_beds: row.icu,
                general_beds: row.general,
                affordability: row.tier,
                rating: row.rating,
                specialties: row.specialties,
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_hospitals_are_valid() {
        let hospitals = demo_hospitals();
        assert_eq!(hospitals.len(), 6);
        for h in &hospitals {
            h.resources.validate().unwrap();
            GeoPoint::new(h.location.lat, h.location.lng).unwrap();
        }
        assert_eq!(hospitals[0].id, HospitalId(1));
        assert_eq!(hospitals[5].name, "Sagar Clinic");
    }
}
