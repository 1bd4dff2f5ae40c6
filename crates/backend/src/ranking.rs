//! Reference hospital ranking
//!
//! Weighted score over five factors, each normalized to 0-100:
//! travel time 40%, bed readiness 20%, specialist match 20%,
//! affordability 10%, rating 10%. Travel time uses the straight-line
//! distance at the configured average speed.

use prana_core::MatchingConfig;
use prana_domain::{
    EmergencyType, GeoPoint, Hospital, HospitalSummary, Incident, MatchCandidate, RouteType,
};

const W_ETA: f64 = 0.4;
const W_BEDS: f64 = 0.2;
const W_SPECIALIST: f64 = 0.2;
const W_AFFORD: f64 = 0.1;
const W_RATING: f64 = 0.1;

/// Travel time at which the ETA score bottoms out
const ETA_SCORE_HORIZON_MIN: f64 = 60.0;

/// Distance and duration between two points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteEstimate {
    /// Distance in kilometers
    pub distance_km: f64,
    /// Duration in minutes
    pub duration_min: f64,
    /// How it was estimated
    pub route_type: RouteType,
}

/// Straight-line estimate at `speed_kmh`
pub fn straight_line_route(from: &GeoPoint, to: &GeoPoint, speed_kmh: f64) -> RouteEstimate {
    let distance_km = from.distance_km(to);
    RouteEstimate {
        distance_km,
        duration_min: distance_km / (speed_kmh / 60.0),
        route_type: RouteType::Haversine,
    }
}

fn bed_score(emergency: EmergencyType, hospital: &Hospital) -> f64 {
    let res = &hospital.resources;
    if hospital.total_beds() == 0 {
        return 0.0;
    }
    match emergency {
        EmergencyType::Cardiac | EmergencyType::Stroke | EmergencyType::Respiratory => {
            if res.icu_beds > 0 {
                100.0
            } else {
                20.0
            }
        }
        EmergencyType::Trauma => match (res.specialties.trauma, res.icu_beds > 0) {
            (true, true) => 100.0,
            (false, true) => 80.0,
            _ => 20.0,
        },
        EmergencyType::General => {
            if res.general_beds > 0 {
                100.0
            } else {
                50.0
            }
        }
    }
}

fn affordability_score(incident: &Incident, hospital: &Hospital) -> f64 {
    match incident.affordability {
        None => 100.0,
        Some(pref) => match pref.distance(hospital.resources.affordability) {
            0 => 100.0,
            1 => 50.0,
            _ => 0.0,
        },
    }
}

/// Score one hospital against an incident for a given route
pub fn score_hospital(incident: &Incident, hospital: &Hospital, route: &RouteEstimate) -> MatchCandidate {
    let eta_score = (100.0 - route.duration_min * 100.0 / ETA_SCORE_HORIZON_MIN).max(0.0);
    let beds = bed_score(incident.emergency_type, hospital);
    let specialist = if hospital.resources.specialties.covers(incident.emergency_type) {
        100.0
    } else {
        0.0
    };
    let afford = affordability_score(incident, hospital);
    let rating = hospital.resources.rating / 5.0 * 100.0;

    let score = W_ETA * eta_score
        + W_BEDS * beds
        + W_SPECIALIST * specialist
        + W_AFFORD * afford
        + W_RATING * rating;

    let mut explanation = format!(
        "ETA: {:.1}m ({:.1}km).",
        route.duration_min, route.distance_km
    );
    if beds.max(specialist) > 80.0 {
        explanation.push_str(&format!(" High readiness for {}.", incident.emergency_type));
    }
    if incident.affordability == Some(hospital.resources.affordability) {
        explanation.push_str(" Meets affordability preference.");
    }

    MatchCandidate {
        hospital: HospitalSummary::from(hospital),
        score: score.clamp(0.0, 100.0),
        eta_min: route.duration_min,
        dist_km: route.distance_km,
        route_type: route.route_type,
        explanation,
    }
}

/// Rank `hospitals` for `incident`, best first, truncated to the configured size
pub fn rank<'a>(
    incident: &Incident,
    hospitals: impl IntoIterator<Item = &'a Hospital>,
    config: &MatchingConfig,
) -> Vec<MatchCandidate> {
    let mut candidates: Vec<MatchCandidate> = hospitals
        .into_iter()
        .map(|hospital| {
            let route =
                straight_line_route(&incident.location, &hospital.location, config.average_speed_kmh);
            score_hospital(incident, hospital, &route)
        })
        .collect();

    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates.truncate(config.max_candidates);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::demo_hospitals;
    use chrono::Utc;
    use prana_domain::{AffordabilityTier, IncidentId, NewIncident};

    fn incident(emergency: EmergencyType, tier: Option<u8>) -> Incident {
        let mut request = NewIncident::new(emergency, 12.95, 77.58);
        request.affordability = tier.map(|t| AffordabilityTier::new(t).unwrap());
        Incident::from_request(IncidentId(1), request, Utc::now()).unwrap()
    }

    #[test]
    fn test_straight_line_duration() {
        let a = GeoPoint::new(0.0, 0.0).unwrap();
        let b = GeoPoint::new(0.0, 1.0).unwrap();
        let route = straight_line_route(&a, &b, 40.0);
        // ~111 km at 40 km/h is ~167 minutes
        assert!((route.duration_min - route.distance_km * 1.5).abs() < 1e-9);
        assert_eq!(route.route_type, RouteType::Haversine);
    }

    #[test]
    fn test_rank_is_sorted_and_truncated() {
        let hospitals = demo_hospitals();
        let config = MatchingConfig::default();
        let ranked = rank(&incident(EmergencyType::Cardiac, None), &hospitals, &config);

        assert_eq!(ranked.len(), 3);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(ranked.iter().all(|c| (0.0..=100.0).contains(&c.score)));
        assert!(ranked.iter().all(|c| c.eta_min > 0.0));
    }

    #[test]
    fn test_cardiac_prefers_cardiology() {
        let hospitals = demo_hospitals();
        let ranked = rank(
            &incident(EmergencyType::Cardiac, None),
            &hospitals,
            &MatchingConfig::default(),
        );
        assert!(ranked[0].hospital.specialties.cardiology);
        assert!(ranked[0].explanation.contains("High readiness for Cardiac"));
    }

    #[test]
    fn test_affordability_preference_explained() {
        let hospitals = demo_hospitals();
        let config = MatchingConfig {
            max_candidates: hospitals.len(),
            ..MatchingConfig::default()
        };
        let ranked = rank(&incident(EmergencyType::General, Some(1)), &hospitals, &config);
        let tier_one = ranked
            .iter()
            .find(|c| c.hospital.affordability.get() == 1)
            .unwrap();
        assert!(tier_one.explanation.contains("Meets affordability preference"));
    }

    #[test]
    fn test_no_hospitals_no_candidates() {
        let ranked = rank(
            &incident(EmergencyType::Trauma, None),
            std::iter::empty(),
            &MatchingConfig::default(),
        );
        assert!(ranked.is_empty());
    }
}
