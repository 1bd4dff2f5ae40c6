//! Ambulance-side flow: ranking, dispatch, estimation, priority, arrival

use std::time::Duration;

use prana_backend::{seed::DEMO_AMBULANCE, TripBackend};
use prana_channel::{ChannelConnector, ChannelScope};
use prana_core::MatchingConfig;
use prana_domain::{ChannelEvent, EmergencyType, NewIncident, TripStatus};

use crate::test_utils::{expect_event, expect_silence, TestRelay, FAST_PERIOD_MS};

#[tokio::test]
async fn test_cardiac_dispatch_to_best_candidate() {
    let relay = TestRelay::start(MatchingConfig::default()).await;
    let mut ambulance = relay.ambulance(DEMO_AMBULANCE, 60_000);

    let incident = ambulance
        .report_incident(NewIncident::new(EmergencyType::Cardiac, 12.95, 77.58))
        .await
        .unwrap();
    let ranked: Vec<_> = ambulance.rank(incident.id).await.unwrap().collect();

    assert_eq!(ranked.len(), 3);
    assert!(ranked.windows(2).all(|pair| pair[0].score >= pair[1].score));
    assert!(ranked[0].hospital.specialties.cardiology);
    assert!(ranked[0].explanation.starts_with("ETA: "));

    let trip = ambulance.dispatch(&incident, &ranked[0]).await.unwrap();
    assert_eq!(trip.status, TripStatus::Dispatched);
    assert_eq!(trip.eta_minutes, ranked[0].eta_min);
    assert_eq!(trip.hospital_id, ranked[0].hospital.id);
    assert!(!trip.signal_priority_active);

    let recorded = relay.backend.get_trip(trip.id).await.unwrap().unwrap();
    assert_eq!(recorded, trip);

    ambulance.shutdown().await;
    relay.stop().await;
}

#[tokio::test]
async fn test_estimator_ticks_reach_hospital_until_arrival() {
    let relay = TestRelay::start(MatchingConfig::default()).await;
    let mut ambulance = relay.ambulance(DEMO_AMBULANCE, FAST_PERIOD_MS);

    let incident = ambulance
        .report_incident(NewIncident::new(EmergencyType::Stroke, 12.95, 77.58))
        .await
        .unwrap();
    let best = ambulance.rank(incident.id).await.unwrap().next().unwrap();

    let mut hospital = relay
        .connector()
        .open(ChannelScope::Hospital(best.hospital.id))
        .await
        .unwrap();
    let mut events = hospital.take_events().unwrap();

    let trip = ambulance.dispatch(&incident, &best).await.unwrap();

    let first = expect_event(&mut events, |e| matches!(e, ChannelEvent::EtaUpdate { .. })).await;
    let ChannelEvent::EtaUpdate { eta, trip_id } = first else {
        unreachable!()
    };
    assert_eq!(trip_id, Some(trip.id));
    assert!(eta < trip.eta_minutes);
    assert!((trip.eta_minutes - eta - 0.5).abs() < 1e-9);

    let arrived = ambulance.mark_arrived().await.unwrap();
    assert_eq!(arrived.status, TripStatus::Arrived);
    expect_event(&mut events, |e| {
        matches!(e, ChannelEvent::StatusChange { status: TripStatus::Arrived, .. })
    })
    .await;

    // the trip session is gone and nothing more is estimated
    expect_silence(&mut events, Duration::from_millis(4 * FAST_PERIOD_MS), |e| {
        matches!(e, ChannelEvent::EtaUpdate { .. })
    })
    .await;
    assert_eq!(relay.hub.subscriber_count(&ChannelScope::Trip(trip.id)), 0);

    hospital.close().await;
    relay.stop().await;
}

#[tokio::test]
async fn test_priority_factor_above_one_raises_eta() {
    let relay = TestRelay::start(MatchingConfig {
        priority_eta_factor: 1.5,
        ..MatchingConfig::default()
    })
    .await;
    let mut ambulance = relay.ambulance(DEMO_AMBULANCE, 60_000);

    let incident = ambulance
        .report_incident(NewIncident::new(EmergencyType::Trauma, 12.95, 77.58))
        .await
        .unwrap();
    let best = ambulance.rank(incident.id).await.unwrap().next().unwrap();
    let trip = ambulance.dispatch(&incident, &best).await.unwrap();

    let boosted = ambulance.request_priority().await.unwrap();
    assert!(boosted.signal_priority_active);
    assert!(boosted.eta_minutes > trip.eta_minutes);
    assert!((boosted.eta_minutes - trip.eta_minutes * 1.5).abs() < 1e-9);

    // one shot
    assert!(ambulance.request_priority().await.is_err());
    let current = ambulance.current().unwrap().snapshot().unwrap();
    assert_eq!(current.eta_minutes, boosted.eta_minutes);

    ambulance.shutdown().await;
    relay.stop().await;
}
