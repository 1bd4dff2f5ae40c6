//! Relay forwarding rules over real sockets

use std::time::Duration;

use prana_backend::{seed::DEMO_AMBULANCE, TripBackend};
use prana_channel::{ChannelConnector, ChannelScope};
use prana_core::MatchingConfig;
use prana_domain::{ChannelEvent, EmergencyType, HospitalId, NewIncident, TripId, TripStatus};

use crate::test_utils::{expect_event, expect_silence, TestRelay};

#[tokio::test]
async fn test_eta_for_unknown_trip_not_forwarded() {
    let relay = TestRelay::start(MatchingConfig::default()).await;
    let connector = relay.connector();

    let mut hospital = connector.open(ChannelScope::Hospital(HospitalId(1))).await.unwrap();
    let mut events = hospital.take_events().unwrap();
    let stray = connector.open(ChannelScope::Trip(TripId(999))).await.unwrap();

    stray.publish(ChannelEvent::eta_update(4.0)).unwrap();
    expect_silence(&mut events, Duration::from_millis(300), |_| true).await;

    stray.close().await;
    hospital.close().await;
    relay.stop().await;
}

#[tokio::test]
async fn test_trip_events_fan_out_to_destination_hospital() {
    let relay = TestRelay::start(MatchingConfig::default()).await;
    let connector = relay.connector();
    let mut ambulance = relay.ambulance(DEMO_AMBULANCE, 60_000);

    let incident = ambulance
        .report_incident(NewIncident::new(EmergencyType::General, 12.95, 77.58))
        .await
        .unwrap();
    let best = ambulance.rank(incident.id).await.unwrap().next().unwrap();
    let trip = ambulance.dispatch(&incident, &best).await.unwrap();

    let mut receiving = connector.open(ChannelScope::Hospital(trip.hospital_id)).await.unwrap();
    let other_id = relay
        .backend
        .list_hospitals()
        .await
        .unwrap()
        .into_iter()
        .map(|h| h.id)
        .find(|id| *id != trip.hospital_id)
        .unwrap();
    let mut other = connector.open(ChannelScope::Hospital(other_id)).await.unwrap();
    let mut receiving_events = receiving.take_events().unwrap();
    let mut other_events = other.take_events().unwrap();

    // a second trip-scoped session stands in for a phone publishing manually
    let manual = connector.open(ChannelScope::Trip(trip.id)).await.unwrap();
    manual.publish(ChannelEvent::eta_update(2.5)).unwrap();

    let event = expect_event(&mut receiving_events, |e| matches!(e, ChannelEvent::EtaUpdate { .. })).await;
    assert_eq!(
        event,
        ChannelEvent::EtaUpdate {
            eta: 2.5,
            trip_id: Some(trip.id)
        }
    );
    assert_eq!(relay.backend.get_trip(trip.id).await.unwrap().unwrap().eta_minutes, 2.5);
    expect_silence(&mut other_events, Duration::from_millis(200), |_| true).await;

    ambulance.mark_arrived().await.unwrap();
    expect_event(&mut receiving_events, |e| {
        matches!(e, ChannelEvent::StatusChange { status: TripStatus::Arrived, .. })
    })
    .await;

    // terminal trips take no more estimates
    manual.publish(ChannelEvent::eta_update(1.0)).unwrap();
    expect_silence(&mut receiving_events, Duration::from_millis(300), |e| {
        matches!(e, ChannelEvent::EtaUpdate { .. })
    })
    .await;
    assert_eq!(
        relay.backend.get_trip(trip.id).await.unwrap().unwrap().eta_minutes,
        2.5
    );

    manual.close().await;
    receiving.close().await;
    other.close().await;
    relay.stop().await;
}
