//! Link loss and recovery against a relay that restarts on the same address

use std::time::Duration;

use prana_backend::{seed::DEMO_AMBULANCE, TripBackend};
use prana_channel::{ChannelConnector, ChannelScope, LinkState, LocalConnector};
use prana_core::{ChannelConfig, MatchingConfig};
use prana_domain::{ChannelEvent, EmergencyType, NewIncident};
use prana_sync::{ConsoleChange, HospitalConsoleSynchronizer};

use crate::test_utils::{expect_event, expect_link, TestRelay};

fn reconnecting(state: &LinkState) -> bool {
    matches!(state, LinkState::Reconnecting { .. })
}

fn connected(state: &LinkState) -> bool {
    *state == LinkState::Connected
}

#[tokio::test]
async fn test_events_queued_while_down_flush_in_order() {
    let mut relay = TestRelay::start(MatchingConfig::default()).await;
    let mut ambulance = relay.ambulance(DEMO_AMBULANCE, 60_000);

    let incident = ambulance
        .report_incident(NewIncident::new(EmergencyType::Cardiac, 12.95, 77.58))
        .await
        .unwrap();
    let best = ambulance.rank(incident.id).await.unwrap().next().unwrap();
    let trip = ambulance.dispatch(&incident, &best).await.unwrap();

    // in-process watcher on the hospital scope survives the socket restart
    let mut watcher = LocalConnector::new(relay.hub.clone(), ChannelConfig::default())
        .open(ChannelScope::Hospital(trip.hospital_id))
        .await
        .unwrap();
    let mut events = watcher.take_events().unwrap();

    let session = relay.connector().open(ChannelScope::Trip(trip.id)).await.unwrap();
    let mut link = session.link_state();

    relay.go_down().await;
    expect_link(&mut link, reconnecting).await;

    for eta in [3.0, 2.5, 2.0] {
        session.publish(ChannelEvent::eta_update(eta)).unwrap();
    }
    // nothing leaks out while the link is down
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(events.try_recv().is_err());

    relay.come_back().await;
    expect_link(&mut link, connected).await;

    for expected in [3.0, 2.5, 2.0] {
        let event = expect_event(&mut events, |e| matches!(e, ChannelEvent::EtaUpdate { .. })).await;
        assert_eq!(
            event,
            ChannelEvent::EtaUpdate {
                eta: expected,
                trip_id: Some(trip.id)
            }
        );
    }
    assert_eq!(
        relay.backend.get_trip(trip.id).await.unwrap().unwrap().eta_minutes,
        2.0
    );

    session.close().await;
    watcher.close().await;
    ambulance.shutdown().await;
    relay.stop().await;
}

#[tokio::test]
async fn test_hospital_console_rereads_after_reconnect() {
    let mut relay = TestRelay::start(MatchingConfig::default()).await;
    let mut ambulance = relay.ambulance(DEMO_AMBULANCE, 60_000);

    let incident = ambulance
        .report_incident(NewIncident::new(EmergencyType::Trauma, 12.95, 77.58))
        .await
        .unwrap();
    let best = ambulance.rank(incident.id).await.unwrap().next().unwrap();
    let trip = ambulance.dispatch(&incident, &best).await.unwrap();

    let connector = relay.connector();
    let console = HospitalConsoleSynchronizer::start(trip.hospital_id, relay.backend.clone(), connector.as_ref())
        .await
        .unwrap();
    assert_eq!(console.active_trips(), vec![trip.clone()]);
    let mut changes = console.subscribe();
    let mut link = console.link_state();

    relay.go_down().await;
    expect_link(&mut link, reconnecting).await;

    // recorded while the hospital cannot hear about it
    let missed = trip.eta_minutes + 7.0;
    relay.backend.record_eta(trip.id, missed).await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(changes.try_recv().is_err());

    relay.come_back().await;
    expect_link(&mut link, connected).await;

    let change = tokio::time::timeout(Duration::from_secs(3), changes.recv())
        .await
        .expect("no refresh after reconnect")
        .unwrap();
    let ConsoleChange::Updated(seen) = change else {
        panic!("expected an update, got {change:?}");
    };
    assert_eq!(seen.id, trip.id);
    assert_eq!(seen.eta_minutes, missed);
    assert_eq!(console.active_trips()[0].eta_minutes, missed);

    console.close().await;
    ambulance.shutdown().await;
    relay.stop().await;
}
