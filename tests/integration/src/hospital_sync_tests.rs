//! Hospital console against a live relay

use std::time::Duration;

use prana_backend::seed::DEMO_AMBULANCE;
use prana_core::MatchingConfig;
use prana_domain::{EmergencyType, NewIncident, PreparationAction, TripStatus};
use prana_sync::{ConsoleChange, HospitalConsoleSynchronizer};

use crate::test_utils::{TestRelay, FAST_PERIOD_MS};

async fn wait_until(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_hospital_learns_of_trip_from_relayed_eta() {
    let relay = TestRelay::start(MatchingConfig::default()).await;
    let mut ambulance = relay.ambulance(DEMO_AMBULANCE, FAST_PERIOD_MS);

    let incident = ambulance
        .report_incident(NewIncident::new(EmergencyType::Respiratory, 12.95, 77.58))
        .await
        .unwrap();
    let best = ambulance.rank(incident.id).await.unwrap().next().unwrap();

    let connector = relay.connector();
    let console = HospitalConsoleSynchronizer::start(best.hospital.id, relay.backend.clone(), connector.as_ref())
        .await
        .unwrap();
    let mut changes = console.subscribe();

    let trip = ambulance.dispatch(&incident, &best).await.unwrap();

    let change = tokio::time::timeout(Duration::from_secs(2), changes.recv())
        .await
        .expect("no change")
        .unwrap();
    assert!(matches!(change, ConsoleChange::Incoming(t) if t.id == trip.id));

    // later ticks show up as updates with a falling eta
    let change = tokio::time::timeout(Duration::from_secs(2), changes.recv())
        .await
        .expect("no update")
        .unwrap();
    let ConsoleChange::Updated(updated) = change else {
        panic!("expected an update, got {change:?}");
    };
    assert!(updated.eta_minutes < trip.eta_minutes);

    ambulance.shutdown().await;
    console.close().await;
    relay.stop().await;
}

#[tokio::test]
async fn test_acknowledgment_reaches_ambulance() {
    let relay = TestRelay::start(MatchingConfig::default()).await;
    let mut ambulance = relay.ambulance(DEMO_AMBULANCE, 60_000);

    let incident = ambulance
        .report_incident(NewIncident::new(EmergencyType::Cardiac, 12.95, 77.58))
        .await
        .unwrap();
    let best = ambulance.rank(incident.id).await.unwrap().next().unwrap();
    let trip = ambulance.dispatch(&incident, &best).await.unwrap();

    let connector = relay.connector();
    let console = HospitalConsoleSynchronizer::start(best.hospital.id, relay.backend.clone(), connector.as_ref())
        .await
        .unwrap();
    assert_eq!(console.active_trips(), vec![trip.clone()]);

    let first = console.acknowledge(trip.id).await.unwrap();
    let second = console.acknowledge(trip.id).await.unwrap();
    assert_eq!(first.status, TripStatus::Acknowledged);
    assert_eq!(second, first);

    let reserved = console.reserve_bed(trip.id).await.unwrap();
    assert!(reserved.preparations.contains(&PreparationAction::ReserveBed));

    let mirror = ambulance.current().unwrap().mirror().clone();
    wait_until(|| {
        mirror.snapshot().is_some_and(|t| {
            t.status == TripStatus::Acknowledged
                && t.preparations.contains(&PreparationAction::ReserveBed)
        })
    })
    .await;
    // acknowledgment never overrides the ambulance's own eta
    assert_eq!(mirror.snapshot().unwrap().eta_minutes, trip.eta_minutes);

    ambulance.shutdown().await;
    console.close().await;
    relay.stop().await;
}
