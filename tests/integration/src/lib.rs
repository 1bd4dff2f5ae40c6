//! End-to-end tests over a real relay socket
//!
//! Each test starts a relay on an ephemeral port backed by the in-memory
//! collaborator and drives ambulance and hospital sessions through
//! [`WsConnector`](prana_channel::WsConnector):
//! - ranking and dispatch
//! - ETA relaying and hospital refresh
//! - acknowledgment, priority and arrival
//! - link loss, queued publishes and refresh after reconnect

pub mod test_utils;

#[cfg(test)]
mod dispatch_flow_tests;

#[cfg(test)]
mod hospital_sync_tests;

#[cfg(test)]
mod relay_forwarding_tests;

#[cfg(test)]
mod reconnect_tests;
