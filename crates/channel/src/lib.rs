//! Real-time channel protocol for PRANA
//!
//! Two subscription scopes exist: the ambulance subscribes per trip
//! (`/ws/trip/{id}`) and the hospital per hospital (`/ws/hospital/{id}`).
//! Events are JSON objects tagged by `type` (see
//! [`ChannelEvent`](prana_domain::ChannelEvent)).
//!
//! Server side, [`RelayServer`] accepts WebSocket subscribers and hands
//! every published event to a [`RelayHub`], which applies the forwarding
//! rules between scopes. Client side, a [`ChannelConnector`] opens a
//! [`ChannelSession`] that reconnects on its own and queues outbound events
//! while the link is down.

#![warn(missing_docs)]

pub mod backoff;
pub mod connector;
pub mod error;
pub mod hub;
pub mod scope;
pub mod server;
pub mod session;

pub use connector::{LocalConnector, WsConnector};
pub use error::{ChannelError, Result};
pub use hub::RelayHub;
pub use scope::ChannelScope;
pub use server::RelayServer;
pub use session::{ChannelConnector, ChannelSession, LinkState, SessionPeer, SessionPublisher};
