//! Client side of a channel subscription

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use prana_domain::ChannelEvent;

use crate::error::{ChannelError, Result};
use crate::scope::ChannelScope;

/// Connection state of a session's link to the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// First connection attempt in progress
    Connecting,
    /// Connected; events flow both ways
    Connected,
    /// Link lost; retrying
    Reconnecting {
        /// Failed attempts since the link was last up
        attempt: u32,
    },
    /// Session closed for good
    Closed,
}

/// Opens channel sessions for a scope
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    /// Open a session subscribed to `scope`
    async fn open(&self, scope: ChannelScope) -> Result<ChannelSession>;
}

/// Cloneable handle for publishing on a session.
///
/// Publishing never blocks: events are queued and sent in order by the
/// session's pump, including across reconnects.
#[derive(Debug, Clone)]
pub struct SessionPublisher {
    scope: ChannelScope,
    outbound: mpsc::Sender<ChannelEvent>,
    closing: CancellationToken,
}

impl SessionPublisher {
    /// Scope this publisher sends on
    pub fn scope(&self) -> ChannelScope {
        self.scope
    }

    /// Queue `event` for delivery
    pub fn publish(&self, event: ChannelEvent) -> Result<()> {
        if self.closing.is_cancelled() {
            return Err(ChannelError::Closed);
        }
        match self.outbound.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                Err(ChannelError::Backpressure(self.outbound.max_capacity()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ChannelError::Closed),
        }
    }

    /// Whether the session has been closed
    pub fn is_closed(&self) -> bool {
        self.closing.is_cancelled()
    }

    /// Resolves once the session starts closing
    pub async fn closed(&self) {
        self.closing.cancelled().await
    }
}

/// Far end of a [`ChannelSession::pair`]
#[derive(Debug)]
pub struct SessionPeer {
    /// Events published on the session, in order
    pub published: mpsc::Receiver<ChannelEvent>,
    /// Events sent here reach the session's consumer
    pub deliver: mpsc::Sender<ChannelEvent>,
}

/// Channels a pump works against
pub(crate) struct PumpIo {
    pub outbound: mpsc::Receiver<ChannelEvent>,
    pub inbound: mpsc::Sender<ChannelEvent>,
    pub link: watch::Sender<LinkState>,
    pub closing: CancellationToken,
}

/// A live subscription on one scope.
///
/// Inbound events are read from [`take_events`](Self::take_events); the
/// relay's connection `ack` is consumed by the session and never appears
/// there. Dropping the session closes it without flushing; call
/// [`close`](Self::close) to flush queued events first.
#[derive(Debug)]
pub struct ChannelSession {
    publisher: SessionPublisher,
    events: Option<mpsc::Receiver<ChannelEvent>>,
    link: watch::Receiver<LinkState>,
    pump: Option<JoinHandle<()>>,
}

impl ChannelSession {
    /// Build a session around a pump. `start` receives the pump's end of
    /// the channels and returns the spawned task.
    pub(crate) fn spawn(
        scope: ChannelScope,
        outbound_buffer: usize,
        inbound_buffer: usize,
        start: impl FnOnce(PumpIo) -> JoinHandle<()>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(outbound_buffer.max(1));
        let (inbound_tx, inbound_rx) = mpsc::channel(inbound_buffer.max(1));
        let (link_tx, link_rx) = watch::channel(LinkState::Connecting);
        let closing = CancellationToken::new();

        let pump = start(PumpIo {
            outbound: outbound_rx,
            inbound: inbound_tx,
            link: link_tx,
            closing: closing.clone(),
        });

        Self {
            publisher: SessionPublisher {
                scope,
                outbound: outbound_tx,
                closing,
            },
            events: Some(inbound_rx),
            link: link_rx,
            pump: Some(pump),
        }
    }

    /// A session wired directly to a [`SessionPeer`] instead of a relay.
    /// The link is always up until the session closes.
    pub fn pair(scope: ChannelScope, buffer: usize) -> (Self, SessionPeer) {
        let (outbound_tx, outbound_rx) = mpsc::channel(buffer.max(1));
        let (inbound_tx, inbound_rx) = mpsc::channel(buffer.max(1));
        let (link_tx, link_rx) = watch::channel(LinkState::Connected);
        let closing = CancellationToken::new();

        let watcher = closing.clone();
        let pump = tokio::spawn(async move {
            watcher.cancelled().await;
            let _ = link_tx.send(LinkState::Closed);
        });

        let session = Self {
            publisher: SessionPublisher {
                scope,
                outbound: outbound_tx,
                closing,
            },
            events: Some(inbound_rx),
            link: link_rx,
            pump: Some(pump),
        };
        let peer = SessionPeer {
            published: outbound_rx,
            deliver: inbound_tx,
        };
        (session, peer)
    }

    /// Subscribed scope
    pub fn scope(&self) -> ChannelScope {
        self.publisher.scope
    }

    /// A publishing handle that can be moved into other tasks
    pub fn publisher(&self) -> SessionPublisher {
        self.publisher.clone()
    }

    /// Queue `event` for delivery
    pub fn publish(&self, event: ChannelEvent) -> Result<()> {
        self.publisher.publish(event)
    }

    /// Take the inbound event stream. Returns `None` after the first call.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<ChannelEvent>> {
        self.events.take()
    }

    /// Watch the link state
    pub fn link_state(&self) -> watch::Receiver<LinkState> {
        self.link.clone()
    }

    /// Whether the session has been closed
    pub fn is_closed(&self) -> bool {
        self.publisher.is_closed()
    }

    /// Wait until the link reports [`LinkState::Connected`]
    pub(crate) async fn wait_connected(&mut self) -> Result<()> {
        loop {
            match *self.link.borrow_and_update() {
                LinkState::Connected => return Ok(()),
                LinkState::Closed => return Err(ChannelError::Closed),
                _ => {}
            }
            if self.link.changed().await.is_err() {
                return Err(ChannelError::Closed);
            }
        }
    }

    /// Flush queued events, send a close frame and stop the pump
    pub async fn close(mut self) {
        self.publisher.closing.cancel();
        if let Some(pump) = self.pump.take() {
            if let Err(e) = pump.await {
                debug!(scope = %self.publisher.scope, error = %e, "Session pump ended abnormally");
            }
        }
        debug!(scope = %self.publisher.scope, "Session closed");
    }
}

impl Drop for ChannelSession {
    fn drop(&mut self) {
        self.publisher.closing.cancel();
    }
}
