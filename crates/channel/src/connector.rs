//! Session transports: WebSocket to a remote relay, or in-process to a hub

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use prana_core::ChannelConfig;
use prana_domain::ChannelEvent;

use crate::backoff::Backoff;
use crate::error::{ChannelError, Result};
use crate::hub::{RelayHub, Subscription};
use crate::scope::ChannelScope;
use crate::session::{ChannelConnector, ChannelSession, LinkState, PumpIo};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects sessions to a relay over WebSocket
#[derive(Debug, Clone)]
pub struct WsConnector {
    config: ChannelConfig,
}

impl WsConnector {
    /// Connector for the relay at `config.endpoint`
    pub fn new(config: ChannelConfig) -> Self {
        Self { config }
    }

    /// Full URL for `scope`
    pub fn url(&self, scope: &ChannelScope) -> String {
        format!("{}{}", self.config.endpoint.trim_end_matches('/'), scope.path())
    }
}

#[async_trait]
impl ChannelConnector for WsConnector {
    async fn open(&self, scope: ChannelScope) -> Result<ChannelSession> {
        let url = self.url(&scope);
        let config = self.config.clone();
        let mut session = ChannelSession::spawn(
            scope,
            config.outbound_buffer,
            config.inbound_buffer,
            move |io| tokio::spawn(run_ws_pump(url, scope, config, io)),
        );

        let timeout = self.config.connect_timeout();
        let outcome = tokio::time::timeout(timeout, session.wait_connected()).await;
        match outcome {
            Ok(Ok(())) => Ok(session),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(%scope, ?timeout, "Relay not reachable");
                session.close().await;
                Err(ChannelError::ConnectTimeout(timeout))
            }
        }
    }
}

enum LinkEnd {
    Closing,
    Lost,
}

async fn run_ws_pump(url: String, scope: ChannelScope, config: ChannelConfig, mut io: PumpIo) {
    let mut backoff = Backoff::from_config(&config);
    let attempt_timeout = config.connect_timeout();

    loop {
        let connected = tokio::select! {
            biased;
            _ = io.closing.cancelled() => break,
            result = tokio::time::timeout(attempt_timeout, connect_async(url.as_str())) => result,
        };

        match connected {
            Ok(Ok((ws, _))) => {
                backoff.reset();
                let _ = io.link.send(LinkState::Connected);
                info!(%scope, "Channel connected");
                match drive_ws(ws, scope, &mut io).await {
                    LinkEnd::Closing => break,
                    LinkEnd::Lost => warn!(%scope, "Channel link lost"),
                }
            }
            Ok(Err(e)) => debug!(%scope, error = %e, "Connect attempt failed"),
            // a relay that accepts but never answers the handshake
            Err(_) => debug!(%scope, timeout = ?attempt_timeout, "Connect attempt timed out"),
        }

        let delay = backoff.next_delay();
        let _ = io.link.send(LinkState::Reconnecting {
            attempt: backoff.attempt(),
        });
        debug!(%scope, ?delay, attempt = backoff.attempt(), "Reconnecting");
        tokio::select! {
            biased;
            _ = io.closing.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    let unsent = drain(&mut io);
    if unsent > 0 {
        warn!(%scope, unsent, "Session closed while disconnected, queued events dropped");
    }
    let _ = io.link.send(LinkState::Closed);
}

fn drain(io: &mut PumpIo) -> usize {
    let mut count = 0;
    while io.outbound.try_recv().is_ok() {
        count += 1;
    }
    count
}

async fn send_event(
    sink: &mut futures_util::stream::SplitSink<WsStream, Message>,
    event: &ChannelEvent,
) -> Result<()> {
    let json = serde_json::to_string(event)?;
    sink.send(Message::Text(json)).await?;
    Ok(())
}

/// Decode an inbound frame. Acks are consumed here.
fn decode(scope: &ChannelScope, text: &str) -> Option<ChannelEvent> {
    match serde_json::from_str::<ChannelEvent>(text) {
        Ok(ChannelEvent::Ack { message }) => {
            debug!(%scope, %message, "Relay acknowledged subscription");
            None
        }
        Ok(event) => Some(event),
        Err(e) => {
            warn!(%scope, error = %e, "Undecodable frame dropped");
            None
        }
    }
}

async fn drive_ws(ws: WsStream, scope: ChannelScope, io: &mut PumpIo) -> LinkEnd {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            biased;

            _ = io.closing.cancelled() => {
                while let Ok(event) = io.outbound.try_recv() {
                    if let Err(e) = send_event(&mut sink, &event).await {
                        warn!(%scope, error = %e, "Flush on close failed");
                        return LinkEnd::Closing;
                    }
                }
                if let Err(e) = sink.send(Message::Close(None)).await {
                    debug!(%scope, error = %e, "Close frame not sent");
                }
                return LinkEnd::Closing;
            }

            event = io.outbound.recv() => {
                let Some(event) = event else {
                    let _ = sink.send(Message::Close(None)).await;
                    return LinkEnd::Closing;
                };
                // a failed write is not retried: delivery is at most once
                if let Err(e) = send_event(&mut sink, &event).await {
                    warn!(%scope, event = event.kind(), error = %e, "Send failed");
                    return LinkEnd::Lost;
                }
            }

            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = decode(&scope, &text) {
                        if io.inbound.send(event).await.is_err() {
                            debug!(%scope, "Inbound consumer gone");
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => return LinkEnd::Lost,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(%scope, error = %e, "Receive failed");
                    return LinkEnd::Lost;
                }
            },
        }
    }
}

/// Connects sessions straight to an in-process [`RelayHub`]
#[derive(Debug, Clone)]
pub struct LocalConnector {
    hub: Arc<RelayHub>,
    config: ChannelConfig,
}

impl LocalConnector {
    /// Connector bound to `hub`
    pub fn new(hub: Arc<RelayHub>, config: ChannelConfig) -> Self {
        Self { hub, config }
    }
}

#[async_trait]
impl ChannelConnector for LocalConnector {
    async fn open(&self, scope: ChannelScope) -> Result<ChannelSession> {
        let subscription = self.hub.attach(scope);
        let hub = Arc::clone(&self.hub);
        let mut session = ChannelSession::spawn(
            scope,
            self.config.outbound_buffer,
            self.config.inbound_buffer,
            move |io| tokio::spawn(run_local_pump(hub, subscription, io)),
        );
        session.wait_connected().await?;
        Ok(session)
    }
}

async fn run_local_pump(hub: Arc<RelayHub>, mut subscription: Subscription, mut io: PumpIo) {
    let scope = subscription.scope;
    let _ = io.link.send(LinkState::Connected);

    loop {
        tokio::select! {
            biased;

            _ = io.closing.cancelled() => {
                while let Ok(event) = io.outbound.try_recv() {
                    hub.relay(&scope, event).await;
                }
                break;
            }

            event = io.outbound.recv() => match event {
                Some(event) => hub.relay(&scope, event).await,
                None => break,
            },

            frame = subscription.frames.recv() => match frame {
                Some(frame) => {
                    if let Some(event) = decode(&scope, &frame) {
                        if io.inbound.send(event).await.is_err() {
                            debug!(%scope, "Inbound consumer gone");
                        }
                    }
                }
                None => break,
            },
        }
    }

    hub.detach(&scope, subscription.id);
    let _ = io.link.send(LinkState::Closed);
}
