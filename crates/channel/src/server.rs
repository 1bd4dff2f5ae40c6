//! WebSocket relay server
//!
//! Serves `/ws/trip/{trip_id}` and `/ws/hospital/{hospital_id}`. Each
//! connection is attached to the [`RelayHub`] under the scope named by its
//! path; any other path is refused during the handshake.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use prana_domain::ChannelEvent;

use crate::error::{ChannelError, Result};
use crate::hub::{RelayHub, Subscription};
use crate::scope::ChannelScope;

/// How long open connections get to finish after shutdown is requested
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Accepts subscriber connections and feeds them through a hub
#[derive(Debug)]
pub struct RelayServer {
    hub: Arc<RelayHub>,
}

impl RelayServer {
    /// Server relaying through `hub`
    pub fn new(hub: Arc<RelayHub>) -> Self {
        Self { hub }
    }

    /// Hub shared by all connections
    pub fn hub(&self) -> &Arc<RelayHub> {
        &self.hub
    }

    /// Bind a listener. Port 0 picks a free port.
    pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
        Ok(TcpListener::bind(addr).await?)
    }

    /// Accept connections until `shutdown` is cancelled, then give open
    /// connections a short grace period to close.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        info!("Relay listening on {}", listener.local_addr()?);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        info!("New WebSocket connection from {}", peer_addr);
                        let server = Arc::clone(&self);
                        let token = shutdown.child_token();
                        connections.spawn(async move {
                            if let Err(e) = server.handle_connection(stream, peer_addr, token).await {
                                warn!("WebSocket connection error from {}: {}", peer_addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                },

                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        drop(listener);
        info!(open = connections.len(), "Relay shutting down");
        let drain = async { while connections.join_next().await.is_some() {} };
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            warn!("Connections still open after {:?}, aborting", SHUTDOWN_GRACE);
            connections.abort_all();
        }
        Ok(())
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let mut requested = None;
        let ws = accept_hdr_async(stream, |request: &Request, response: Response| {
            match ChannelScope::parse_path(request.uri().path()) {
                Ok(scope) => {
                    requested = Some(scope);
                    Ok(response)
                }
                Err(e) => {
                    let mut refusal = ErrorResponse::new(Some(e.to_string()));
                    *refusal.status_mut() = StatusCode::NOT_FOUND;
                    Err(refusal)
                }
            }
        })
        .await?;
        let scope = requested.ok_or_else(|| ChannelError::InvalidScope("missing path".to_string()))?;

        let mut subscription = self.hub.attach(scope);
        let result = self.pump(ws, &mut subscription, peer_addr, shutdown).await;
        self.hub.detach(&scope, subscription.id);
        result
    }

    async fn pump(
        &self,
        ws: WebSocketStream<TcpStream>,
        subscription: &mut Subscription,
        peer_addr: SocketAddr,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let scope = subscription.scope;
        let (mut ws_sender, mut ws_receiver) = ws.split();

        let ack = ChannelEvent::Ack {
            message: format!("Subscribed to {scope}"),
        };
        ws_sender.send(Message::Text(serde_json::to_string(&ack)?)).await?;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }

                frame = subscription.frames.recv() => match frame {
                    Some(frame) => ws_sender.send(Message::Text(frame.to_string())).await?,
                    None => break,
                },

                msg = ws_receiver.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ChannelEvent>(&text) {
                            Ok(event) => {
                                debug!(%scope, event = event.kind(), "Received from {}", peer_addr);
                                self.hub.relay(&scope, event).await;
                            }
                            Err(e) => warn!(%scope, error = %e, "Malformed event from {}", peer_addr),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(%scope, "Client {} disconnected", peer_addr);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                },
            }
        }

        Ok(())
    }
}
