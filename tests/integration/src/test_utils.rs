//! Relay fixture for integration tests

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use prana_backend::InMemoryBackend;
use prana_channel::{LinkState, RelayHub, RelayServer, WsConnector};
use prana_core::{ChannelConfig, EstimatorConfig, MatchingConfig};
use prana_domain::{AmbulanceId, ChannelEvent};
use prana_sync::{AmbulanceConsole, DispatchOrchestrator};

/// Estimator period short enough for tests to watch several ticks
pub const FAST_PERIOD_MS: u64 = 100;

/// A relay serving on an ephemeral local port
pub struct TestRelay {
    pub addr: SocketAddr,
    pub backend: Arc<InMemoryBackend>,
    pub hub: Arc<RelayHub>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TestRelay {
    /// Start a relay with the demo hospitals and `matching` settings
    pub async fn start(matching: MatchingConfig) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let backend = Arc::new(InMemoryBackend::with_demo_data(matching));
        let hub = Arc::new(RelayHub::new(backend.clone(), 64));
        let listener = RelayServer::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .expect("Failed to bind relay");
        let addr = listener.local_addr().expect("Failed to read relay address");

        let shutdown = CancellationToken::new();
        let task = serve(hub.clone(), listener, shutdown.clone());

        Self {
            addr,
            backend,
            hub,
            shutdown,
            task: Some(task),
        }
    }

    /// Stop serving and drop every socket connection. Collaborator state
    /// and in-process hub subscribers are kept.
    pub async fn go_down(&mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Serve again on the same address after [`go_down`](Self::go_down)
    pub async fn come_back(&mut self) {
        let listener = RelayServer::bind(self.addr)
            .await
            .expect("Failed to rebind relay");
        self.shutdown = CancellationToken::new();
        self.task = Some(serve(self.hub.clone(), listener, self.shutdown.clone()));
    }

    /// Client settings pointed at this relay
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            endpoint: format!("ws://{}", self.addr),
            connect_timeout_ms: 2_000,
            reconnect_base_delay_ms: 50,
            reconnect_max_delay_ms: 200,
            ..ChannelConfig::default()
        }
    }

    /// Websocket connector pointed at this relay
    pub fn connector(&self) -> Arc<WsConnector> {
        Arc::new(WsConnector::new(self.channel_config()))
    }

    /// Ambulance console for `ambulance_id` with the given estimator period
    pub fn ambulance(&self, ambulance_id: AmbulanceId, period_ms: u64) -> AmbulanceConsole {
        AmbulanceConsole::new(Arc::new(DispatchOrchestrator::new(
            ambulance_id,
            self.backend.clone(),
            self.connector(),
            &EstimatorConfig {
                period_ms,
                decrement_minutes: 0.5,
            },
        )))
    }

    /// Stop accepting and wait for the server task
    pub async fn stop(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn serve(hub: Arc<RelayHub>, listener: TcpListener, shutdown: CancellationToken) -> JoinHandle<()> {
    let server = Arc::new(RelayServer::new(hub));
    tokio::spawn(async move {
        if let Err(e) = server.serve(listener, shutdown).await {
            tracing::error!("Relay stopped with error: {}", e);
        }
    })
}

/// Wait until `link` reports a state matching `wanted`
pub async fn expect_link(link: &mut watch::Receiver<LinkState>, wanted: impl Fn(&LinkState) -> bool) {
    tokio::time::timeout(Duration::from_secs(5), link.wait_for(|state| wanted(state)))
        .await
        .expect("timed out waiting for link state")
        .expect("session dropped its link");
}

/// Next event matching `wanted`, or panic after two seconds
pub async fn expect_event(
    events: &mut mpsc::Receiver<ChannelEvent>,
    mut wanted: impl FnMut(&ChannelEvent) -> bool,
) -> ChannelEvent {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Some(event) if wanted(&event) => return event,
                Some(_) => continue,
                None => panic!("event stream closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Assert no event matching `unwanted` shows up within `window`
pub async fn expect_silence(
    events: &mut mpsc::Receiver<ChannelEvent>,
    window: Duration,
    mut unwanted: impl FnMut(&ChannelEvent) -> bool,
) {
    let deadline = tokio::time::Instant::now() + window;
    loop {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Err(_) => return,
            Ok(None) => return,
            Ok(Some(event)) => assert!(!unwanted(&event), "unexpected event: {event:?}"),
        }
    }
}
