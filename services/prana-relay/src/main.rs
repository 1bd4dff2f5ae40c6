use anyhow::{bail, Context};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use prana_backend::InMemoryBackend;
use prana_channel::{RelayHub, RelayServer};
use prana_core::{logging, Config};

const RELAY_PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
struct RelayVersionHandshake {
    version: &'static str,
    protocol_version: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|arg| arg == "--version-json") {
        let handshake = RelayVersionHandshake {
            version: env!("CARGO_PKG_VERSION"),
            protocol_version: RELAY_PROTOCOL_VERSION,
        };
        println!("{}", serde_json::to_string(&handshake)?);
        return Ok(());
    }

    let config = match parse_config_path(&args)? {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default_config(),
    };
    config.validate().context("invalid config")?;
    logging::init_from_config(&config.logging);

    let backend = Arc::new(InMemoryBackend::with_demo_data(config.matching.clone()));
    let hub = Arc::new(RelayHub::new(backend, config.relay.subscriber_buffer));
    let server = Arc::new(RelayServer::new(hub));
    let listener = RelayServer::bind(config.relay.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.relay.listen_addr))?;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
        }
        trigger.cancel();
    });

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.relay.listen_addr,
        "PRANA relay starting"
    );
    server.serve(listener, shutdown).await?;
    info!("PRANA relay stopped");
    Ok(())
}

/// `--config <path>` is optional; built-in defaults apply without it
fn parse_config_path(args: &[String]) -> anyhow::Result<Option<PathBuf>> {
    let mut args_iter = args.iter();
    while let Some(arg) = args_iter.next() {
        if arg == "--config" {
            return match args_iter.next() {
                Some(path) => Ok(Some(PathBuf::from(path))),
                None => bail!("--config was provided without a path"),
            };
        }
    }
    Ok(None)
}
