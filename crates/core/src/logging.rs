//! Structured logging infrastructure for PRANA.
//!
//! This module provides centralized logging initialization with support
//! for structured JSON output and environment-based configuration.

use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

/// Default filter directive used when neither `RUST_LOG` nor config supply one.
pub const DEFAULT_FILTER: &str = "info";

fn build_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Output layer for `config`: human-readable by default, JSON lines for
/// log aggregation when `json` is set.
fn fmt_layer<S>(config: &LoggingConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = fmt::layer().with_target(true).with_thread_ids(true);
    if config.json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

/// Initialize logging from the `[logging]` config section.
///
/// `RUST_LOG` still wins over the configured filter. Returns `false` when a
/// global subscriber was already installed, which leaves the existing one
/// in place.
///
/// # Example
/// ```no_run
/// use prana_core::{logging, LoggingConfig};
///
/// logging::init_from_config(&LoggingConfig::default());
/// tracing::info!("Relay started");
/// ```
pub fn init_from_config(config: &LoggingConfig) -> bool {
    tracing_subscriber::registry()
        .with(build_filter(&config.filter))
        .with(fmt_layer(config))
        .try_init()
        .is_ok()
}
