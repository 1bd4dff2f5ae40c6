//! Configuration management for PRANA.
//!
//! Every section has defaults, so a config file only needs the keys it
//! overrides.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{CoreError, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Channel relay server
    pub relay: RelayConfig,
    /// Client-side channel sessions
    pub channel: ChannelConfig,
    /// ETA estimator
    pub estimator: EstimatorConfig,
    /// Reference matching collaborator
    pub matching: MatchingConfig,
    /// Logging output
    pub logging: LoggingConfig,
}

/// Relay server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address the relay binds to
    pub listen_addr: SocketAddr,
    /// Per-subscriber outbound queue depth
    pub subscriber_buffer: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            subscriber_buffer: 256,
        }
    }
}

/// Client session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Base websocket URL of the relay, e.g. `ws://127.0.0.1:8000`
    pub endpoint: String,
    /// How long `open` waits for the first successful connection
    pub connect_timeout_ms: u64,
    /// First reconnect delay
    pub reconnect_base_delay_ms: u64,
    /// Reconnect delay cap
    pub reconnect_max_delay_ms: u64,
    /// Jitter applied on top of the backoff (0.0 - 1.0)
    pub reconnect_jitter: f64,
    /// Events queued while the link is down
    pub outbound_buffer: usize,
    /// Inbound events buffered before the consumer reads them
    pub inbound_buffer: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:8000".to_string(),
            connect_timeout_ms: 5_000,
            reconnect_base_delay_ms: 250,
            reconnect_max_delay_ms: 10_000,
            reconnect_jitter: 0.2,
            outbound_buffer: 64,
            inbound_buffer: 64,
        }
    }
}

impl ChannelConfig {
    /// Connect timeout as a [`Duration`]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// ETA estimator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Tick period
    pub period_ms: u64,
    /// Minutes subtracted per tick
    pub decrement_minutes: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            period_ms: 30_000,
            decrement_minutes: 0.5,
        }
    }
}

impl EstimatorConfig {
    /// Tick period as a [`Duration`]
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

/// Reference matching collaborator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Number of candidates returned by a ranking
    pub max_candidates: usize,
    /// Assumed average ambulance speed for straight-line estimates
    pub average_speed_kmh: f64,
    /// Multiplier applied to the ETA when signal priority is granted
    pub priority_eta_factor: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            max_candidates: 3,
            average_speed_kmh: 40.0,
            priority_eta_factor: 0.8,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json: false,
            filter: crate::logging::DEFAULT_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Load and validate a TOML config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Default configuration matching the reference deployment
    pub fn default_config() -> Self {
        Self::default()
    }

    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.estimator.period_ms == 0 {
            return Err(invalid("estimator.period_ms", "must be greater than zero"));
        }
        let decrement = self.estimator.decrement_minutes;
        if !decrement.is_finite() || decrement < 0.0 {
            return Err(invalid(
                "estimator.decrement_minutes",
                format!("must be a non-negative number, got {decrement}"),
            ));
        }
        if !(self.channel.endpoint.starts_with("ws://") || self.channel.endpoint.starts_with("wss://")) {
            return Err(invalid(
                "channel.endpoint",
                format!("expected a ws:// or wss:// URL, got {}", self.channel.endpoint),
            ));
        }
        if self.channel.outbound_buffer == 0 || self.channel.inbound_buffer == 0 {
            return Err(invalid("channel", "buffers must hold at least one event"));
        }
        if !(0.0..=1.0).contains(&self.channel.reconnect_jitter) {
            return Err(invalid("channel.reconnect_jitter", "must be within 0.0 - 1.0"));
        }
        if self.channel.reconnect_base_delay_ms > self.channel.reconnect_max_delay_ms {
            return Err(invalid(
                "channel.reconnect_base_delay_ms",
                "must not exceed reconnect_max_delay_ms",
            ));
        }
        if self.relay.subscriber_buffer == 0 {
            return Err(invalid("relay.subscriber_buffer", "must be greater than zero"));
        }
        let factor = self.matching.priority_eta_factor;
        if !factor.is_finite() || factor < 0.0 {
            return Err(invalid(
                "matching.priority_eta_factor",
                format!("must be a non-negative number, got {factor}"),
            ));
        }
        let speed = self.matching.average_speed_kmh;
        if !speed.is_finite() || speed <= 0.0 {
            return Err(invalid("matching.average_speed_kmh", "must be positive"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> CoreError {
    CoreError::InvalidConfig {
        field,
        reason: reason.into(),
    }
}
