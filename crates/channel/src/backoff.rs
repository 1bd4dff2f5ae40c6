//! Reconnect backoff

use prana_core::ChannelConfig;
use std::time::Duration;

/// Capped exponential delay with symmetric jitter.
///
/// `min(max, base * 2^attempt) * (1 + (random * 2 - 1) * jitter)`, where
/// `random` is in `[0, 1)`.
pub fn backoff_delay_ms(attempt: u32, base_ms: u64, max_ms: u64, jitter: f64, random: f64) -> u64 {
    let exponential = base_ms.saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(max_ms);
    let factor = 1.0 + (random * 2.0 - 1.0) * jitter;
    (capped as f64 * factor).round().max(0.0) as u64
}

/// Reconnect attempt counter
#[derive(Debug, Clone)]
pub struct Backoff {
    base_ms: u64,
    max_ms: u64,
    jitter: f64,
    attempt: u32,
}

impl Backoff {
    /// Backoff using the channel settings
    pub fn from_config(config: &ChannelConfig) -> Self {
        Self {
            base_ms: config.reconnect_base_delay_ms,
            max_ms: config.reconnect_max_delay_ms,
            jitter: config.reconnect_jitter,
            attempt: 0,
        }
    }

    /// Delay before the next attempt; advances the counter
    pub fn next_delay(&mut self) -> Duration {
        let ms = backoff_delay_ms(
            self.attempt,
            self.base_ms,
            self.max_ms,
            self.jitter,
            rand::random::<f64>(),
        );
        self.attempt = self.attempt.saturating_add(1);
        Duration::from_millis(ms)
    }

    /// Attempts since the last successful connection
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Start over after a successful connection
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
