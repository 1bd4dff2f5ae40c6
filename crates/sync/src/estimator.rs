//! Client-side ETA estimator
//!
//! Every period the mirrored trip's ETA drops by a fixed decrement
//! (clamped at zero) and an `eta_update` goes out on the trip session,
//! whether or not the value changed. The first tick fires one full period
//! after start.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use prana_channel::{ChannelError, SessionPublisher};
use prana_core::EstimatorConfig;
use prana_domain::{ChannelEvent, EtaBand};

use crate::mirror::TripMirror;

/// Result of one estimator tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    /// ETA decayed to `eta`; `crossed` is the band entered on this tick
    Decayed {
        /// Remaining minutes after the tick
        eta: f64,
        /// Newly entered band, if the tick crossed a threshold
        crossed: Option<EtaBand>,
    },
    /// Trip is terminal
    Terminal,
    /// No trip is mirrored
    Missing,
}

/// Why an estimator task stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatorExit {
    /// The trip arrived
    Arrived,
    /// Stopped by its owner
    Cancelled,
    /// The mirrored trip disappeared
    TripGone,
    /// The session it publishes on was closed
    ChannelClosed,
}

/// Periodic ETA decay
#[derive(Debug, Clone)]
pub struct EtaEstimator {
    period: Duration,
    decrement: f64,
}

impl EtaEstimator {
    /// Estimator with the configured period and decrement
    pub fn new(config: &EstimatorConfig) -> Self {
        Self {
            period: config.period(),
            decrement: config.decrement_minutes,
        }
    }

    /// Tick period
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Apply one decrement to the mirrored trip
    pub fn tick(&self, mirror: &TripMirror) -> Tick {
        let outcome = mirror.update(|trip| {
            let before = trip.band();
            trip.decay_eta(self.decrement).map(|eta| {
                let after = trip.band();
                Tick::Decayed {
                    eta,
                    crossed: (after != before).then_some(after),
                }
            })
        });
        match outcome {
            Some(Some(tick)) => tick,
            Some(None) => Tick::Terminal,
            None => Tick::Missing,
        }
    }

    /// Run the estimator for `mirror`, publishing on `publisher`
    pub fn spawn(&self, mirror: TripMirror, publisher: SessionPublisher) -> EstimatorHandle {
        let cancel = CancellationToken::new();
        let estimator = self.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move { estimator.run(mirror, publisher, token).await });
        EstimatorHandle {
            cancel,
            task: Some(task),
        }
    }

    async fn run(
        &self,
        mirror: TripMirror,
        publisher: SessionPublisher,
        cancel: CancellationToken,
    ) -> EstimatorExit {
        let scope = publisher.scope();
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(%scope, period = ?self.period, decrement = self.decrement, "Estimator started");

        let exit = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break EstimatorExit::Cancelled,
                _ = publisher.closed() => break EstimatorExit::ChannelClosed,
                _ = ticker.tick() => match self.tick(&mirror) {
                    Tick::Decayed { eta, crossed } => {
                        if let Some(band) = crossed {
                            info!(%scope, eta, ?band, "ETA crossed into new band");
                        }
                        match publisher.publish(ChannelEvent::eta_update(eta)) {
                            Ok(()) => {}
                            Err(ChannelError::Backpressure(depth)) => {
                                warn!(%scope, eta, depth, "Outbound queue full, ETA update dropped");
                            }
                            Err(_) => break EstimatorExit::ChannelClosed,
                        }
                    }
                    Tick::Terminal => break EstimatorExit::Arrived,
                    Tick::Missing => break EstimatorExit::TripGone,
                },
            }
        };
        debug!(%scope, ?exit, "Estimator stopped");
        exit
    }
}

/// Owner's handle on a running estimator. Dropping it cancels the task.
#[derive(Debug)]
pub struct EstimatorHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<EstimatorExit>>,
}

impl EstimatorHandle {
    /// Ask the task to stop without waiting
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the task has exited
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stop the task and wait for it
    pub async fn stop(mut self) -> EstimatorExit {
        self.cancel.cancel();
        match self.task.take() {
            Some(task) => task.await.unwrap_or(EstimatorExit::Cancelled),
            None => EstimatorExit::Cancelled,
        }
    }

    /// Wait for the task to exit on its own
    pub async fn join(mut self) -> EstimatorExit {
        match self.task.take() {
            Some(task) => task.await.unwrap_or(EstimatorExit::Cancelled),
            None => EstimatorExit::Cancelled,
        }
    }
}

impl Drop for EstimatorHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
