//! Core functionality shared by every PRANA crate.
//!
//! This crate provides configuration loading, structured logging setup and
//! the foundational error type used by the service binaries.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::{
    ChannelConfig, Config, EstimatorConfig, LoggingConfig, MatchingConfig, RelayConfig,
};
pub use error::{CoreError, Result};
