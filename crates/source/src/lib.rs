//! Telemetry data source adapters for Pulse.
//!
//! This crate implements the [`TelemetrySource`] port from `pulse-core`.
//!
//! # Adapters
//!
//! - [`SyntheticSource`] - deterministic in-process data, used when no
//!   upstream is configured. The head advances with wall-clock time.
//! - [`HttpSource`] - JSON client for an upstream telemetry service.
//!
//! # Usage
//!
//! ```ignore
//! use pulse_source::{HttpSource, HttpSourceConfig};
//!
//! let config = HttpSourceConfig::new("http://indexer:8080/api/".parse()?);
//! let source = HttpSource::new(config)?;
//! let info = source.latest_block_info().await?;
//! ```
//!
//! Both adapters guarantee that the reported head never goes backwards
//! within one process.
//!
//! [`TelemetrySource`]: pulse_core::ports::TelemetrySource

mod http;
mod synthetic;

pub use http::{HttpSource, HttpSourceConfig};
pub use synthetic::{SyntheticConfig, SyntheticSource};
