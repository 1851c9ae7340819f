//! Core domain layer for the Pulse telemetry gateway.
//!
//! This crate contains the domain models, port traits (interfaces), and
//! services of the gateway. It follows hexagonal architecture principles:
//! this is the innermost layer, with no dependency on HTTP, GraphQL or any
//! concrete data source.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       pulse (binary)                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │        pulse-graphql           │        pulse-source        │
//! │    (API gateway, axum)         │  (synthetic, HTTP upstream)│
//! ├────────────────────────────────┴────────────────────────────┤
//! │                     pulse-core  ← YOU ARE HERE              │
//! │               (models, ports, services)                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`models`] - Domain models (BlockSummary, Transfer, TimeseriesPoint, ...)
//! - [`ports`] - Interface traits for adapters to implement, and pagination
//! - [`services`] - Query resolution, event hub, sessions, tick source
//! - [`error`] - Domain error types
//! - [`metrics`] - Prometheus metrics definitions
//!
//! # Key Concepts
//!
//! ## Request/response path
//!
//! [`services::QueryService`] validates arguments and calls a
//! [`ports::TelemetrySource`]. It holds no mutable state.
//!
//! ## Push path
//!
//! 1. A producer ([`services::TickSource`]) publishes to the [`services::EventHub`]
//! 2. The hub enqueues the event on every matching subscriber's bounded queue
//! 3. [`services::SessionManager`] owns each subscriber as a session and
//!    exposes its queue as a stream to the transport
//! 4. Dropping the stream (or an admin close) releases the hub subscription

pub mod error;
pub mod metrics;
pub mod models;
pub mod ports;
pub mod services;
