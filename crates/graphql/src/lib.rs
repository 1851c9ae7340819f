//! GraphQL API gateway for Pulse.
//!
//! Exposes the query resolvers and the push subscriptions of `pulse-core`
//! over HTTP and websocket.
//!
//! ```ignore
//! use pulse_graphql::{ServerConfig, build_schema, serve_with_shutdown};
//!
//! let schema = build_schema(query_service, sessions);
//! serve_with_shutdown(schema, ServerConfig::default(), shutdown).await?;
//! ```

mod schema;
mod server;
mod types;

pub use schema::{
    MAX_QUERY_COMPLEXITY, MAX_QUERY_DEPTH, QueryRoot, SubscriptionRoot, build_schema,
    schema_builder,
};
pub use server::{ServerConfig, router, serve_with_shutdown};
pub use types::PulseSchema;
