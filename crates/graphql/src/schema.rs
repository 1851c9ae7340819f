//! GraphQL schema definition.
//!
//! Query resolvers delegate to [`QueryService`]; subscription resolvers open
//! a session on the [`SessionManager`] and stream its events.

use std::sync::Arc;

use async_graphql::{
    Context, EmptyMutation, Error, ErrorExtensions, Object, Result, Schema, SchemaBuilder,
    Subscription,
};
use futures::{Stream, StreamExt};
use tracing::debug;

use pulse_core::error::{QueryError, SessionError};
use pulse_core::models::{HubEvent, Topic};
use pulse_core::services::{QueryService, SessionManager, SessionStream, TimeseriesRequest};

use crate::types::{
    BlockInfo, BlockSummary, EthTransfers, PulseSchema, TimeseriesResponse, TimeseriesScale,
};

// -----------------------------------------------------------------------------
// Schema Configuration
// -----------------------------------------------------------------------------

/// Maximum query depth to prevent deeply nested queries (DoS protection).
/// Note: GraphQL introspection requires depth ~13, so we use 15 to allow it.
pub const MAX_QUERY_DEPTH: usize = 15;

/// Maximum query complexity score (DoS protection).
pub const MAX_QUERY_COMPLEXITY: usize = 500;

// -----------------------------------------------------------------------------
// Schema Builder
// -----------------------------------------------------------------------------

/// Build the gateway schema with depth and complexity limits.
pub fn build_schema(query: Arc<QueryService>, sessions: SessionManager) -> PulseSchema {
    schema_builder(query, sessions)
        .limit_depth(MAX_QUERY_DEPTH)
        .limit_complexity(MAX_QUERY_COMPLEXITY)
        .finish()
}

/// Create a schema builder with the services as context data.
///
/// Remember to call `.limit_depth()` and `.limit_complexity()` before `.finish()`.
pub fn schema_builder(
    query: Arc<QueryService>,
    sessions: SessionManager,
) -> SchemaBuilder<QueryRoot, EmptyMutation, SubscriptionRoot> {
    Schema::build(QueryRoot, EmptyMutation, SubscriptionRoot)
        .data(query)
        .data(sessions)
        .extension(async_graphql::extensions::Tracing)
}

// -----------------------------------------------------------------------------
// Query
// -----------------------------------------------------------------------------

#[derive(Default)]
pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Summary of the chain head.
    async fn get_latest_block_info<'ctx>(&self, ctx: &Context<'ctx>) -> Result<BlockInfo> {
        let service = ctx.data::<Arc<QueryService>>()?;

        let info = service.latest_block_info().await.map_err(query_error)?;
        Ok(info.into())
    }

    /// Samples of a metric, newest first.
    async fn get_timeseries_data<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        key: Option<String>,
        scale: Option<TimeseriesScale>,
        from_t: Option<i64>,
        to_t: Option<i64>,
        next_key: Option<String>,
    ) -> Result<TimeseriesResponse> {
        let service = ctx.data::<Arc<QueryService>>()?;

        let request = TimeseriesRequest {
            key,
            scale: scale.map(Into::into),
            from_t,
            to_t,
            next_key,
        };
        let response = service.timeseries(request).await.map_err(query_error)?;
        Ok(response.into())
    }

    /// `limit` consecutive blocks starting at `fromBlock`.
    async fn get_blocks_array_by_number<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        from_block: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Vec<BlockSummary>> {
        let service = ctx.data::<Arc<QueryService>>()?;

        let blocks = service
            .blocks_by_number(from_block, limit)
            .await
            .map_err(query_error)?;
        Ok(blocks.into_iter().map(BlockSummary::from).collect())
    }

    /// Server time in milliseconds since the Unix epoch.
    async fn get_timestamp<'ctx>(&self, ctx: &Context<'ctx>) -> Result<String> {
        let service = ctx.data::<Arc<QueryService>>()?;
        Ok(service.timestamp())
    }

    /// ETH transfers, newest first.
    async fn get_all_eth_transfers<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        limit: Option<i64>,
        next_key: Option<String>,
    ) -> Result<EthTransfers> {
        let service = ctx.data::<Arc<QueryService>>()?;

        let page = service
            .eth_transfers(limit, next_key.as_deref())
            .await
            .map_err(query_error)?;
        Ok(page.into())
    }
}

// -----------------------------------------------------------------------------
// Subscription
// -----------------------------------------------------------------------------

#[derive(Default)]
pub struct SubscriptionRoot;

#[Subscription]
impl SubscriptionRoot {
    /// Counter value, pushed on every tick.
    async fn number_incremented<'a>(
        &self,
        ctx: &Context<'a>,
    ) -> Result<impl Stream<Item = i64> + 'a + use<'a>> {
        let stream = open_session(ctx, Topic::CounterTick)?;

        Ok(stream.filter_map(|event| async move {
            match event {
                HubEvent::CounterTick(value) => Some(value as i64),
                _ => None,
            }
        }))
    }

    /// Newly announced blocks.
    async fn new_block_feed<'a>(
        &self,
        ctx: &Context<'a>,
    ) -> Result<impl Stream<Item = BlockSummary> + 'a + use<'a>> {
        let stream = open_session(ctx, Topic::NewBlock)?;

        Ok(stream.filter_map(|event| async move {
            match event {
                HubEvent::NewBlock(block) => Some(BlockSummary::from(block)),
                _ => None,
            }
        }))
    }
}

// -----------------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------------

/// One session per subscription field. It closes when the stream is dropped.
fn open_session(ctx: &Context<'_>, topic: Topic) -> Result<SessionStream> {
    let sessions = ctx.data::<SessionManager>()?;

    let stream = sessions.open(&[topic]).map_err(session_error)?;
    debug!(session = stream.id(), topic = %topic, "Subscription opened");
    Ok(stream)
}

/// Map a resolver error to a GraphQL error carrying `code` (and `field`).
fn query_error(err: QueryError) -> Error {
    Error::new(err.to_string()).extend_with(|_, ext| {
        ext.set("code", err.code());
        if let QueryError::Validation { field, .. } = &err {
            ext.set("field", *field);
        }
    })
}

fn session_error(err: SessionError) -> Error {
    Error::new(err.to_string()).extend_with(|_, ext| ext.set("code", "SUBSCRIPTION_UNAVAILABLE"))
}

#[cfg(test)]
mod tests {
    use pulse_core::error::{HubError, SourceError};

    use super::*;

    fn code_of(err: &Error) -> Option<String> {
        let value = err.extensions.as_ref()?.get("code")?;
        match value {
            async_graphql::Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    // Tests de mapping critiques - les clients se basent sur les codes

    #[test]
    fn test_validation_error_carries_code_and_field() {
        let err = query_error(QueryError::validation("limit", "must be at least 1"));

        assert_eq!(code_of(&err).as_deref(), Some("VALIDATION_ERROR"));
        let field = err.extensions.as_ref().and_then(|e| e.get("field")).cloned();
        assert_eq!(field, Some(async_graphql::Value::String("limit".into())));
        assert!(err.message.contains("limit"));
    }

    #[test]
    fn test_source_errors_keep_their_code() {
        let cases = [
            (SourceError::UnknownMetric("X".into()), "UNKNOWN_METRIC"),
            (SourceError::InvalidRange("r".into()), "INVALID_RANGE"),
            (SourceError::UpstreamUnavailable("down".into()), "UPSTREAM_UNAVAILABLE"),
            (SourceError::InvalidResponse("bad".into()), "INTERNAL"),
            (SourceError::InvalidCursor("past tip".into()), "VALIDATION_ERROR"),
        ];

        for (source, expected) in cases {
            let err = query_error(QueryError::from(source));
            assert_eq!(code_of(&err).as_deref(), Some(expected));
            assert!(err.extensions.as_ref().and_then(|e| e.get("field")).is_none());
        }
    }

    #[test]
    fn test_session_error_code() {
        let err = session_error(SessionError::Hub(HubError::Closed));
        assert_eq!(code_of(&err).as_deref(), Some("SUBSCRIPTION_UNAVAILABLE"));
    }
}
