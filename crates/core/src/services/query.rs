//! Query resolver service.
//!
//! Validates request arguments, delegates to the [`TelemetrySource`] and
//! shapes the results into response envelopes. Arguments are validated
//! before the source is touched, so a rejected request costs nothing
//! upstream. The service is stateless and safe to share across tasks.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument};

use crate::error::{QueryError, QueryResult, SourceError};
use crate::metrics::{QueryTimer, record_query};
use crate::models::{BlockInfo, BlockSummary, EthTransfer, MetricKey, TimeseriesPoint, TimeseriesScale};
use crate::ports::{PageCursor, TRANSFERS_SCOPE, TelemetrySource, TimeseriesQuery, timeseries_scope};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the query service.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Largest `limit` a client may request.
    pub max_page_size: u32,
    /// `limit` used when the client omits it.
    pub default_page_size: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_page_size: 1000,
            default_page_size: 10,
        }
    }
}

// =============================================================================
// Request / Response Envelopes
// =============================================================================

/// Arguments of a timeseries query, as received from the client.
#[derive(Debug, Clone, Default)]
pub struct TimeseriesRequest {
    pub key: Option<String>,
    pub scale: Option<TimeseriesScale>,
    pub from_t: Option<i64>,
    pub to_t: Option<i64>,
    pub next_key: Option<String>,
}

/// One page of a timeseries.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeseriesResponse {
    pub items: Vec<TimeseriesPoint>,
    pub next_key: Option<String>,
}

/// One page of ETH transfers.
#[derive(Debug, Clone, PartialEq)]
pub struct TransfersResponse {
    pub transfers: Vec<EthTransfer>,
    pub next_key: Option<String>,
}

// =============================================================================
// QueryService
// =============================================================================

/// Resolves read-only telemetry queries.
pub struct QueryService {
    config: QueryConfig,
    source: Arc<dyn TelemetrySource>,
}

impl QueryService {
    pub fn new(config: QueryConfig, source: Arc<dyn TelemetrySource>) -> Self {
        Self { config, source }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Chain head summary.
    #[instrument(skip(self))]
    pub async fn latest_block_info(&self) -> QueryResult<BlockInfo> {
        let _timer = QueryTimer::new("getLatestBlockInfo");
        let result = self.source.latest_block_info().await.map_err(QueryError::from);
        finish("getLatestBlockInfo", result)
    }

    /// Samples of a metric, newest first.
    #[instrument(skip_all, fields(key = ?request.key))]
    pub async fn timeseries(&self, request: TimeseriesRequest) -> QueryResult<TimeseriesResponse> {
        let _timer = QueryTimer::new("getTimeseriesData");
        let result = self.resolve_timeseries(request).await;
        finish("getTimeseriesData", result)
    }

    async fn resolve_timeseries(&self, request: TimeseriesRequest) -> QueryResult<TimeseriesResponse> {
        let key = parse_metric_key(request.key.as_deref())?;
        let scope = timeseries_scope(key.as_str());

        validate_time("fromT", request.from_t)?;
        validate_time("toT", request.to_t)?;
        if let (Some(from_t), Some(to_t)) = (request.from_t, request.to_t)
            && from_t > to_t
        {
            return Err(QueryError::validation("fromT", "must not be after toT"));
        }

        let cursor = parse_cursor(&scope, request.next_key.as_deref())?;
        if let Some(cursor) = cursor
            && i64::try_from(cursor.anchor).is_err()
        {
            return Err(QueryError::validation("nextKey", "cursor timestamp out of range"));
        }

        let page = self
            .source
            .timeseries(
                key,
                TimeseriesQuery {
                    scale: request.scale.unwrap_or_default(),
                    from_t: request.from_t,
                    to_t: request.to_t,
                    cursor,
                },
            )
            .await
            .map_err(cursor_error)?;

        debug!(items = page.items.len(), "Timeseries page resolved");
        Ok(TimeseriesResponse {
            items: page.items,
            next_key: page.next.map(|c| c.encode(&scope)),
        })
    }

    /// `limit` consecutive blocks from `from_block`.
    ///
    /// Without `from_block`, returns the most recent `limit` blocks.
    #[instrument(skip(self))]
    pub async fn blocks_by_number(
        &self,
        from_block: Option<i64>,
        limit: Option<i64>,
    ) -> QueryResult<Vec<BlockSummary>> {
        let _timer = QueryTimer::new("getBlocksArrayByNumber");
        let result = self.resolve_blocks(from_block, limit).await;
        finish("getBlocksArrayByNumber", result)
    }

    async fn resolve_blocks(
        &self,
        from_block: Option<i64>,
        limit: Option<i64>,
    ) -> QueryResult<Vec<BlockSummary>> {
        let limit = self.validate_limit(limit)?;

        let from_block = match from_block {
            Some(n) if n < 0 => {
                return Err(QueryError::validation("fromBlock", "must not be negative"));
            }
            Some(n) => n as u64,
            None => {
                let tip = self.source.latest_block_info().await?.number;
                (tip + 1).saturating_sub(limit as u64)
            }
        };

        Ok(self.source.blocks_by_range(from_block, limit).await?)
    }

    /// Current server time, in milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> String {
        record_query("getTimestamp", None);
        Utc::now().timestamp_millis().to_string()
    }

    /// ETH transfers, newest first.
    #[instrument(skip(self, next_key))]
    pub async fn eth_transfers(
        &self,
        limit: Option<i64>,
        next_key: Option<&str>,
    ) -> QueryResult<TransfersResponse> {
        let _timer = QueryTimer::new("getAllEthTransfers");
        let result = self.resolve_transfers(limit, next_key).await;
        finish("getAllEthTransfers", result)
    }

    async fn resolve_transfers(
        &self,
        limit: Option<i64>,
        next_key: Option<&str>,
    ) -> QueryResult<TransfersResponse> {
        let limit = self.validate_limit(limit)?;
        let cursor = parse_cursor(TRANSFERS_SCOPE, next_key)?;

        let page = self
            .source
            .transfers(limit, cursor)
            .await
            .map_err(cursor_error)?;

        Ok(TransfersResponse {
            transfers: page.items,
            next_key: page.next.map(|c| c.encode(TRANSFERS_SCOPE)),
        })
    }

    /// Validate and normalize a `limit` argument.
    fn validate_limit(&self, limit: Option<i64>) -> QueryResult<u32> {
        let limit = limit.unwrap_or(self.config.default_page_size as i64);
        if limit < 1 {
            return Err(QueryError::validation("limit", "must be at least 1"));
        }
        if limit > self.config.max_page_size as i64 {
            return Err(QueryError::validation(
                "limit",
                format!("must be at most {}", self.config.max_page_size),
            ));
        }
        Ok(limit as u32)
    }
}

// -----------------------------------------------------------------------------
// Helpers & Validation
// -----------------------------------------------------------------------------

fn finish<T>(operation: &'static str, result: QueryResult<T>) -> QueryResult<T> {
    record_query(operation, result.as_ref().err().map(QueryError::code));
    if let Err(e) = &result {
        debug!(operation, code = e.code(), error = %e, "Query rejected");
    }
    result
}

/// Maximum length for a metric key argument.
const MAX_KEY_LENGTH: usize = 64;

fn parse_metric_key(key: Option<&str>) -> QueryResult<MetricKey> {
    let key = key.ok_or_else(|| QueryError::validation("key", "is required"))?;
    if key.is_empty() || key.len() > MAX_KEY_LENGTH {
        return Err(QueryError::validation(
            "key",
            format!("must be 1 to {} characters", MAX_KEY_LENGTH),
        ));
    }
    key.parse::<MetricKey>()
        .map_err(|unknown| SourceError::UnknownMetric(unknown).into())
}

fn parse_cursor(scope: &str, next_key: Option<&str>) -> QueryResult<Option<PageCursor>> {
    let Some(token) = next_key else {
        return Ok(None);
    };

    let cursor = PageCursor::decode(scope, token)
        .map_err(|e| QueryError::validation("nextKey", e.to_string()))?;
    // Sequences never hold more items than their anchor allows.
    if cursor.offset > cursor.anchor {
        return Err(QueryError::validation("nextKey", "cursor offset exceeds its anchor"));
    }
    Ok(Some(cursor))
}

/// A cursor the source cannot place is the caller's mistake.
fn cursor_error(err: SourceError) -> QueryError {
    match err {
        SourceError::InvalidCursor(message) => QueryError::validation("nextKey", message),
        other => other.into(),
    }
}

fn validate_time(field: &'static str, value: Option<i64>) -> QueryResult<()> {
    match value {
        Some(t) if t < 0 => Err(QueryError::validation(field, "must not be negative")),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::SourceResult;
    use crate::models::{BlockRewards, Transfer};
    use crate::ports::Page;

    /// Source returning canned data and counting calls.
    #[derive(Default)]
    struct MockSource {
        calls: AtomicUsize,
        unavailable: bool,
    }

    impl MockSource {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn hit(&self) -> SourceResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.unavailable {
                return Err(SourceError::UpstreamUnavailable("connection refused".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl TelemetrySource for MockSource {
        async fn latest_block_info(&self) -> SourceResult<BlockInfo> {
            self.hit()?;
            Ok(BlockInfo {
                number: 500,
                avg_block_time: 3.6,
                hash_rate: "1".into(),
                difficulty: "2".into(),
            })
        }

        async fn blocks_by_range(&self, from_block: u64, limit: u32) -> SourceResult<Vec<BlockSummary>> {
            self.hit()?;
            Ok((from_block..from_block + limit as u64)
                .map(|number| BlockSummary {
                    number,
                    miner: "0xabc".into(),
                    tx_count: 1,
                    timestamp: 0,
                    rewards: BlockRewards { total: "0".into() },
                    tx_fail: 0,
                })
                .collect())
        }

        async fn transfers(&self, limit: u32, cursor: Option<PageCursor>) -> SourceResult<Page<EthTransfer>> {
            self.hit()?;
            let cursor = cursor.unwrap_or(PageCursor::new(500, 0));
            if cursor.anchor > 500 {
                return Err(SourceError::InvalidCursor("anchor beyond tip".into()));
            }
            let items = (0..limit as u64)
                .map(|i| EthTransfer {
                    transfer: Transfer {
                        transaction_hash: format!("0x{}", cursor.offset + i),
                        from: "0xa".into(),
                        to: "0xb".into(),
                        block: cursor.anchor - cursor.offset - i,
                        timestamp: 0,
                        tx_fee: "1".into(),
                        status: true,
                    },
                    value: "1".into(),
                })
                .collect();
            Ok(Page::new(items, Some(cursor.advance(limit as u64))))
        }

        async fn timeseries(&self, _key: MetricKey, query: TimeseriesQuery) -> SourceResult<Page<TimeseriesPoint>> {
            self.hit()?;
            let anchor = query.to_t.unwrap_or(6_000) as u64;
            Ok(Page::new(
                vec![TimeseriesPoint {
                    value: "1".into(),
                    timestamp: anchor as i64,
                }],
                Some(PageCursor::new(anchor, 1)),
            ))
        }
    }

    fn service(source: Arc<MockSource>) -> QueryService {
        QueryService::new(QueryConfig::default(), source)
    }

    // Test critique: les limites invalides sont rejetées avant tout appel à la source
    #[tokio::test]
    async fn test_invalid_limit_never_reaches_source() {
        let source = Arc::new(MockSource::default());
        let service = service(source.clone());

        for limit in [0, -1, -100, 1001, i64::MAX] {
            let err = service.blocks_by_number(Some(1), Some(limit)).await.unwrap_err();
            assert!(matches!(err, QueryError::Validation { field: "limit", .. }));

            let err = service.eth_transfers(Some(limit), None).await.unwrap_err();
            assert!(matches!(err, QueryError::Validation { field: "limit", .. }));
        }

        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_blocks_are_consecutive_from_requested_number() {
        let source = Arc::new(MockSource::default());
        let service = service(source.clone());

        for limit in [1, 7, 1000] {
            let blocks = service.blocks_by_number(Some(42), Some(limit)).await.unwrap();
            assert_eq!(blocks.len(), limit as usize);
            for (i, block) in blocks.iter().enumerate() {
                assert_eq!(block.number, 42 + i as u64);
            }
        }
    }

    #[tokio::test]
    async fn test_blocks_default_to_chain_tip() {
        let service = service(Arc::new(MockSource::default()));
        let blocks = service.blocks_by_number(None, Some(5)).await.unwrap();
        let numbers: Vec<u64> = blocks.iter().map(|b| b.number).collect();
        assert_eq!(numbers, vec![496, 497, 498, 499, 500]);
    }

    #[tokio::test]
    async fn test_negative_from_block_rejected() {
        let source = Arc::new(MockSource::default());
        let err = service(source.clone())
            .blocks_by_number(Some(-1), Some(5))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation { field: "fromBlock", .. }));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_transfers_cursor_round_trip_through_next_key() {
        let service = service(Arc::new(MockSource::default()));

        let first = service.eth_transfers(Some(3), None).await.unwrap();
        let next_key = first.next_key.clone().unwrap();
        let second = service.eth_transfers(Some(3), Some(&next_key)).await.unwrap();
        let replay = service.eth_transfers(Some(3), Some(&next_key)).await.unwrap();

        assert_eq!(second, replay);
        let first_blocks: Vec<u64> = first.transfers.iter().map(|t| t.transfer.block).collect();
        let second_blocks: Vec<u64> = second.transfers.iter().map(|t| t.transfer.block).collect();
        assert_eq!(first_blocks, vec![500, 499, 498]);
        assert_eq!(second_blocks, vec![497, 496, 495]);
    }

    #[tokio::test]
    async fn test_bad_cursor_is_validation_error() {
        let source = Arc::new(MockSource::default());
        let service = service(source.clone());

        let err = service.eth_transfers(Some(3), Some("12345")).await.unwrap_err();
        assert!(matches!(err, QueryError::Validation { field: "nextKey", .. }));

        // A timeseries cursor cannot page transfers.
        let ts_key = PageCursor::new(1, 1).encode(&timeseries_scope("GAS_PRICE_MIN"));
        let err = service.eth_transfers(Some(3), Some(&ts_key)).await.unwrap_err();
        assert!(matches!(err, QueryError::Validation { field: "nextKey", .. }));

        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_timeseries_argument_validation() {
        let source = Arc::new(MockSource::default());
        let service = service(source.clone());

        let err = service.timeseries(TimeseriesRequest::default()).await.unwrap_err();
        assert!(matches!(err, QueryError::Validation { field: "key", .. }));

        let err = service
            .timeseries(TimeseriesRequest {
                key: Some("GAS_PRICE_MEDIAN".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_METRIC");

        let err = service
            .timeseries(TimeseriesRequest {
                key: Some("GAS_PRICE_MIN".into()),
                from_t: Some(200),
                to_t: Some(100),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation { field: "fromT", .. }));

        assert_eq!(source.calls(), 0);

        let page = service
            .timeseries(TimeseriesRequest {
                key: Some("GAS_PRICE_MIN".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let next = page.next_key.unwrap();
        assert_eq!(
            PageCursor::decode("timeseries/GAS_PRICE_MIN", &next),
            Ok(PageCursor::new(6_000, 1))
        );
    }

    // Test critique: un curseur forgé ne provoque jamais de débordement arithmétique
    #[tokio::test]
    async fn test_forged_cursor_is_rejected() {
        let source = Arc::new(MockSource::default());
        let service = service(source.clone());

        let offset_past_anchor = PageCursor::new(10, 11).encode(TRANSFERS_SCOPE);
        let err = service
            .eth_transfers(Some(3), Some(&offset_past_anchor))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation { field: "nextKey", .. }));

        let scope = timeseries_scope("GAS_PRICE_MIN");
        let huge_anchor = PageCursor::new(u64::MAX, 0).encode(&scope);
        let err = service
            .timeseries(TimeseriesRequest {
                key: Some("GAS_PRICE_MIN".into()),
                next_key: Some(huge_anchor),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation { field: "nextKey", .. }));
        assert_eq!(source.calls(), 0);

        // The source refuses an anchor it never issued.
        let beyond_tip = PageCursor::new(u64::MAX, 0).encode(TRANSFERS_SCOPE);
        let err = service
            .eth_transfers(Some(3), Some(&beyond_tip))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation { field: "nextKey", .. }));
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    // Test critique: une panne amont est remontée telle quelle, sans réponse partielle
    #[tokio::test]
    async fn test_upstream_failure_is_surfaced() {
        let source = Arc::new(MockSource {
            unavailable: true,
            ..Default::default()
        });
        let service = service(source.clone());

        let err = service.latest_block_info().await.unwrap_err();
        assert_eq!(err.code(), "UPSTREAM_UNAVAILABLE");
        let err = service.eth_transfers(Some(3), None).await.unwrap_err();
        assert_eq!(err.code(), "UPSTREAM_UNAVAILABLE");
        // No silent retry.
        assert_eq!(source.calls(), 2);
    }

    #[test]
    fn test_timestamp_is_millis() {
        let service = service(Arc::new(MockSource::default()));
        let ts: i64 = service.timestamp().parse().unwrap();
        assert!(ts > 1_600_000_000_000);
    }
}
