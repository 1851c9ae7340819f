//! Port trait for the telemetry data source.
//!
//! This trait defines the interface for reading blocks, transfers and
//! metrics from whatever backs the gateway (indexer, database, cache).
//! Implementations live in the infrastructure layer (e.g., `pulse-source`).

use async_trait::async_trait;

use crate::error::SourceResult;
use crate::models::{BlockInfo, BlockSummary, EthTransfer, MetricKey, TimeseriesPoint, TimeseriesScale};

use super::pagination::{Page, PageCursor};

/// Time window and resume position of a timeseries read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeseriesQuery {
    pub scale: TimeseriesScale,
    /// Oldest timestamp to include (unix seconds, inclusive).
    pub from_t: Option<i64>,
    /// Newest timestamp to include (unix seconds, inclusive).
    pub to_t: Option<i64>,
    pub cursor: Option<PageCursor>,
}

/// Port trait for telemetry reads.
///
/// All reads are side-effect free from the caller's point of view.
/// Block numbers reported by [`TelemetrySource::latest_block_info`] never
/// go backwards across calls, even when the adapter caches.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Current chain head summary.
    async fn latest_block_info(&self) -> SourceResult<BlockInfo>;

    /// `limit` consecutive blocks starting at `from_block`.
    ///
    /// Fails with `InvalidRange` if `limit` is zero or above the adapter's
    /// maximum range.
    async fn blocks_by_range(&self, from_block: u64, limit: u32) -> SourceResult<Vec<BlockSummary>>;

    /// ETH transfers, newest first.
    async fn transfers(
        &self,
        limit: u32,
        cursor: Option<PageCursor>,
    ) -> SourceResult<Page<EthTransfer>>;

    /// Samples of `key`, newest first.
    ///
    /// Fails with `UnknownMetric` if the source does not serve `key`.
    async fn timeseries(
        &self,
        key: MetricKey,
        query: TimeseriesQuery,
    ) -> SourceResult<Page<TimeseriesPoint>>;
}
