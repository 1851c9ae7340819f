//! Synthetic telemetry source.
//!
//! Generates deterministic block, transfer and metric data from a clock,
//! with no upstream. Block `n` always has the same contents, the chain tip
//! advances one block per `block_interval`, and every paginated sequence is
//! anchored so that following cursors never repeats an item.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tracing::trace;

use pulse_core::error::{SourceError, SourceResult};
use pulse_core::models::{
    BlockInfo, BlockRewards, BlockSummary, EthTransfer, MetricKey, TimeseriesPoint, Transfer,
};
use pulse_core::ports::{Page, PageCursor, TelemetrySource, TimeseriesQuery};
use pulse_core::services::ticker::{
    BASE_BLOCK_OFFSET, PLACEHOLDER_MINER, PLACEHOLDER_REWARD, PLACEHOLDER_TX_COUNT,
    PLACEHOLDER_TX_FAIL,
};

const HASH_RATE: &str = "1234000000000";
const DIFFICULTY: &str = "123000000000";
const TRANSFER_FROM: &str = "0x6dfc34609a05bc22319fa4cce1d1e2929548c0d7";
const TRANSFER_TO: &str = "0x141b63a74da7503eb029491be0a74dd351a0d446";
const TRANSFER_FEE: &str = "1234000000000000";
const TRANSFER_VALUE: &str = "1230000000000000000";

/// Configuration for the synthetic source.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Chain tip when the source starts.
    pub base_block: u64,
    /// Time between two synthetic blocks.
    pub block_interval: Duration,
    /// Average block time reported in `BlockInfo`.
    pub avg_block_time: f64,
    /// Largest block range served in one call.
    pub max_range: u32,
    /// Points per timeseries page.
    pub points_per_page: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            base_block: BASE_BLOCK_OFFSET,
            block_interval: Duration::from_secs(1),
            avg_block_time: 3.6,
            max_range: 5_000,
            points_per_page: 10,
        }
    }
}

/// Value reported for every sample of `key`.
fn metric_value(key: MetricKey) -> &'static str {
    match key {
        MetricKey::GasPriceMin => "12300000000",
        MetricKey::GasPriceMax => "523000000000",
        MetricKey::GasPriceAvg => "22300000000",
        MetricKey::TxCountTotal => "523",
        MetricKey::PendingTxCountTotal => "2230",
    }
}

/// Deterministic in-process [`TelemetrySource`].
pub struct SyntheticSource {
    config: SyntheticConfig,
    started: Instant,
    /// Wall clock (unix millis) of `base_block`.
    epoch_ms: i64,
    high_water: AtomicU64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        let high_water = AtomicU64::new(config.base_block);
        Self {
            config,
            started: Instant::now(),
            epoch_ms: Utc::now().timestamp_millis(),
            high_water,
        }
    }

    /// Current chain tip. Never decreases.
    pub fn tip(&self) -> u64 {
        let interval_ms = self.config.block_interval.as_millis().max(1);
        let elapsed = (self.started.elapsed().as_millis() / interval_ms) as u64;
        let tip = self.config.base_block + elapsed;
        self.high_water.fetch_max(tip, Ordering::SeqCst).max(tip)
    }

    fn block_timestamp(&self, number: u64) -> i64 {
        let interval_ms = self.config.block_interval.as_millis() as i64;
        let delta = number as i64 - self.config.base_block as i64;
        (self.epoch_ms + delta * interval_ms).div_euclid(1000)
    }

    fn block(&self, number: u64) -> BlockSummary {
        BlockSummary {
            number,
            miner: PLACEHOLDER_MINER.to_string(),
            tx_count: PLACEHOLDER_TX_COUNT,
            timestamp: self.block_timestamp(number),
            rewards: BlockRewards {
                total: PLACEHOLDER_REWARD.to_string(),
            },
            tx_fail: PLACEHOLDER_TX_FAIL,
        }
    }

    fn transfer(&self, block: u64) -> EthTransfer {
        EthTransfer {
            transfer: Transfer {
                transaction_hash: format!("0x{:064x}", block),
                from: TRANSFER_FROM.to_string(),
                to: TRANSFER_TO.to_string(),
                block,
                timestamp: self.block_timestamp(block),
                tx_fee: TRANSFER_FEE.to_string(),
                status: true,
            },
            value: TRANSFER_VALUE.to_string(),
        }
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new(SyntheticConfig::default())
    }
}

#[async_trait]
impl TelemetrySource for SyntheticSource {
    async fn latest_block_info(&self) -> SourceResult<BlockInfo> {
        Ok(BlockInfo {
            number: self.tip(),
            avg_block_time: self.config.avg_block_time,
            hash_rate: HASH_RATE.to_string(),
            difficulty: DIFFICULTY.to_string(),
        })
    }

    async fn blocks_by_range(&self, from_block: u64, limit: u32) -> SourceResult<Vec<BlockSummary>> {
        if limit == 0 {
            return Err(SourceError::InvalidRange("limit must be positive".into()));
        }
        if limit > self.config.max_range {
            return Err(SourceError::InvalidRange(format!(
                "limit {} exceeds maximum range {}",
                limit, self.config.max_range
            )));
        }
        let end = from_block
            .checked_add(limit as u64)
            .ok_or_else(|| SourceError::InvalidRange("block range overflows".into()))?;

        trace!(from_block, limit, "Generating blocks");
        Ok((from_block..end).map(|n| self.block(n)).collect())
    }

    async fn transfers(
        &self,
        limit: u32,
        cursor: Option<PageCursor>,
    ) -> SourceResult<Page<EthTransfer>> {
        // One transfer per block, walking down from the anchor tip.
        let tip = self.tip();
        let cursor = cursor.unwrap_or_else(|| PageCursor::new(tip, 0));
        if cursor.anchor > tip {
            return Err(SourceError::InvalidCursor(format!(
                "anchor {} is beyond the chain tip {}",
                cursor.anchor, tip
            )));
        }
        if cursor.offset > cursor.anchor {
            return Err(SourceError::InvalidCursor(format!(
                "offset {} exceeds anchor {}",
                cursor.offset, cursor.anchor
            )));
        }

        // Blocks `anchor - offset` down to 0 are left.
        let remaining = (cursor.anchor - cursor.offset).saturating_add(1);
        let count = remaining.min(limit as u64);
        let items = (0..count)
            .map(|i| self.transfer(cursor.anchor - cursor.offset - i))
            .collect();

        let next = (count < remaining).then(|| cursor.advance(count));
        Ok(Page::new(items, next))
    }

    async fn timeseries(
        &self,
        key: MetricKey,
        query: TimeseriesQuery,
    ) -> SourceResult<Page<TimeseriesPoint>> {
        let step = query.scale.step_secs();
        let floor = query.from_t.unwrap_or(0).max(0);

        let now = Utc::now().timestamp();

        let (cursor, anchor) = match query.cursor {
            Some(cursor) => {
                let anchor = i64::try_from(cursor.anchor)
                    .ok()
                    .filter(|anchor| *anchor <= now)
                    .ok_or_else(|| {
                        SourceError::InvalidCursor(format!(
                            "anchor {} is not a past timestamp",
                            cursor.anchor
                        ))
                    })?;
                (cursor, anchor)
            }
            None => {
                let newest = query.to_t.map_or(now, |to_t| to_t.min(now));
                if newest < 0 {
                    return Ok(Page::empty());
                }
                let anchor = newest - newest.rem_euclid(step);
                (PageCursor::new(anchor as u64, 0), anchor)
            }
        };

        // `None` when the offset no longer fits in i64 seconds.
        let point_at = |index: u64| -> Option<i64> {
            let back = i64::try_from(index).ok()?.checked_mul(step)?;
            anchor.checked_sub(back)
        };
        let in_window = |index: u64| {
            cursor
                .offset
                .checked_add(index)
                .and_then(&point_at)
                .filter(|ts| *ts >= floor)
        };
        let value = metric_value(key);

        let items: Vec<TimeseriesPoint> = (0..self.config.points_per_page as u64)
            .map_while(&in_window)
            .map(|timestamp| TimeseriesPoint {
                value: value.to_string(),
                timestamp,
            })
            .collect();

        let taken = items.len() as u64;
        let next = in_window(taken).is_some().then(|| cursor.advance(taken));
        Ok(Page::new(items, next))
    }
}

#[cfg(test)]
mod tests {
    use pulse_core::models::TimeseriesScale;

    use super::*;

    /// Source whose tip stays at `base_block` for the duration of a test.
    fn frozen() -> SyntheticSource {
        SyntheticSource::new(SyntheticConfig {
            block_interval: Duration::from_secs(3_600),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_latest_block_info_is_complete() {
        let info = frozen().latest_block_info().await.unwrap();
        assert_eq!(info.number, 100);
        assert_eq!(info.avg_block_time, 3.6);
        assert_eq!(info.hash_rate, HASH_RATE);
        assert_eq!(info.difficulty, DIFFICULTY);
    }

    #[tokio::test]
    async fn test_blocks_by_range_is_consecutive() {
        let source = frozen();
        let blocks = source.blocks_by_range(1_000, 25).await.unwrap();
        assert_eq!(blocks.len(), 25);
        for (i, block) in blocks.iter().enumerate() {
            assert_eq!(block.number, 1_000 + i as u64);
            assert_eq!(block.tx_count, 39);
            assert_eq!(block.tx_fail, 2);
        }
        // Same height, same block.
        assert_eq!(source.blocks_by_range(1_010, 1).await.unwrap()[0], blocks[10]);
    }

    #[tokio::test]
    async fn test_blocks_by_range_rejects_bad_limits() {
        let source = frozen();
        assert!(matches!(
            source.blocks_by_range(1, 0).await,
            Err(SourceError::InvalidRange(_))
        ));
        assert!(matches!(
            source.blocks_by_range(1, 5_001).await,
            Err(SourceError::InvalidRange(_))
        ));
        assert!(matches!(
            source.blocks_by_range(u64::MAX, 2).await,
            Err(SourceError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_tip_advances_and_never_regresses() {
        let source = SyntheticSource::new(SyntheticConfig {
            block_interval: Duration::from_millis(1),
            ..Default::default()
        });
        let first = source.tip();
        std::thread::sleep(Duration::from_millis(5));
        let second = source.tip();
        assert!(second > first);
        assert!(source.tip() >= second);
    }

    // Test critique: suivre les curseurs ne renvoie jamais deux fois le même transfert
    #[tokio::test]
    async fn test_transfers_pages_never_overlap() {
        let source = frozen();
        let mut seen = std::collections::HashSet::new();
        let mut cursor = None;
        let mut pages = 0;

        loop {
            let page = source.transfers(7, cursor).await.unwrap();
            for t in &page.items {
                assert!(seen.insert(t.transfer.transaction_hash.clone()));
            }
            pages += 1;
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        // Blocks 100 down to 0.
        assert_eq!(seen.len(), 101);
        assert_eq!(pages, 15);
    }

    #[tokio::test]
    async fn test_transfers_cursor_replay_is_stable() {
        let source = frozen();
        let first = source.transfers(3, None).await.unwrap();
        let next = first.next.unwrap();

        let a = source.transfers(3, Some(next)).await.unwrap();
        let b = source.transfers(3, Some(next)).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.items[0].transfer.block, 97);
    }

    // Test critique: GAS_PRICE_MIN renvoie 10 points décroissants espacés de 60 secondes
    #[tokio::test]
    async fn test_gas_price_min_minutes() {
        let page = frozen()
            .timeseries(
                MetricKey::GasPriceMin,
                TimeseriesQuery {
                    scale: TimeseriesScale::Minutes,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(page.items.len(), 10);
        for pair in page.items.windows(2) {
            assert_eq!(pair[0].timestamp - pair[1].timestamp, 60);
        }
        assert!(page.items.iter().all(|p| p.value == "12300000000"));
        assert!(page.next.is_some());
    }

    #[tokio::test]
    async fn test_timeseries_window_is_clipped() {
        let source = frozen();
        let query = TimeseriesQuery {
            scale: TimeseriesScale::Hours,
            from_t: Some(7_200),
            to_t: Some(36_000),
            cursor: None,
        };

        let first = source.timeseries(MetricKey::TxCountTotal, query).await.unwrap();
        assert_eq!(first.items.first().unwrap().timestamp, 36_000);
        assert_eq!(first.items.last().unwrap().timestamp, 7_200);
        // 36000 down to 7200 inclusive: 9 points, fits in one page.
        assert_eq!(first.items.len(), 9);
        assert!(first.next.is_none());
    }

    #[tokio::test]
    async fn test_timeseries_pages_continue_where_previous_stopped() {
        let source = frozen();
        let query = TimeseriesQuery {
            scale: TimeseriesScale::Seconds,
            from_t: Some(0),
            to_t: Some(24),
            cursor: None,
        };

        let first = source.timeseries(MetricKey::GasPriceAvg, query).await.unwrap();
        let second = source
            .timeseries(
                MetricKey::GasPriceAvg,
                TimeseriesQuery {
                    cursor: first.next,
                    ..query
                },
            )
            .await
            .unwrap();
        let third = source
            .timeseries(
                MetricKey::GasPriceAvg,
                TimeseriesQuery {
                    cursor: second.next,
                    ..query
                },
            )
            .await
            .unwrap();

        let all: Vec<i64> = [first, second, third.clone()]
            .iter()
            .flat_map(|p| p.items.iter().map(|i| i.timestamp))
            .collect();
        assert_eq!(all, (0..=24).rev().collect::<Vec<i64>>());
        assert!(third.next.is_none());
    }

    // Test critique: un curseur hors de la séquence est refusé sans débordement
    #[tokio::test]
    async fn test_out_of_range_cursors_are_rejected() {
        let source = frozen();

        let beyond_tip = source.transfers(3, Some(PageCursor::new(u64::MAX, 0))).await;
        assert!(matches!(beyond_tip, Err(SourceError::InvalidCursor(_))));

        let past_anchor = source.transfers(3, Some(PageCursor::new(50, 51))).await;
        assert!(matches!(past_anchor, Err(SourceError::InvalidCursor(_))));

        // The last block is still reachable.
        let last = source.transfers(3, Some(PageCursor::new(50, 50))).await.unwrap();
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.items[0].transfer.block, 0);
        assert!(last.next.is_none());

        let huge_anchor = source
            .timeseries(
                MetricKey::GasPriceMin,
                TimeseriesQuery {
                    cursor: Some(PageCursor::new(u64::MAX, 0)),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(huge_anchor, Err(SourceError::InvalidCursor(_))));
    }

    #[tokio::test]
    async fn test_huge_timeseries_offset_ends_the_sequence() {
        let page = frozen()
            .timeseries(
                MetricKey::GasPriceMin,
                TimeseriesQuery {
                    scale: TimeseriesScale::Days,
                    cursor: Some(PageCursor::new(1_700_000_000, 1 << 62)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(page.items.is_empty());
        assert!(page.next.is_none());
    }
}
