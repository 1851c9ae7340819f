//! GraphQL type definitions.
//!
//! Object and field names follow the schema the dashboard front-end was
//! written against (`ETHTransfers`, `TimeseriesData`, camelCase fields).

use async_graphql::{EmptyMutation, Enum, Schema, SimpleObject};

use pulse_core::models::{self, TimeseriesScale as CoreScale};
use pulse_core::services::{TimeseriesResponse as CoreTimeseries, TransfersResponse};

use crate::schema::{QueryRoot, SubscriptionRoot};

/// The gateway schema type.
pub type PulseSchema = Schema<QueryRoot, EmptyMutation, SubscriptionRoot>;

/// Sampling resolution of a timeseries.
#[derive(Enum, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[graphql(rename_items = "lowercase")]
pub enum TimeseriesScale {
    Days,
    Hours,
    #[default]
    Minutes,
    Seconds,
}

impl From<TimeseriesScale> for CoreScale {
    fn from(scale: TimeseriesScale) -> Self {
        match scale {
            TimeseriesScale::Days => CoreScale::Days,
            TimeseriesScale::Hours => CoreScale::Hours,
            TimeseriesScale::Minutes => CoreScale::Minutes,
            TimeseriesScale::Seconds => CoreScale::Seconds,
        }
    }
}

/// Chain head summary.
#[derive(SimpleObject, Debug, Clone)]
pub struct BlockInfo {
    pub number: i64,
    pub avg_block_time: f64,
    pub hash_rate: String,
    pub difficulty: String,
}

impl From<models::BlockInfo> for BlockInfo {
    fn from(b: models::BlockInfo) -> Self {
        Self {
            number: b.number as i64,
            avg_block_time: b.avg_block_time,
            hash_rate: b.hash_rate,
            difficulty: b.difficulty,
        }
    }
}

/// One sample of a metric.
#[derive(SimpleObject, Debug, Clone)]
pub struct TimeseriesData {
    pub value: String,
    pub timestamp: i64,
}

#[derive(SimpleObject, Debug, Clone)]
pub struct TimeseriesResponse {
    pub items: Vec<TimeseriesData>,
    /// Resume token for the next page, absent on the last page.
    pub next_key: Option<String>,
}

impl From<CoreTimeseries> for TimeseriesResponse {
    fn from(r: CoreTimeseries) -> Self {
        Self {
            items: r
                .items
                .into_iter()
                .map(|p| TimeseriesData {
                    value: p.value,
                    timestamp: p.timestamp,
                })
                .collect(),
            next_key: r.next_key,
        }
    }
}

#[derive(SimpleObject, Debug, Clone)]
pub struct BlockRewards {
    pub total: String,
}

/// Block summary, as returned by queries and pushed on `newBlockFeed`.
#[derive(SimpleObject, Debug, Clone)]
pub struct BlockSummary {
    pub number: i64,
    pub miner: String,
    pub tx_count: i32,
    pub timestamp: i64,
    pub rewards: BlockRewards,
    pub tx_fail: i32,
}

impl From<models::BlockSummary> for BlockSummary {
    fn from(b: models::BlockSummary) -> Self {
        Self {
            number: b.number as i64,
            miner: b.miner,
            tx_count: b.tx_count as i32,
            timestamp: b.timestamp,
            rewards: BlockRewards {
                total: b.rewards.total,
            },
            tx_fail: b.tx_fail as i32,
        }
    }
}

#[derive(SimpleObject, Debug, Clone)]
pub struct Transfer {
    pub transaction_hash: String,
    pub from: String,
    pub to: String,
    pub block: i64,
    pub timestamp: i64,
    pub tx_fee: String,
    pub status: bool,
}

#[derive(SimpleObject, Debug, Clone)]
pub struct EthTransfer {
    pub transfer: Transfer,
    pub value: String,
}

impl From<models::EthTransfer> for EthTransfer {
    fn from(e: models::EthTransfer) -> Self {
        let t = e.transfer;
        Self {
            transfer: Transfer {
                transaction_hash: t.transaction_hash,
                from: t.from,
                to: t.to,
                block: t.block as i64,
                timestamp: t.timestamp,
                tx_fee: t.tx_fee,
                status: t.status,
            },
            value: e.value,
        }
    }
}

/// A page of ETH transfers.
#[derive(SimpleObject, Debug, Clone)]
#[graphql(name = "ETHTransfers")]
pub struct EthTransfers {
    pub transfers: Vec<EthTransfer>,
    pub next_key: Option<String>,
}

impl From<TransfersResponse> for EthTransfers {
    fn from(r: TransfersResponse) -> Self {
        Self {
            transfers: r.transfers.into_iter().map(EthTransfer::from).collect(),
            next_key: r.next_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Conversion critique: les numéros de bloc u64 deviennent des Int GraphQL

    #[test]
    fn test_block_summary_conversion() {
        let core = models::BlockSummary {
            number: 101,
            miner: "0xabc".into(),
            tx_count: 39,
            timestamp: 1_700_000_000,
            rewards: models::BlockRewards {
                total: "1".into(),
            },
            tx_fail: 2,
        };

        let block = BlockSummary::from(core);
        assert_eq!(block.number, 101);
        assert_eq!(block.tx_count, 39);
        assert_eq!(block.tx_fail, 2);
        assert_eq!(block.rewards.total, "1");
    }

    #[test]
    fn test_scale_mapping() {
        assert_eq!(CoreScale::from(TimeseriesScale::Days), CoreScale::Days);
        assert_eq!(CoreScale::from(TimeseriesScale::default()), CoreScale::Minutes);
    }
}
