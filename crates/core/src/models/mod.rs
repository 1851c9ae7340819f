//! Domain models for served telemetry.
//!
//! These models are transport-agnostic. The GraphQL layer maps them to
//! its own output types, and the HTTP data source decodes them straight
//! from upstream JSON (hence the camelCase serde naming).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// =============================================================================
// Blocks
// =============================================================================

/// Summary of the chain head as reported by the data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockInfo {
    /// Latest block number (height).
    pub number: u64,
    /// Average block time in seconds.
    pub avg_block_time: f64,
    /// Network hash rate (decimal string).
    pub hash_rate: String,
    /// Current difficulty (decimal string).
    pub difficulty: String,
}

/// Block rewards, in wei.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRewards {
    /// Total reward (decimal string, wei precision).
    pub total: String,
}

/// Summary of a single block. One instance per height, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSummary {
    /// Block number (height).
    pub number: u64,
    /// Miner address (0x-prefixed hex).
    pub miner: String,
    /// Number of transactions in the block.
    pub tx_count: u32,
    /// Block timestamp (unix seconds).
    pub timestamp: i64,
    /// Rewards paid for this block.
    pub rewards: BlockRewards,
    /// Number of failed transactions in the block.
    pub tx_fail: u32,
}

// =============================================================================
// Transfers
// =============================================================================

/// A value transfer included in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    /// Transaction hash (unique id).
    pub transaction_hash: String,
    /// Sender address.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Block number containing the transfer.
    pub block: u64,
    /// Transfer timestamp (unix seconds).
    pub timestamp: i64,
    /// Fee paid (decimal string, wei).
    pub tx_fee: String,
    /// Execution status (`true` = success).
    pub status: bool,
}

/// ETH transfer: the transfer plus the amount moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthTransfer {
    pub transfer: Transfer,
    /// Amount transferred (decimal string, wei).
    pub value: String,
}

// =============================================================================
// Timeseries
// =============================================================================

/// One sample of a metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeseriesPoint {
    /// Sample value (decimal string).
    pub value: String,
    /// Sample timestamp (unix seconds).
    pub timestamp: i64,
}

/// Known metric keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricKey {
    GasPriceMin,
    GasPriceMax,
    GasPriceAvg,
    TxCountTotal,
    PendingTxCountTotal,
}

impl MetricKey {
    pub const ALL: [MetricKey; 5] = [
        MetricKey::GasPriceMin,
        MetricKey::GasPriceMax,
        MetricKey::GasPriceAvg,
        MetricKey::TxCountTotal,
        MetricKey::PendingTxCountTotal,
    ];

    /// Wire name of the key (e.g. `GAS_PRICE_MIN`).
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::GasPriceMin => "GAS_PRICE_MIN",
            MetricKey::GasPriceMax => "GAS_PRICE_MAX",
            MetricKey::GasPriceAvg => "GAS_PRICE_AVG",
            MetricKey::TxCountTotal => "TX_COUNT_TOTAL",
            MetricKey::PendingTxCountTotal => "PENDING_TX_COUNT_TOTAL",
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Sampling resolution of a timeseries query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeseriesScale {
    Days,
    Hours,
    #[default]
    Minutes,
    Seconds,
}

impl TimeseriesScale {
    /// Distance between two consecutive points, in seconds.
    pub fn step_secs(&self) -> i64 {
        match self {
            TimeseriesScale::Days => 86_400,
            TimeseriesScale::Hours => 3_600,
            TimeseriesScale::Minutes => 60,
            TimeseriesScale::Seconds => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeseriesScale::Days => "days",
            TimeseriesScale::Hours => "hours",
            TimeseriesScale::Minutes => "minutes",
            TimeseriesScale::Seconds => "seconds",
        }
    }
}

// =============================================================================
// Push events
// =============================================================================

/// Topics a session can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    CounterTick,
    NewBlock,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::CounterTick => "counter-tick",
            Topic::NewBlock => "new-block",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ephemeral event distributed by the hub. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    /// Counter value after the tick.
    CounterTick(u64),
    /// A new block was observed.
    NewBlock(BlockSummary),
}

impl HubEvent {
    /// Topic this event is published on.
    pub fn topic(&self) -> Topic {
        match self {
            HubEvent::CounterTick(_) => Topic::CounterTick,
            HubEvent::NewBlock(_) => Topic::NewBlock,
        }
    }
}

/// Event as queued for a subscriber, stamped with the hub sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Hub-wide publish sequence (strictly increasing).
    pub seq: u64,
    pub event: HubEvent,
}

// =============================================================================
// Tests
// =============================================================================
