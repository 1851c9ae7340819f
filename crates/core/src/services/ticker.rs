//! Periodic tick source.
//!
//! Fires at a fixed interval, bumps a monotonic counter and publishes a
//! `CounterTick` plus a synthetic `NewBlock` to the hub. It stands in for a
//! real chain-tip watcher; anything that can publish to an [`EventHub`]
//! can replace it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, trace};

use crate::metrics::record_tick;
use crate::models::{BlockRewards, BlockSummary, HubEvent};

use super::hub::EventHub;

/// Block number of the first synthetic block is `BASE_BLOCK_OFFSET + 1`.
pub const BASE_BLOCK_OFFSET: u64 = 100;

/// Placeholder miner for synthetic blocks.
pub const PLACEHOLDER_MINER: &str = "0xEA674fdDe714fd979de3EdF0F56AA9716B898ec8";
pub const PLACEHOLDER_TX_COUNT: u32 = 39;
pub const PLACEHOLDER_TX_FAIL: u32 = 2;
pub const PLACEHOLDER_REWARD: &str = "1234000000000000000";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the tick source.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Time between two ticks.
    pub interval: Duration,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

// =============================================================================
// TickSource
// =============================================================================

/// Background publisher of counter ticks and synthetic blocks.
pub struct TickSource {
    config: TickConfig,
    hub: Arc<EventHub>,
    counter: AtomicU64,
}

impl TickSource {
    pub fn new(config: TickConfig, hub: Arc<EventHub>) -> Self {
        Self {
            config,
            hub,
            counter: AtomicU64::new(0),
        }
    }

    /// Current counter value (number of ticks fired so far).
    pub fn counter(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Fire one tick. Returns the new counter value.
    pub fn tick(&self) -> u64 {
        let value = self.counter.fetch_add(1, Ordering::SeqCst) + 1;

        self.hub.publish(HubEvent::CounterTick(value));
        self.hub.publish(HubEvent::NewBlock(synthetic_block(
            value + BASE_BLOCK_OFFSET,
            Utc::now().timestamp(),
        )));

        record_tick();
        trace!(counter = value, "Tick");
        value
    }

    /// Tick until `shutdown_rx` flips to `true`.
    ///
    /// The first tick fires immediately.
    #[instrument(skip_all, fields(interval_ms = self.config.interval.as_millis() as u64))]
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("⏱️  Tick source started");

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                _ = interval.tick() => {
                    self.tick();
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        debug!(counter = self.counter(), "Tick source stopped");
    }
}

/// Synthetic block announced on each tick.
pub fn synthetic_block(number: u64, timestamp: i64) -> BlockSummary {
    BlockSummary {
        number,
        miner: PLACEHOLDER_MINER.to_string(),
        tx_count: PLACEHOLDER_TX_COUNT,
        timestamp,
        rewards: BlockRewards {
            total: PLACEHOLDER_REWARD.to_string(),
        },
        tx_fail: PLACEHOLDER_TX_FAIL,
    }
}

// =============================================================================
// Tests
// =============================================================================
