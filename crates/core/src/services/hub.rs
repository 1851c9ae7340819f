//! Event fan-out hub.
//!
//! In-process publish/subscribe. Each subscriber owns a bounded queue; a
//! publish enqueues the event for every subscriber registered on its topic
//! at call time and never waits on a slow consumer. When a queue is full
//! the event is dropped for that subscriber only (at-most-once delivery).
//!
//! All mutations of the subscriber set go through a single mutex, so a
//! publish can never race a concurrent subscribe/unsubscribe.

use std::collections::{BTreeSet, HashMap};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::{HubError, HubResult};
use crate::metrics::record_publish;
use crate::models::{Envelope, HubEvent, Topic};

/// Identifier of a hub subscriber.
pub type SubscriberId = u64;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the event hub.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of each subscriber's queue.
    pub queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self { queue_capacity: 64 }
    }
}

// =============================================================================
// Types
// =============================================================================

/// A live hub subscription. Dropping the receiver lets the hub prune the
/// subscriber on its next publish; call [`EventHub::unsubscribe`] to
/// release it immediately.
#[derive(Debug)]
pub struct HubSubscription {
    pub id: SubscriberId,
    pub receiver: mpsc::Receiver<Envelope>,
}

/// Outcome of a single publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Hub sequence number assigned to the event (0 when the hub is closed).
    pub seq: u64,
    /// Subscribers the event was enqueued for.
    pub delivered: usize,
    /// Subscribers whose queue was full.
    pub dropped: usize,
}

#[derive(Default)]
struct HubState {
    closed: bool,
    next_id: SubscriberId,
    next_seq: u64,
    by_topic: HashMap<Topic, HashMap<SubscriberId, mpsc::Sender<Envelope>>>,
    // Reverse index used to release every topic of a subscriber at once.
    topics_of: HashMap<SubscriberId, BTreeSet<Topic>>,
}

impl HubState {
    fn remove(&mut self, id: SubscriberId) -> bool {
        let Some(topics) = self.topics_of.remove(&id) else {
            return false;
        };

        for topic in topics {
            let removed = self
                .by_topic
                .get_mut(&topic)
                .and_then(|subscribers| subscribers.remove(&id));
            if removed.is_none() {
                // Both indexes are only ever updated together under the lock.
                panic!("event hub index out of sync: subscriber {id} missing from topic {topic}");
            }
        }
        true
    }
}

// =============================================================================
// EventHub
// =============================================================================

/// Process-wide event distribution.
///
/// Create one per server and share it behind an `Arc`.
pub struct EventHub {
    config: HubConfig,
    state: Mutex<HubState>,
}

impl EventHub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            state: Mutex::new(HubState::default()),
        }
    }

    /// Register a subscriber for `topics`.
    ///
    /// Only events published after this call returns are delivered.
    pub fn subscribe(&self, topics: &[Topic]) -> HubResult<HubSubscription> {
        if topics.is_empty() {
            return Err(HubError::NoTopics);
        }

        let (sender, receiver) = mpsc::channel(self.config.queue_capacity.max(1));

        let mut state = self.state.lock();
        if state.closed {
            return Err(HubError::Closed);
        }

        state.next_id += 1;
        let id = state.next_id;

        let topics: BTreeSet<Topic> = topics.iter().copied().collect();
        for topic in &topics {
            state
                .by_topic
                .entry(*topic)
                .or_default()
                .insert(id, sender.clone());
        }
        state.topics_of.insert(id, topics);
        drop(state);

        trace!(subscriber = id, "Hub subscriber registered");
        Ok(HubSubscription { id, receiver })
    }

    /// Release a subscriber. Returns `false` if it was already gone.
    ///
    /// Once this returns, no further event is enqueued for `id`.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.state.lock().remove(id);
        if removed {
            trace!(subscriber = id, "Hub subscriber released");
        }
        removed
    }

    /// Enqueue `event` for every current subscriber of its topic.
    ///
    /// Never blocks and never fails: a closed hub simply delivers to nobody.
    pub fn publish(&self, event: HubEvent) -> PublishReport {
        let topic = event.topic();
        let mut report = PublishReport::default();
        let mut gone = Vec::new();

        {
            let mut state = self.state.lock();
            if state.closed {
                trace!(%topic, "Publish on closed hub ignored");
                return report;
            }

            state.next_seq += 1;
            report.seq = state.next_seq;

            if let Some(subscribers) = state.by_topic.get(&topic) {
                for (id, sender) in subscribers {
                    let envelope = Envelope {
                        seq: report.seq,
                        event: event.clone(),
                    };
                    match sender.try_send(envelope) {
                        Ok(()) => report.delivered += 1,
                        Err(mpsc::error::TrySendError::Full(_)) => report.dropped += 1,
                        Err(mpsc::error::TrySendError::Closed(_)) => gone.push(*id),
                    }
                }
            }

            for id in &gone {
                state.remove(*id);
            }
        }

        if report.dropped > 0 {
            warn!(%topic, dropped = report.dropped, "⚠️  Slow subscribers, events dropped");
        }
        if !gone.is_empty() {
            debug!(%topic, pruned = gone.len(), "Pruned disconnected subscribers");
        }
        record_publish(topic, report.dropped);

        report
    }

    /// Tear the hub down.
    ///
    /// Drops every subscriber queue (their streams end once drained),
    /// rejects new subscribers and turns later publishes into no-ops.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let released = state.topics_of.len();
        state.by_topic.clear();
        state.topics_of.clear();
        drop(state);

        debug!(released, "Event hub shut down");
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of subscribers currently registered on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.state
            .lock()
            .by_topic
            .get(&topic)
            .map_or(0, HashMap::len)
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

// =============================================================================
// Tests
// =============================================================================
