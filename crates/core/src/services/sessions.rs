//! Subscription session manager.
//!
//! Bridges hub subscriptions to transport connections. A session moves
//! through three states:
//!
//! ```text
//! Registered ──attach──▶ Active ──close──▶ Closed
//!      └─────────────close──────────────────▲
//! ```
//!
//! Closing releases the hub subscription synchronously, so nothing is
//! enqueued for a session once `close` returns. Closing is idempotent and
//! may come from the transport (stream dropped) or from an administrative
//! shutdown, in any order.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::{SessionError, SessionResult};
use crate::metrics::{record_session_closed, record_session_opened};
use crate::models::{Envelope, HubEvent, Topic};

use super::hub::{EventHub, SubscriberId};

/// Identifier of a subscription session.
pub type SessionId = u64;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Interest recorded, no transport attached yet.
    Registered,
    /// Transport attached, receiving events.
    Active,
    /// Terminal.
    Closed,
}

impl SessionState {
    fn as_str(&self) -> &'static str {
        match self {
            SessionState::Registered => "registered",
            SessionState::Active => "active",
            SessionState::Closed => "closed",
        }
    }
}

/// Snapshot of a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub topics: Vec<Topic>,
    pub state: SessionState,
    /// Events handed to the transport so far.
    pub delivered: u64,
    /// Hub sequence number of the last delivered event (0 if none).
    pub last_seq: u64,
}

#[derive(Debug, Default)]
struct DeliveryCursor {
    delivered: AtomicU64,
    last_seq: AtomicU64,
}

impl DeliveryCursor {
    fn advance(&self, seq: u64) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        self.last_seq.store(seq, Ordering::Relaxed);
    }
}

struct SessionEntry {
    topics: Vec<Topic>,
    state: SessionState,
    subscriber: Option<SubscriberId>,
    cursor: Arc<DeliveryCursor>,
}

struct Inner {
    hub: Arc<EventHub>,
    next_id: AtomicU64,
    // Closed sessions are removed, so this only holds live ones.
    sessions: Mutex<HashMap<SessionId, SessionEntry>>,
}

// =============================================================================
// SessionManager
// =============================================================================

/// Tracks live subscription sessions. Cheap to clone.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(hub: Arc<EventHub>) -> Self {
        Self {
            inner: Arc::new(Inner {
                hub,
                next_id: AtomicU64::new(0),
                sessions: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Record interest in `topics`. No events flow until [`Self::attach`].
    pub fn register(&self, topics: &[Topic]) -> SessionId {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut topics = topics.to_vec();
        topics.sort();
        topics.dedup();

        self.inner.sessions.lock().insert(
            id,
            SessionEntry {
                topics,
                state: SessionState::Registered,
                subscriber: None,
                cursor: Arc::new(DeliveryCursor::default()),
            },
        );

        trace!(session = id, "Session registered");
        id
    }

    /// Attach a transport: subscribe to the hub and start receiving.
    pub fn attach(&self, id: SessionId) -> SessionResult<SessionStream> {
        let mut sessions = self.inner.sessions.lock();
        let entry = sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;

        if entry.state != SessionState::Registered {
            return Err(SessionError::InvalidState {
                id,
                action: "attach",
                state: entry.state.as_str(),
            });
        }

        let subscription = self.inner.hub.subscribe(&entry.topics)?;
        entry.state = SessionState::Active;
        entry.subscriber = Some(subscription.id);
        let cursor = entry.cursor.clone();
        drop(sessions);

        record_session_opened();
        debug!(session = id, "📡 Session active");

        Ok(SessionStream {
            id,
            manager: self.clone(),
            receiver: subscription.receiver,
            cursor,
        })
    }

    /// Register and attach in one step.
    pub fn open(&self, topics: &[Topic]) -> SessionResult<SessionStream> {
        let id = self.register(topics);
        self.attach(id).inspect_err(|_| {
            self.close(id);
        })
    }

    /// Close a session. Returns `true` if this call performed the close.
    ///
    /// The hub subscription is released before returning.
    pub fn close(&self, id: SessionId) -> bool {
        let mut sessions = self.inner.sessions.lock();
        let Some(entry) = sessions.remove(&id) else {
            return false;
        };

        if let Some(subscriber) = entry.subscriber {
            self.inner.hub.unsubscribe(subscriber);
        }
        drop(sessions);

        if entry.state == SessionState::Active {
            record_session_closed();
        }
        debug!(
            session = id,
            delivered = entry.cursor.delivered.load(Ordering::Relaxed),
            "Session closed"
        );
        true
    }

    /// Close every live session. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let ids: Vec<SessionId> = self.inner.sessions.lock().keys().copied().collect();
        ids.into_iter().filter(|id| self.close(*id)).count()
    }

    /// Current state of `id`, `None` if it was never issued.
    pub fn state(&self, id: SessionId) -> Option<SessionState> {
        if let Some(entry) = self.inner.sessions.lock().get(&id) {
            return Some(entry.state);
        }
        (id > 0 && id <= self.inner.next_id.load(Ordering::Relaxed)).then_some(SessionState::Closed)
    }

    /// Snapshot of a live session.
    pub fn info(&self, id: SessionId) -> Option<SessionInfo> {
        self.inner.sessions.lock().get(&id).map(|entry| SessionInfo {
            id,
            topics: entry.topics.clone(),
            state: entry.state,
            delivered: entry.cursor.delivered.load(Ordering::Relaxed),
            last_seq: entry.cursor.last_seq.load(Ordering::Relaxed),
        })
    }

    /// Number of sessions in the `Active` state.
    pub fn active_count(&self) -> usize {
        self.inner
            .sessions
            .lock()
            .values()
            .filter(|entry| entry.state == SessionState::Active)
            .count()
    }

    pub fn hub(&self) -> &Arc<EventHub> {
        &self.inner.hub
    }
}

// =============================================================================
// SessionStream
// =============================================================================

/// Events of an active session, in hub publish order per topic.
///
/// Dropping the stream (transport lost) closes the session.
pub struct SessionStream {
    id: SessionId,
    manager: SessionManager,
    receiver: mpsc::Receiver<Envelope>,
    cursor: Arc<DeliveryCursor>,
}

impl SessionStream {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Stream for SessionStream {
    type Item = HubEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.receiver.poll_recv(cx) {
            Poll::Ready(Some(envelope)) => {
                self.cursor.advance(envelope.seq);
                Poll::Ready(Some(envelope.event))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for SessionStream {
    fn drop(&mut self) {
        if self.manager.close(self.id) {
            debug!(session = self.id, "Transport lost, session cleaned up");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::error::HubError;

    fn manager() -> SessionManager {
        SessionManager::new(Arc::new(EventHub::default()))
    }

    #[test]
    fn test_lifecycle_transitions() {
        let sessions = manager();
        let id = sessions.register(&[Topic::CounterTick]);
        assert_eq!(sessions.state(id), Some(SessionState::Registered));
        assert_eq!(sessions.hub().subscriber_count(Topic::CounterTick), 0);

        let stream = sessions.attach(id).unwrap();
        assert_eq!(sessions.state(id), Some(SessionState::Active));
        assert_eq!(sessions.active_count(), 1);
        assert_eq!(sessions.hub().subscriber_count(Topic::CounterTick), 1);

        assert!(sessions.close(id));
        assert_eq!(sessions.state(id), Some(SessionState::Closed));
        assert_eq!(sessions.hub().subscriber_count(Topic::CounterTick), 0);
        drop(stream);

        assert_eq!(sessions.state(999), None);
    }

    #[test]
    fn test_attach_twice_is_rejected() {
        let sessions = manager();
        let id = sessions.register(&[Topic::NewBlock]);
        let _stream = sessions.attach(id).unwrap();
        assert!(matches!(
            sessions.attach(id),
            Err(SessionError::InvalidState { action: "attach", state: "active", .. })
        ));
    }

    #[test]
    fn test_attach_unknown_session() {
        let sessions = manager();
        assert!(matches!(sessions.attach(7), Err(SessionError::NotFound(7))));
    }

    // Test critique: fermeture puis publication, aucune livraison et aucune erreur
    #[tokio::test]
    async fn test_close_then_publish_delivers_nothing() {
        let sessions = manager();
        let mut stream = sessions.open(&[Topic::CounterTick]).unwrap();
        let id = stream.id();

        assert!(sessions.close(id));
        assert!(!sessions.close(id));

        let report = sessions.hub().publish(HubEvent::CounterTick(1));
        assert_eq!(report.delivered, 0);
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_close_is_idempotent() {
        let sessions = manager();
        let stream = sessions.open(&[Topic::CounterTick]).unwrap();
        let id = stream.id();

        let closers: Vec<_> = (0..16)
            .map(|_| {
                let sessions = sessions.clone();
                tokio::spawn(async move { sessions.close(id) })
            })
            .collect();

        let mut winners = 0;
        for closer in closers {
            if closer.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(sessions.active_count(), 0);
        drop(stream);
    }

    #[tokio::test]
    async fn test_dropping_stream_closes_session() {
        let sessions = manager();
        let stream = sessions.open(&[Topic::NewBlock]).unwrap();
        let id = stream.id();
        drop(stream);

        assert_eq!(sessions.state(id), Some(SessionState::Closed));
        assert_eq!(sessions.hub().subscriber_count(Topic::NewBlock), 0);
    }

    #[tokio::test]
    async fn test_delivery_cursor_tracks_stream() {
        let sessions = manager();
        let mut stream = sessions.open(&[Topic::CounterTick]).unwrap();
        let id = stream.id();

        sessions.hub().publish(HubEvent::CounterTick(1));
        let report = sessions.hub().publish(HubEvent::CounterTick(2));

        assert_eq!(stream.next().await, Some(HubEvent::CounterTick(1)));
        assert_eq!(stream.next().await, Some(HubEvent::CounterTick(2)));

        let info = sessions.info(id).unwrap();
        assert_eq!(info.delivered, 2);
        assert_eq!(info.last_seq, report.seq);
    }

    #[tokio::test]
    async fn test_close_all_and_hub_shutdown() {
        let sessions = manager();
        let mut streams: Vec<_> = (0..5)
            .map(|_| sessions.open(&[Topic::CounterTick]).unwrap())
            .collect();
        sessions.register(&[Topic::NewBlock]);

        assert_eq!(sessions.close_all(), 6);
        sessions.hub().shutdown();

        for stream in &mut streams {
            assert_eq!(stream.next().await, None);
        }
        assert!(matches!(
            sessions.open(&[Topic::CounterTick]),
            Err(SessionError::Hub(HubError::Closed))
        ));
        // The failed open leaves nothing behind.
        assert_eq!(sessions.close_all(), 0);
    }
}
