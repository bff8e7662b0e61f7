/// Subscriber Registry
///
/// Tracks every open feed connection. Shared by the connect path (add),
/// the disconnect path (remove) and the broadcaster (snapshot_members), so
/// all access goes through one lock and iteration always happens on a copy.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::TransportError;
use crate::metrics;

/// Serialized snapshot shared by every receiver of one broadcast
pub type FeedPayload = Arc<str>;
pub type FeedReceiver = mpsc::Receiver<FeedPayload>;

/// Unique identifier for a feed subscriber
///
/// Each WebSocket connection gets its own id when it opens, so cleanup
/// removes exactly that connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Sending half of a subscriber's bounded outbound buffer
#[derive(Debug, Clone)]
pub struct SubscriberHandle {
    id: SubscriberId,
    sender: mpsc::Sender<FeedPayload>,
}

impl SubscriberHandle {
    /// Create a subscriber with room for `capacity` undelivered snapshots
    pub fn channel(capacity: usize) -> (Self, FeedReceiver) {
        let (sender, receiver) = mpsc::channel(capacity);
        (
            Self {
                id: SubscriberId::new(),
                sender,
            },
            receiver,
        )
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Enqueue a payload without waiting. A full buffer means the client is
    /// not keeping up.
    pub fn try_deliver(&self, payload: &FeedPayload) -> Result<(), TransportError> {
        self.sender.try_send(payload.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::Lagging,
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    inner: Arc<RwLock<HashMap<SubscriberId, SubscriberHandle>>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber
    pub fn add(&self, subscriber: SubscriberHandle) {
        let total = {
            let mut guard = self.inner.write();
            guard.insert(subscriber.id, subscriber);
            guard.len()
        };
        metrics::set_active_subscribers(total);
        tracing::debug!("Subscriber registered, total subscribers: {}", total);
    }

    /// Remove a subscriber. Returns false when it was already gone.
    pub fn remove(&self, id: SubscriberId) -> bool {
        let (removed, total) = {
            let mut guard = self.inner.write();
            let removed = guard.remove(&id).is_some();
            (removed, guard.len())
        };
        if removed {
            metrics::set_active_subscribers(total);
            tracing::debug!(
                "Removed subscriber {}, remaining: {}",
                id,
                total
            );
        }
        removed
    }

    /// Point-in-time copy of the current members
    pub fn snapshot_members(&self) -> Vec<SubscriberHandle> {
        self.inner.read().values().cloned().collect()
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.inner.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Drop every subscriber. Each connection sees its feed end and closes.
    pub fn close_all(&self) -> usize {
        let drained: Vec<SubscriberHandle> = {
            let mut guard = self.inner.write();
            guard.drain().map(|(_, handle)| handle).collect()
        };
        metrics::set_active_subscribers(0);
        drained.len()
    }
}
