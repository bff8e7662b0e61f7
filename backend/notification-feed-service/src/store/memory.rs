use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use super::{SnapshotSource, SnapshotStream};
use crate::error::StoreError;
use crate::models::{NotificationRecord, Snapshot};

/// In-process notifications collection
///
/// Listeners receive the current contents on registration and the full
/// contents after every mutation. Rapid successive writes may be coalesced
/// into the latest state, which is harmless because every item is a full
/// snapshot.
pub struct InMemorySnapshotSource {
    records: watch::Sender<Vec<NotificationRecord>>,
    failing_queries: AtomicUsize,
}

impl InMemorySnapshotSource {
    pub fn new() -> Self {
        Self::with_records(Vec::new())
    }

    pub fn with_records(records: Vec<NotificationRecord>) -> Self {
        let (records, _) = watch::channel(records);
        Self {
            records,
            failing_queries: AtomicUsize::new(0),
        }
    }

    /// Replace the whole collection
    pub fn replace(&self, records: Vec<NotificationRecord>) {
        self.records.send_replace(records);
    }

    /// Append one record
    pub fn push(&self, record: NotificationRecord) {
        self.records.send_modify(|records| records.push(record));
    }

    pub fn clear(&self) {
        self.replace(Vec::new());
    }

    /// Make the next `n` calls to `query` fail
    pub fn fail_next_queries(&self, n: usize) {
        self.failing_queries.store(n, Ordering::SeqCst);
    }

    /// Number of active change listeners
    pub fn listener_count(&self) -> usize {
        self.records.receiver_count()
    }

    fn current(&self) -> Snapshot {
        Snapshot::new(self.records.borrow().clone())
    }
}

impl Default for InMemorySnapshotSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotSource for InMemorySnapshotSource {
    async fn query(&self, _collection: &str) -> Result<Snapshot, StoreError> {
        let should_fail = self
            .failing_queries
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(StoreError::Query("store unavailable".to_string()));
        }
        Ok(self.current())
    }

    async fn subscribe(&self, _collection: &str) -> Result<SnapshotStream, StoreError> {
        let stream = WatchStream::new(self.records.subscribe())
            .map(|records| Ok(Snapshot::new(records)))
            .boxed();
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_query_returns_current_contents() {
        let source = InMemorySnapshotSource::with_records(vec![json!({"id": "a"})]);
        let snapshot = source.query("notifications").await.unwrap();
        assert_eq!(snapshot.notifications, vec![json!({"id": "a"})]);
    }

    #[tokio::test]
    async fn test_query_empty_collection() {
        let source = InMemorySnapshotSource::new();
        assert!(source.query("notifications").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_emits_initial_then_changes() {
        let source = InMemorySnapshotSource::new();
        let mut stream = source.subscribe("notifications").await.unwrap();

        let initial = stream.next().await.unwrap().unwrap();
        assert!(initial.is_empty());

        source.push(json!({"id": "a"}));
        let changed = stream.next().await.unwrap().unwrap();
        assert_eq!(changed.notifications, vec![json!({"id": "a"})]);
    }

    #[tokio::test]
    async fn test_listener_count_tracks_streams() {
        let source = InMemorySnapshotSource::new();
        assert_eq!(source.listener_count(), 0);
        let stream = source.subscribe("notifications").await.unwrap();
        assert_eq!(source.listener_count(), 1);
        drop(stream);
        assert_eq!(source.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_failing_queries() {
        let source = InMemorySnapshotSource::new();
        source.fail_next_queries(1);
        assert!(source.query("notifications").await.is_err());
        assert!(source.query("notifications").await.is_ok());
    }
}
