use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::Result;
use crate::metrics;
use crate::models::Snapshot;
use crate::websocket::{FeedPayload, SubscriberHandle, SubscriberRegistry};

/// Outcome of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Pushes each snapshot to every registered subscriber
///
/// A snapshot is serialized once and the same payload is enqueued to every
/// member. A member whose buffer is full or whose connection is gone is
/// removed from the registry; the remaining members still receive it.
///
/// The latest payload is retained so a newly attached subscriber starts from
/// the current contents instead of waiting for the next change.
pub struct FanoutBroadcaster {
    registry: SubscriberRegistry,
    latest: Mutex<Option<FeedPayload>>,
}

impl FanoutBroadcaster {
    pub fn new(registry: SubscriberRegistry) -> Self {
        Self {
            registry,
            latest: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    /// Register a subscriber and hand it the latest snapshot, if any.
    ///
    /// Runs under the same lock as `broadcast`, so the subscriber sees either
    /// the old snapshot followed by the new one, or only the new one.
    pub fn attach(&self, subscriber: SubscriberHandle) {
        let latest = self.latest.lock();
        if let Some(payload) = latest.as_ref() {
            if let Err(e) = subscriber.try_deliver(payload) {
                tracing::debug!(
                    subscriber = %subscriber.id(),
                    error = %e,
                    "Initial snapshot not delivered, subscriber not registered"
                );
                return;
            }
        }
        self.registry.add(subscriber);
    }

    /// Serialize `snapshot` and deliver it to every current subscriber
    pub fn broadcast(&self, snapshot: &Snapshot) -> Result<BroadcastReport> {
        let payload: FeedPayload = Arc::from(snapshot.to_json()?);

        let mut latest = self.latest.lock();
        *latest = Some(payload.clone());

        let mut report = BroadcastReport::default();
        for member in self.registry.snapshot_members() {
            match member.try_deliver(&payload) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        subscriber = %member.id(),
                        reason = e.as_label(),
                        "Dropping subscriber after failed delivery"
                    );
                    metrics::record_subscriber_drop(e.as_label());
                    self.registry.remove(member.id());
                    report.dropped += 1;
                }
            }
        }
        drop(latest);

        metrics::record_broadcast(report.delivered);
        tracing::debug!(
            notifications = snapshot.len(),
            delivered = report.delivered,
            dropped = report.dropped,
            "Snapshot broadcast"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(ids: &[&str]) -> Snapshot {
        Snapshot::new(ids.iter().map(|id| json!({ "id": id })).collect())
    }

    #[test]
    fn test_broadcast_with_no_subscribers() {
        let broadcaster = FanoutBroadcaster::new(SubscriberRegistry::new());
        let report = broadcaster.broadcast(&snapshot(&["a"])).unwrap();
        assert_eq!(report, BroadcastReport::default());
    }

    #[test]
    fn test_every_subscriber_receives_same_payload() {
        let registry = SubscriberRegistry::new();
        let broadcaster = FanoutBroadcaster::new(registry.clone());

        let mut receivers = vec![];
        for _ in 0..3 {
            let (handle, rx) = SubscriberHandle::channel(4);
            broadcaster.attach(handle);
            receivers.push(rx);
        }

        let report = broadcaster.broadcast(&snapshot(&["a"])).unwrap();
        assert_eq!(report.delivered, 3);
        assert_eq!(report.dropped, 0);

        for rx in receivers.iter_mut() {
            let payload = rx.try_recv().unwrap();
            assert_eq!(&*payload, r#"{"notifications":[{"id":"a"}]}"#);
        }
    }

    #[test]
    fn test_closed_subscriber_is_removed_and_others_still_delivered() {
        let registry = SubscriberRegistry::new();
        let broadcaster = FanoutBroadcaster::new(registry.clone());

        let (first, mut rx_first) = SubscriberHandle::channel(4);
        let (second, rx_second) = SubscriberHandle::channel(4);
        let (third, mut rx_third) = SubscriberHandle::channel(4);
        let closed_id = second.id();
        broadcaster.attach(first);
        broadcaster.attach(second);
        broadcaster.attach(third);
        drop(rx_second);

        let report = broadcaster.broadcast(&snapshot(&["a", "b"])).unwrap();
        assert_eq!(report.delivered, 2);
        assert_eq!(report.dropped, 1);
        assert!(!registry.contains(closed_id));
        assert_eq!(registry.len(), 2);
        assert!(rx_first.try_recv().is_ok());
        assert!(rx_third.try_recv().is_ok());
    }

    #[test]
    fn test_lagging_subscriber_is_removed() {
        let registry = SubscriberRegistry::new();
        let broadcaster = FanoutBroadcaster::new(registry.clone());

        let (slow, _rx_slow) = SubscriberHandle::channel(1);
        let (fast, mut rx_fast) = SubscriberHandle::channel(8);
        let slow_id = slow.id();
        broadcaster.attach(slow);
        broadcaster.attach(fast);

        broadcaster.broadcast(&snapshot(&["a"])).unwrap();
        rx_fast.try_recv().unwrap();
        let report = broadcaster.broadcast(&snapshot(&["a", "b"])).unwrap();

        assert_eq!(report.dropped, 1);
        assert!(!registry.contains(slow_id));
        assert_eq!(
            &*rx_fast.try_recv().unwrap(),
            r#"{"notifications":[{"id":"a"},{"id":"b"}]}"#
        );
    }

    #[test]
    fn test_attach_replays_latest_snapshot() {
        let registry = SubscriberRegistry::new();
        let broadcaster = FanoutBroadcaster::new(registry.clone());
        broadcaster.broadcast(&snapshot(&["a"])).unwrap();
        broadcaster.broadcast(&snapshot(&["a", "b"])).unwrap();

        let (late, mut rx) = SubscriberHandle::channel(4);
        broadcaster.attach(late);

        assert_eq!(registry.len(), 1);
        assert_eq!(
            &*rx.try_recv().unwrap(),
            r#"{"notifications":[{"id":"a"},{"id":"b"}]}"#
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_attach_before_first_snapshot_sends_nothing() {
        let broadcaster = FanoutBroadcaster::new(SubscriberRegistry::new());
        let (handle, mut rx) = SubscriberHandle::channel(4);
        broadcaster.attach(handle);
        assert!(rx.try_recv().is_err());
        assert_eq!(broadcaster.registry().len(), 1);
    }

    #[test]
    fn test_snapshots_arrive_in_order() {
        let broadcaster = FanoutBroadcaster::new(SubscriberRegistry::new());
        let (handle, mut rx) = SubscriberHandle::channel(8);
        broadcaster.attach(handle);

        broadcaster.broadcast(&snapshot(&["a"])).unwrap();
        broadcaster.broadcast(&snapshot(&[])).unwrap();
        broadcaster.broadcast(&snapshot(&["c"])).unwrap();

        assert_eq!(&*rx.try_recv().unwrap(), r#"{"notifications":[{"id":"a"}]}"#);
        assert_eq!(&*rx.try_recv().unwrap(), r#"{"notifications":[]}"#);
        assert_eq!(&*rx.try_recv().unwrap(), r#"{"notifications":[{"id":"c"}]}"#);
    }

    fn seq_of(payload: &str) -> u64 {
        let value: serde_json::Value = serde_json::from_str(payload).unwrap();
        value["notifications"][0]["seq"].as_u64().unwrap()
    }

    fn drain_seqs(rx: &mut crate::websocket::FeedReceiver) -> Vec<u64> {
        let mut seqs = Vec::new();
        while let Ok(payload) = rx.try_recv() {
            seqs.push(seq_of(&payload));
        }
        seqs
    }

    #[test]
    fn test_churn_during_broadcast_keeps_order_and_cleans_up() {
        const SNAPSHOTS: u64 = 400;
        const WORKERS: usize = 4;
        const ROUNDS: usize = 50;

        let broadcaster = Arc::new(FanoutBroadcaster::new(SubscriberRegistry::new()));
        let (steady, mut steady_rx) = SubscriberHandle::channel(1024);
        let steady_id = steady.id();
        broadcaster.attach(steady);

        let sender = {
            let broadcaster = broadcaster.clone();
            std::thread::spawn(move || {
                for seq in 0..SNAPSHOTS {
                    let snapshot = Snapshot::new(vec![json!({ "seq": seq })]);
                    broadcaster.broadcast(&snapshot).unwrap();
                }
            })
        };

        let workers: Vec<_> = (0..WORKERS)
            .map(|_| {
                let broadcaster = broadcaster.clone();
                std::thread::spawn(move || {
                    for _ in 0..ROUNDS {
                        let (handle, mut rx) = SubscriberHandle::channel(1024);
                        let id = handle.id();
                        broadcaster.attach(handle);
                        std::thread::yield_now();
                        broadcaster.registry().remove(id);

                        let seqs = drain_seqs(&mut rx);
                        for pair in seqs.windows(2) {
                            assert_eq!(pair[1], pair[0] + 1, "gap or reorder in {:?}", seqs);
                        }
                    }
                })
            })
            .collect();

        sender.join().unwrap();
        for worker in workers {
            worker.join().unwrap();
        }

        let seqs = drain_seqs(&mut steady_rx);
        assert_eq!(seqs, (0..SNAPSHOTS).collect::<Vec<_>>());

        assert_eq!(broadcaster.registry().len(), 1);
        assert!(broadcaster.registry().contains(steady_id));
        broadcaster.registry().remove(steady_id);
        assert!(broadcaster.registry().is_empty());
    }
}
