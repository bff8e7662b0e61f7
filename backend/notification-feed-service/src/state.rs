use std::sync::Arc;

use crate::config::{AuthPolicy, FeedConfig};
use crate::services::{AccessGate, FanoutBroadcaster, IdentityVerifier};
use crate::store::SnapshotSource;
use crate::websocket::SubscriberRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: SubscriberRegistry,
    pub broadcaster: Arc<FanoutBroadcaster>,
    pub source: Arc<dyn SnapshotSource>,
    pub gate: AccessGate,
    /// Notifications collection name
    pub collection: String,
    pub feed: FeedConfig,
    pub policy: AuthPolicy,
}

impl AppState {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        verifier: Arc<dyn IdentityVerifier>,
        collection: impl Into<String>,
        feed: FeedConfig,
        policy: AuthPolicy,
    ) -> Self {
        let registry = SubscriberRegistry::new();
        Self {
            broadcaster: Arc::new(FanoutBroadcaster::new(registry.clone())),
            registry,
            source,
            gate: AccessGate::new(verifier),
            collection: collection.into(),
            feed,
            policy,
        }
    }
}
