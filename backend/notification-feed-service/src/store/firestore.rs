use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use nova_firebase_shared::FirestoreClient;
use std::sync::Arc;
use std::time::Duration;

use super::{SnapshotSource, SnapshotStream};
use crate::error::StoreError;
use crate::models::Snapshot;

/// Firestore-backed notifications collection
///
/// The REST API has no push channel, so the change stream re-reads the
/// collection every `poll_interval` and emits only when the full snapshot
/// differs from the last one emitted.
#[derive(Clone)]
pub struct FirestoreSnapshotSource {
    client: Arc<FirestoreClient>,
    poll_interval: Duration,
}

impl FirestoreSnapshotSource {
    pub fn new(client: Arc<FirestoreClient>, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
        }
    }
}

async fn fetch(client: &FirestoreClient, collection: &str) -> Result<Snapshot, StoreError> {
    client
        .list_documents(collection)
        .await
        .map(Snapshot::new)
        .map_err(|e| StoreError::Query(e.to_string()))
}

struct PollState {
    client: Arc<FirestoreClient>,
    collection: String,
    poll_interval: Duration,
    pending: Option<Snapshot>,
    last: Snapshot,
    failed: bool,
}

#[async_trait]
impl SnapshotSource for FirestoreSnapshotSource {
    async fn query(&self, collection: &str) -> Result<Snapshot, StoreError> {
        fetch(&self.client, collection).await
    }

    async fn subscribe(&self, collection: &str) -> Result<SnapshotStream, StoreError> {
        let initial = fetch(&self.client, collection)
            .await
            .map_err(|e| StoreError::Subscribe(e.to_string()))?;

        let state = PollState {
            client: self.client.clone(),
            collection: collection.to_string(),
            poll_interval: self.poll_interval,
            pending: Some(initial),
            last: Snapshot::default(),
            failed: false,
        };

        let stream = stream::unfold(state, |mut st| async move {
            if let Some(initial) = st.pending.take() {
                st.last = initial.clone();
                return Some((Ok(initial), st));
            }
            if st.failed {
                return None;
            }

            loop {
                tokio::time::sleep(st.poll_interval).await;
                match fetch(&st.client, &st.collection).await {
                    Ok(snapshot) if snapshot == st.last => continue,
                    Ok(snapshot) => {
                        st.last = snapshot.clone();
                        return Some((Ok(snapshot), st));
                    }
                    Err(e) => {
                        st.failed = true;
                        return Some((Err(StoreError::Stream(e.to_string())), st));
                    }
                }
            }
        });

        Ok(stream.boxed())
    }
}
