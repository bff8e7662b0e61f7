/// Snapshot sources
///
/// The feed consumes a collection through two operations only: a one-shot
/// query and a change stream that yields the full collection every time any
/// record changes.
///
/// Implementations:
/// 1. FirestoreSnapshotSource: Firestore REST reads with change detection
/// 2. InMemorySnapshotSource: watch-channel backed collection for tests and local runs

pub mod firestore;
pub mod memory;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::StoreError;
use crate::models::Snapshot;

pub use firestore::FirestoreSnapshotSource;
pub use memory::InMemorySnapshotSource;

/// Stream of full snapshots. The first item is the collection's contents at
/// registration time. An `Err` item or the end of the stream means the
/// registration is gone and must be re-established.
pub type SnapshotStream = BoxStream<'static, Result<Snapshot, StoreError>>;

#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Read the collection once
    async fn query(&self, collection: &str) -> Result<Snapshot, StoreError>;

    /// Register a change listener on the collection
    async fn subscribe(&self, collection: &str) -> Result<SnapshotStream, StoreError>;
}
