//! The published `kid → key` snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::key::KeyEntry;

/// An immutable mapping from key ID to key entry, published as a whole by
/// one refresh.
pub type Snapshot = HashMap<String, Arc<KeyEntry>>;

/// Read-heavy store holding the current snapshot.
///
/// Readers clone the snapshot `Arc` and never block each other; a refresh
/// swaps the pointer under the writer lock, so a reader observes either
/// the pre-refresh or the post-refresh mapping, never a mix.
pub(crate) struct KeyStore {
    snapshot: RwLock<Arc<Snapshot>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Snapshot::new())),
        }
    }

    /// Entry for `kid` in the current snapshot.
    pub async fn get(&self, kid: &str) -> Option<Arc<KeyEntry>> {
        self.snapshot.read().await.get(kid).cloned()
    }

    /// The current snapshot as a whole.
    pub async fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&*self.snapshot.read().await)
    }

    /// Atomically replace the published snapshot.
    pub async fn swap(&self, next: Arc<Snapshot>) {
        *self.snapshot.write().await = next;
    }
}
