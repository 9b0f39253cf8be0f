//! Everything a sync pass needs, passed explicitly

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

use crate::models::Collection;
use crate::store::EnvelopeStore;

/// Store key under which completed bootstrap passes are remembered.
pub const BOOTSTRAP_KEY: &str = "sync-bootstrap";

/// One async lock per collection. Sync passes and explicit remote writes of
/// the same collection take it, so they never interleave.
#[derive(Debug, Default)]
pub struct CollectionLocks {
    locks: [Mutex<()>; 4],
}

impl CollectionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, collection: Collection) -> MutexGuard<'_, ()> {
        self.locks[collection.index()].lock().await
    }
}

/// Signed-in user, local store and remote backend for one pass.
pub struct SyncContext<B> {
    pub user_id: String,
    pub store: Arc<EnvelopeStore>,
    pub remote: Arc<B>,
    locks: Arc<CollectionLocks>,
}

impl<B> Clone for SyncContext<B> {
    fn clone(&self) -> Self {
        Self {
            user_id: self.user_id.clone(),
            store: Arc::clone(&self.store),
            remote: Arc::clone(&self.remote),
            locks: Arc::clone(&self.locks),
        }
    }
}

impl<B> SyncContext<B> {
    pub fn new(
        user_id: impl Into<String>,
        store: Arc<EnvelopeStore>,
        remote: Arc<B>,
        locks: Arc<CollectionLocks>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            store,
            remote,
            locks,
        }
    }

    pub async fn lock(&self, collection: Collection) -> MutexGuard<'_, ()> {
        self.locks.acquire(collection).await
    }

    /// Whether `collection` has not yet completed a pass for this user.
    pub fn needs_bootstrap(&self, collection: Collection) -> bool {
        let marker = self.bootstrap_marker();
        marker.user_id.as_deref() != Some(self.user_id.as_str())
            || !marker.collections.contains(&collection)
    }

    /// Remember that `collection` completed a pass for this user. A marker
    /// left by another user is discarded.
    pub fn mark_bootstrapped(&self, collection: Collection) {
        let mut marker = self.bootstrap_marker();
        if marker.user_id.as_deref() != Some(self.user_id.as_str()) {
            marker = BootstrapMarker {
                user_id: Some(self.user_id.clone()),
                collections: Vec::new(),
            };
        }
        if !marker.collections.contains(&collection) {
            marker.collections.push(collection);
            self.store.write(BOOTSTRAP_KEY, &marker);
        }
    }

    fn bootstrap_marker(&self) -> BootstrapMarker {
        self.store.read(BOOTSTRAP_KEY, BootstrapMarker::default())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct BootstrapMarker {
    user_id: Option<String>,
    collections: Vec<Collection>,
}
