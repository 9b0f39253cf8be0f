//! Typed read/write binding to one logical key

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast::Receiver;

use super::{EnvelopeStore, StoreChange};

/// A live, typed view of one key in an [`EnvelopeStore`].
///
/// Several bindings to the same key may coexist (one per widget or task);
/// a write through one is observed by the others on their next access,
/// without a shared in-memory singleton.
pub struct CollectionHandle<T> {
    store: Arc<EnvelopeStore>,
    key: String,
    default: T,
    value: T,
    binding_id: u64,
    changes: Receiver<StoreChange>,
}

impl<T> CollectionHandle<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    pub(crate) fn new(store: Arc<EnvelopeStore>, key: String, default: T, binding_id: u64) -> Self {
        let changes = store.subscribe();
        let value = store.read(&key, default.clone());
        Self {
            store,
            key,
            default,
            value,
            binding_id,
            changes,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current value, after applying writes made by other bindings.
    pub fn get(&mut self) -> &T {
        self.refresh();
        &self.value
    }

    /// Replace the value; memory first, then the envelope store.
    pub fn set(&mut self, value: T) {
        self.refresh();
        self.store.write_from(&self.key, &value, self.binding_id);
        self.value = value;
    }

    /// Mutate the value in place and persist the result.
    pub fn update<R>(&mut self, mutate: impl FnOnce(&mut T) -> R) -> R {
        self.refresh();
        let result = mutate(&mut self.value);
        self.store
            .write_from(&self.key, &self.value, self.binding_id);
        result
    }

    /// Apply pending change notifications. Returns `true` if the cached
    /// value was re-read from the store.
    pub fn refresh(&mut self) -> bool {
        let mut stale = false;
        loop {
            match self.changes.try_recv() {
                Ok(change) => stale |= self.concerns_me(&change),
                Err(TryRecvError::Lagged(_)) => stale = true,
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        if stale {
            self.reload_value();
        }
        stale
    }

    /// Wait until another writer changes this key, then re-read it.
    ///
    /// Returns `false` once the store has been dropped.
    pub async fn changed(&mut self) -> bool {
        loop {
            match self.changes.recv().await {
                Ok(change) if self.concerns_me(&change) => {
                    self.reload_value();
                    return true;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => {
                    self.reload_value();
                    return true;
                }
                Err(RecvError::Closed) => return false,
            }
        }
    }

    fn concerns_me(&self, change: &StoreChange) -> bool {
        change.key == self.key && change.source != self.binding_id
    }

    fn reload_value(&mut self) {
        self.value = self.store.read(&self.key, self.default.clone());
    }
}
