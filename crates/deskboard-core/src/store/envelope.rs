//! Namespaced envelope store over a single root blob

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use super::{BlobStorage, CollectionHandle};
use crate::error::Result;
use crate::util::unix_millis_now;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Source id used for writes that do not come from a binding.
pub(crate) const STORE_SOURCE: u64 = 0;

/// A stored value wrapped with its last-write timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub value: T,
    /// Write time (Unix ms)
    pub timestamp: i64,
}

/// Notification that a logical key changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub key: String,
    /// Binding that wrote the value; `0` for store-level writes and reloads
    pub source: u64,
}

#[derive(Default)]
struct RootState {
    values: Map<String, Value>,
    revisions: HashMap<String, u64>,
    /// Keys written in memory whose last persist failed.
    unpersisted: HashSet<String>,
}

impl RootState {
    fn bump(&mut self, key: &str) -> u64 {
        let revision = self.revisions.entry(key.to_string()).or_insert(0);
        *revision += 1;
        *revision
    }

    /// Adopt the durable values for every key except `skip` and keys whose
    /// in-memory value never reached storage. Returns the keys that changed.
    fn merge_durable(&mut self, fresh: Map<String, Value>, skip: Option<&str>) -> Vec<String> {
        let keep = |key: &str, unpersisted: &HashSet<String>| {
            skip == Some(key) || unpersisted.contains(key)
        };
        let mut changed = self
            .values
            .iter()
            .filter(|(key, value)| {
                !keep(key.as_str(), &self.unpersisted) && fresh.get(*key) != Some(*value)
            })
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();
        changed.extend(
            fresh
                .keys()
                .filter(|key| {
                    !keep(key.as_str(), &self.unpersisted) && !self.values.contains_key(*key)
                })
                .cloned(),
        );

        for key in &changed {
            match fresh.get(key) {
                Some(value) => {
                    self.values.insert(key.clone(), value.clone());
                }
                None => {
                    self.values.remove(key);
                }
            }
            self.bump(key);
        }
        changed
    }
}

/// Key-value store persisting every logical key inside one root blob.
///
/// `read` tolerates enveloped values, legacy bare values, and absent keys.
/// `write` never fails from the caller's point of view: the in-memory value
/// is always updated and persistence errors are logged.
///
/// Several processes may share one blob. Every mutation first folds in the
/// durable copy of the other keys, so a write only replaces its own key.
pub struct EnvelopeStore {
    root_key: String,
    storage: Arc<dyn BlobStorage>,
    state: RwLock<RootState>,
    changes: broadcast::Sender<StoreChange>,
    next_binding_id: AtomicU64,
}

impl EnvelopeStore {
    /// Open the store, loading the current blob for `root_key`.
    ///
    /// An unparseable blob is logged and treated as empty; storage I/O errors
    /// are returned so an unreadable store is never silently overwritten.
    pub fn open(root_key: impl Into<String>, storage: Arc<dyn BlobStorage>) -> Result<Self> {
        let root_key = root_key.into();
        let values = match storage.load(&root_key)? {
            Some(blob) => parse_root(&root_key, &blob),
            None => Map::new(),
        };
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        tracing::debug!(
            "Opened envelope store '{}' with {} key(s)",
            root_key,
            values.len()
        );
        Ok(Self {
            root_key,
            storage,
            state: RwLock::new(RootState {
                values,
                ..RootState::default()
            }),
            changes,
            next_binding_id: AtomicU64::new(STORE_SOURCE + 1),
        })
    }

    pub fn root_key(&self) -> &str {
        &self.root_key
    }

    /// Read a logical key, falling back to `default` when absent or unreadable.
    pub fn read<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.read_optional(key).unwrap_or(default)
    }

    /// Read a logical key; `None` when absent or not decodable as `T`.
    pub fn read_optional<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let stored = state.values.get(key)?;
        let (value, _) = unwrap_envelope(stored);
        match T::deserialize(value) {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!("Ignoring unreadable value for '{}': {}", key, error);
                None
            }
        }
    }

    /// Whether a value (enveloped or legacy) exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.values.contains_key(key)
    }

    /// Timestamp of the last enveloped write; `None` for legacy or absent values.
    pub fn envelope_timestamp(&self, key: &str) -> Option<i64> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.values.get(key).and_then(|stored| unwrap_envelope(stored).1)
    }

    /// In-process generation counter for `key`, bumped on every change.
    pub fn revision(&self, key: &str) -> u64 {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.revisions.get(key).copied().unwrap_or(0)
    }

    /// Write a logical key wrapped in a fresh envelope.
    pub fn write<T: Serialize>(&self, key: &str, value: &T) {
        self.write_from(key, value, STORE_SOURCE);
    }

    /// Write only if `key` is still at `expected_revision`.
    ///
    /// Returns `false` (and writes nothing) when another write landed since
    /// the caller read the key, including a write by another process that
    /// shares the durable blob.
    pub fn write_if_revision<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        expected_revision: u64,
    ) -> bool {
        let Some(value) = encode(key, value) else {
            return false;
        };
        let (written, refreshed) = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let refreshed = self.refresh_locked(&mut state, None);
            let written = state.revisions.get(key).copied().unwrap_or(0) == expected_revision;
            if written {
                self.apply_locked(&mut state, key, Some(value));
            }
            (written, refreshed)
        };
        self.notify_all(&refreshed);
        if written {
            self.notify(key, STORE_SOURCE);
        }
        written
    }

    /// Read, mutate and write `key` under one lock, so concurrent updaters
    /// never lose each other's changes.
    pub fn update<T, R>(&self, key: &str, default: T, mutate: impl FnOnce(&mut T) -> R) -> R
    where
        T: Serialize + DeserializeOwned,
    {
        let (result, refreshed) = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let refreshed = self.refresh_locked(&mut state, None);
            let mut value = state
                .values
                .get(key)
                .and_then(|stored| T::deserialize(unwrap_envelope(stored).0).ok())
                .unwrap_or(default);
            let result = mutate(&mut value);
            if let Some(encoded) = encode(key, &value) {
                self.apply_locked(&mut state, key, Some(encoded));
            }
            (result, refreshed)
        };
        self.notify_all(&refreshed);
        self.notify(key, STORE_SOURCE);
        result
    }

    /// Remove a logical key entirely.
    pub fn remove(&self, key: &str) {
        let (removed, refreshed) = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let refreshed = self.refresh_locked(&mut state, None);
            let removed = state.values.contains_key(key);
            if removed {
                self.apply_locked(&mut state, key, None);
            }
            (removed, refreshed)
        };
        self.notify_all(&refreshed);
        if removed {
            self.notify(key, STORE_SOURCE);
        }
    }

    /// Re-read the blob from durable storage and notify bindings of every
    /// key whose value changed. Used when another process rewrote the blob.
    ///
    /// Keys whose last write never reached storage keep their in-memory value.
    pub fn reload(&self) -> Result<Vec<String>> {
        let fresh = match self.storage.load(&self.root_key)? {
            Some(blob) => parse_root(&self.root_key, &blob),
            None => Map::new(),
        };

        let changed = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.merge_durable(fresh, None)
        };

        if !changed.is_empty() {
            tracing::debug!("Reloaded envelope store; changed keys: {:?}", changed);
        }
        self.notify_all(&changed);
        Ok(changed)
    }

    /// Subscribe to change notifications for every key.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    /// Create a typed binding to `key`.
    pub fn bind<T>(self: &Arc<Self>, key: impl Into<String>, default: T) -> CollectionHandle<T>
    where
        T: Serialize + DeserializeOwned + Clone,
    {
        let binding_id = self.next_binding_id.fetch_add(1, Ordering::Relaxed);
        CollectionHandle::new(Arc::clone(self), key.into(), default, binding_id)
    }

    pub(crate) fn write_from<T: Serialize>(&self, key: &str, value: &T, source: u64) {
        let Some(value) = encode(key, value) else {
            return;
        };
        let refreshed = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let refreshed = self.refresh_locked(&mut state, Some(key));
            self.apply_locked(&mut state, key, Some(value));
            refreshed
        };
        self.notify_all(&refreshed);
        self.notify(key, source);
    }

    /// Fold the durable blob into memory before a mutation.
    ///
    /// A blob that cannot be loaded or parsed is skipped and the in-memory
    /// state is kept.
    fn refresh_locked(&self, state: &mut RootState, skip: Option<&str>) -> Vec<String> {
        let fresh = match self.storage.load(&self.root_key) {
            Ok(Some(blob)) => match serde_json::from_str::<Value>(&blob) {
                Ok(Value::Object(values)) => values,
                _ => return Vec::new(),
            },
            Ok(None) => Map::new(),
            Err(error) => {
                tracing::warn!(
                    "Failed to re-read envelope store '{}' before writing: {}",
                    self.root_key,
                    error
                );
                return Vec::new();
            }
        };
        state.merge_durable(fresh, skip)
    }

    /// Mutate memory, then persist the whole root while still holding the
    /// lock so blobs reach storage in write order.
    fn apply_locked(&self, state: &mut RootState, key: &str, value: Option<Value>) {
        match value {
            Some(value) => {
                let envelope = Envelope {
                    value,
                    timestamp: unix_millis_now(),
                };
                match serde_json::to_value(envelope) {
                    Ok(envelope) => {
                        state.values.insert(key.to_string(), envelope);
                    }
                    Err(error) => {
                        tracing::error!("Failed to wrap '{}' in an envelope: {}", key, error);
                        return;
                    }
                }
            }
            None => {
                state.values.remove(key);
            }
        }
        state.bump(key);

        match serde_json::to_string(&state.values) {
            Ok(blob) => match self.storage.save(&self.root_key, &blob) {
                Ok(()) => state.unpersisted.clear(),
                Err(error) => {
                    state.unpersisted.insert(key.to_string());
                    tracing::error!(
                        "Failed to persist envelope store after writing '{}': {}",
                        key,
                        error
                    );
                }
            },
            Err(error) => {
                tracing::error!("Failed to serialize envelope store: {}", error);
            }
        }
    }

    fn notify_all(&self, keys: &[String]) {
        for key in keys {
            self.notify(key, STORE_SOURCE);
        }
    }

    fn notify(&self, key: &str, source: u64) {
        // No receivers is fine: nobody is bound yet.
        let _ = self.changes.send(StoreChange {
            key: key.to_string(),
            source,
        });
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> Option<Value> {
    match serde_json::to_value(value) {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::error!("Failed to serialize value for '{}': {}", key, error);
            None
        }
    }
}

fn parse_root(root_key: &str, blob: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(blob) {
        Ok(Value::Object(values)) => values,
        Ok(_) => {
            tracing::warn!("Root blob '{}' is not an object; starting empty", root_key);
            Map::new()
        }
        Err(error) => {
            tracing::warn!(
                "Root blob '{}' is not valid JSON ({}); starting empty",
                root_key,
                error
            );
            Map::new()
        }
    }
}

/// Split a stored value into its logical value and envelope timestamp.
///
/// Anything that is not an object holding both `value` and a numeric
/// `timestamp` is a legacy bare value.
fn unwrap_envelope(stored: &Value) -> (&Value, Option<i64>) {
    if let Value::Object(fields) = stored {
        if let (Some(value), Some(timestamp)) = (
            fields.get("value"),
            fields.get("timestamp").and_then(Value::as_i64),
        ) {
            return (value, Some(timestamp));
        }
    }
    (stored, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBlobStorage;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn open_with(blob: Option<&str>) -> (Arc<MemoryBlobStorage>, EnvelopeStore) {
        let storage = Arc::new(MemoryBlobStorage::new());
        if let Some(blob) = blob {
            storage.save("root", blob).unwrap();
        }
        let store = EnvelopeStore::open("root", storage.clone()).unwrap();
        (storage, store)
    }

    #[test]
    fn test_absent_key_returns_default() {
        let (_, store) = open_with(None);
        assert_eq!(store.read("notes", vec![1, 2]), vec![1, 2]);
        assert!(!store.contains("notes"));
    }

    #[test]
    fn test_bare_and_enveloped_values_read_identically() {
        let (_, store) = open_with(Some(
            r#"{
                "legacy": {"title": "x", "count": 3},
                "wrapped": {"value": {"title": "x", "count": 3}, "timestamp": 42}
            }"#,
        ));
        let legacy: Value = store.read("legacy", Value::Null);
        let wrapped: Value = store.read("wrapped", Value::Null);
        assert_eq!(legacy, wrapped);
        assert_eq!(store.envelope_timestamp("legacy"), None);
        assert_eq!(store.envelope_timestamp("wrapped"), Some(42));
    }

    #[test]
    fn test_write_persists_envelope_in_root_blob() {
        let (storage, store) = open_with(None);
        store.write("todos", &vec!["a"]);

        let blob: Value = serde_json::from_str(&storage.load("root").unwrap().unwrap()).unwrap();
        assert_eq!(blob["todos"]["value"], json!(["a"]));
        assert!(blob["todos"]["timestamp"].as_i64().unwrap() > 0);
        assert_eq!(store.read::<Vec<String>>("todos", vec![]), vec!["a"]);
    }

    #[test]
    fn test_write_rewrites_whole_blob_preserving_other_keys() {
        let (storage, store) = open_with(Some(r#"{"notes": [1]}"#));
        store.write("events", &json!([]));

        let blob: Value = serde_json::from_str(&storage.load("root").unwrap().unwrap()).unwrap();
        assert_eq!(blob["notes"], json!([1]));
        assert_eq!(blob["events"]["value"], json!([]));
    }

    #[test]
    fn test_storage_failure_keeps_in_memory_value() {
        let (storage, store) = open_with(None);
        storage.set_fail_writes(true);
        store.write("notes", &vec![7]);
        assert_eq!(store.read::<Vec<i32>>("notes", vec![]), vec![7]);
        assert_eq!(storage.load("root").unwrap(), None);
    }

    #[test]
    fn test_corrupt_blob_starts_empty() {
        let (_, store) = open_with(Some("not json"));
        assert_eq!(store.read("notes", 0), 0);
    }

    #[test]
    fn test_type_mismatch_falls_back_to_default() {
        let (_, store) = open_with(Some(r#"{"notes": "oops"}"#));
        assert_eq!(store.read::<Vec<i32>>("notes", vec![]), Vec::<i32>::new());
    }

    #[test]
    fn test_write_if_revision_rejects_stale_writer() {
        let (_, store) = open_with(None);
        let seen = store.revision("notes");
        store.write("notes", &vec![1]);
        assert!(!store.write_if_revision("notes", &vec![2], seen));
        assert_eq!(store.read::<Vec<i32>>("notes", vec![]), vec![1]);

        let current = store.revision("notes");
        assert!(store.write_if_revision("notes", &vec![3], current));
        assert_eq!(store.read::<Vec<i32>>("notes", vec![]), vec![3]);
    }

    #[test]
    fn test_update_mutates_in_place_and_bumps_revision() {
        let (_, store) = open_with(Some(r#"{"notes": [1]}"#));
        let before = store.revision("notes");

        let len = store.update("notes", Vec::<i32>::new(), |notes| {
            notes.push(2);
            notes.len()
        });

        assert_eq!(len, 2);
        assert_eq!(store.read::<Vec<i32>>("notes", vec![]), vec![1, 2]);
        assert!(store.revision("notes") > before);
        assert!(store.envelope_timestamp("notes").is_some());
    }

    #[test]
    fn test_remove_deletes_key_and_persists() {
        let (storage, store) = open_with(Some(r#"{"marker": true}"#));
        store.remove("marker");
        assert!(!store.contains("marker"));
        assert_eq!(storage.load("root").unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn test_reload_reports_external_changes() {
        let (storage, store) = open_with(Some(r#"{"notes": [1], "todos": []}"#));
        let mut changes = store.subscribe();

        storage
            .save("root", r#"{"notes": [1, 2], "todos": [], "events": []}"#)
            .unwrap();
        let mut changed = store.reload().unwrap();
        changed.sort();

        assert_eq!(changed, vec!["events".to_string(), "notes".to_string()]);
        assert_eq!(store.read::<Vec<i32>>("notes", vec![]), vec![1, 2]);
        assert_eq!(changes.try_recv().unwrap().source, STORE_SOURCE);
    }

    #[test]
    fn test_write_keeps_keys_written_by_another_store() {
        let storage = Arc::new(MemoryBlobStorage::new());
        let watcher = EnvelopeStore::open("root", storage.clone()).unwrap();
        let editor = EnvelopeStore::open("root", storage.clone()).unwrap();

        editor.write("notes", &vec!["typed elsewhere"]);
        watcher.write("todos", &vec!["buy milk"]);

        let blob: Value = serde_json::from_str(&storage.load("root").unwrap().unwrap()).unwrap();
        assert_eq!(blob["notes"]["value"], json!(["typed elsewhere"]));
        assert_eq!(blob["todos"]["value"], json!(["buy milk"]));
        assert_eq!(
            watcher.read::<Vec<String>>("notes", vec![]),
            vec!["typed elsewhere"]
        );
    }

    #[test]
    fn test_write_if_revision_sees_write_by_another_store() {
        let storage = Arc::new(MemoryBlobStorage::new());
        let watcher = EnvelopeStore::open("root", storage.clone()).unwrap();
        let editor = EnvelopeStore::open("root", storage.clone()).unwrap();

        let seen = watcher.revision("notes");
        editor.write("notes", &vec![1]);

        assert!(!watcher.write_if_revision("notes", &vec![2], seen));
        assert_eq!(watcher.read::<Vec<i32>>("notes", vec![]), vec![1]);
        let blob: Value = serde_json::from_str(&storage.load("root").unwrap().unwrap()).unwrap();
        assert_eq!(blob["notes"]["value"], json!([1]));
    }

    #[test]
    fn test_reload_keeps_value_that_failed_to_persist() {
        let (storage, store) = open_with(Some(r#"{"notes": [1]}"#));
        storage.set_fail_writes(true);
        store.write("todos", &vec![7]);

        let changed = store.reload().unwrap();
        assert!(changed.is_empty());
        assert_eq!(store.read::<Vec<i32>>("todos", vec![]), vec![7]);
    }
}
