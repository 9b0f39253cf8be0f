//! In-process remote backend
//!
//! Keeps rows in memory, records every call it receives and can be told to
//! fail.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;

use super::remote::{ProfileService, RemoteBackend};
use super::{SyncError, SyncResult};
use crate::models::{Collection, Profile, RecordId, RemoteRow, SubscriptionStatus};

/// Kind of remote operation, used for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    Select,
    Upsert,
    Delete,
    UpdateFields,
    Profile,
}

/// One call as observed by [`MemoryRemote`].
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    Select {
        collection: Collection,
        user_id: String,
    },
    Upsert {
        collection: Collection,
        ids: Vec<String>,
    },
    Delete {
        collection: Collection,
        ids: Vec<String>,
    },
    UpdateFields {
        collection: Collection,
        id: String,
        fields: RemoteRow,
    },
    FetchProfile {
        user_id: String,
    },
    FetchSubscription {
        user_id: String,
    },
    SetCloudSyncEnabled {
        user_id: String,
        enabled: bool,
    },
    SetLastSynced {
        user_id: String,
        synced_at: i64,
    },
}

impl RemoteCall {
    const fn op(&self) -> RemoteOp {
        match self {
            Self::Select { .. } => RemoteOp::Select,
            Self::Upsert { .. } => RemoteOp::Upsert,
            Self::Delete { .. } => RemoteOp::Delete,
            Self::UpdateFields { .. } => RemoteOp::UpdateFields,
            Self::FetchProfile { .. }
            | Self::FetchSubscription { .. }
            | Self::SetCloudSyncEnabled { .. }
            | Self::SetLastSynced { .. } => RemoteOp::Profile,
        }
    }

    /// Collection a row call targets; `None` for profile calls.
    pub const fn collection(&self) -> Option<Collection> {
        match self {
            Self::Select { collection, .. }
            | Self::Upsert { collection, .. }
            | Self::Delete { collection, .. }
            | Self::UpdateFields { collection, .. } => Some(*collection),
            _ => None,
        }
    }

    /// Whether this call modifies remote rows.
    pub const fn is_write(&self) -> bool {
        matches!(
            self,
            Self::Upsert { .. } | Self::Delete { .. } | Self::UpdateFields { .. }
        )
    }
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<Collection, BTreeMap<String, RemoteRow>>,
    profiles: HashMap<String, Profile>,
    subscriptions: HashMap<String, SubscriptionStatus>,
    calls: Vec<RemoteCall>,
    offline: bool,
    failing: HashSet<RemoteOp>,
    fail_next: HashSet<RemoteOp>,
}

/// Remote backend and profile service held entirely in memory.
#[derive(Default)]
pub struct MemoryRemote {
    state: Mutex<MemoryState>,
    latency: Mutex<Option<Duration>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with an API error until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Every call of kind `op` fails until [`MemoryRemote::clear_failures`].
    pub fn fail_always(&self, op: RemoteOp) {
        self.lock().failing.insert(op);
    }

    /// Only the next call of kind `op` fails.
    pub fn fail_next(&self, op: RemoteOp) {
        self.lock().fail_next.insert(op);
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.failing.clear();
        state.fail_next.clear();
        state.offline = false;
    }

    /// Delay every call; lets tests hold a pass in flight.
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut slot) = self.latency.lock() {
            *slot = latency;
        }
    }

    pub fn set_profile(&self, profile: Profile) {
        self.lock()
            .profiles
            .insert(profile.user_id.clone(), profile);
    }

    pub fn set_subscription(&self, user_id: &str, status: SubscriptionStatus) {
        self.lock()
            .subscriptions
            .insert(user_id.to_string(), status);
    }

    pub fn profile(&self, user_id: &str) -> Option<Profile> {
        self.lock().profiles.get(user_id).cloned()
    }

    /// Seed a row directly, bypassing call recording.
    pub fn insert_row(&self, collection: Collection, row: RemoteRow) {
        if let Some(key) = row_key(collection, &row) {
            self.lock()
                .tables
                .entry(collection)
                .or_default()
                .insert(key, row);
        }
    }

    /// Rows of `user_id` currently held, ordered by key.
    pub fn rows(&self, collection: Collection, user_id: &str) -> Vec<RemoteRow> {
        self.lock()
            .tables
            .get(&collection)
            .map(|table| {
                table
                    .values()
                    .filter(|row| owned_by(row, user_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    /// Row calls that modified `collection`.
    pub fn writes_to(&self, collection: Collection) -> Vec<RemoteCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.is_write() && call.collection() == Some(collection))
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn current_latency(&self) -> Option<Duration> {
        self.latency.lock().ok().and_then(|slot| *slot)
    }

    /// Record the call, wait out the configured latency, then decide whether
    /// it fails.
    async fn enter(&self, call: RemoteCall) -> SyncResult<()> {
        let op = call.op();
        let description = format!("{call:?}");
        self.lock().calls.push(call);

        if let Some(latency) = self.current_latency() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        let fails = state.offline || state.failing.contains(&op) || state.fail_next.remove(&op);
        if fails {
            tracing::debug!("Injected remote failure for {}", description);
            return Err(SyncError::Api(format!("injected failure for {op:?}")));
        }
        Ok(())
    }
}

fn owned_by(row: &RemoteRow, user_id: &str) -> bool {
    row.get("user_id").and_then(Value::as_str) == Some(user_id)
}

fn row_key(collection: Collection, row: &RemoteRow) -> Option<String> {
    let column = if collection.is_record_collection() {
        "id"
    } else {
        "user_id"
    };
    row.get(column).and_then(Value::as_str).map(str::to_string)
}

fn row_ids(collection: Collection, rows: &[RemoteRow]) -> Vec<String> {
    rows.iter()
        .filter_map(|row| row_key(collection, row))
        .collect()
}

impl RemoteBackend for MemoryRemote {
    async fn select_all(&self, collection: Collection, user_id: &str) -> SyncResult<Vec<RemoteRow>> {
        self.enter(RemoteCall::Select {
            collection,
            user_id: user_id.to_string(),
        })
        .await?;
        Ok(self.rows(collection, user_id))
    }

    async fn upsert(&self, collection: Collection, rows: Vec<RemoteRow>) -> SyncResult<()> {
        self.enter(RemoteCall::Upsert {
            collection,
            ids: row_ids(collection, &rows),
        })
        .await?;

        let mut state = self.lock();
        let table = state.tables.entry(collection).or_default();
        for row in rows {
            let Some(key) = row_key(collection, &row) else {
                return Err(SyncError::InvalidPayload(format!(
                    "{collection} row without a key column"
                )));
            };
            table.insert(key, row);
        }
        Ok(())
    }

    async fn delete(&self, collection: Collection, user_id: &str, ids: &[RecordId]) -> SyncResult<()> {
        self.enter(RemoteCall::Delete {
            collection,
            ids: ids.iter().map(ToString::to_string).collect(),
        })
        .await?;

        let mut state = self.lock();
        if let Some(table) = state.tables.get_mut(&collection) {
            for id in ids {
                if table.get(id.as_str()).is_some_and(|row| owned_by(row, user_id)) {
                    table.remove(id.as_str());
                }
            }
        }
        Ok(())
    }

    async fn update_fields(
        &self,
        collection: Collection,
        user_id: &str,
        id: &RecordId,
        fields: RemoteRow,
    ) -> SyncResult<()> {
        self.enter(RemoteCall::UpdateFields {
            collection,
            id: id.to_string(),
            fields: fields.clone(),
        })
        .await?;

        let mut state = self.lock();
        if let Some(row) = state
            .tables
            .get_mut(&collection)
            .and_then(|table| table.get_mut(id.as_str()))
            .filter(|row| owned_by(row, user_id))
        {
            row.extend(fields);
        }
        Ok(())
    }
}

impl ProfileService for MemoryRemote {
    async fn fetch_profile(&self, user_id: &str) -> SyncResult<Profile> {
        self.enter(RemoteCall::FetchProfile {
            user_id: user_id.to_string(),
        })
        .await?;
        Ok(self
            .profile(user_id)
            .unwrap_or_else(|| Profile::new(user_id)))
    }

    async fn fetch_subscription(&self, user_id: &str) -> SyncResult<SubscriptionStatus> {
        self.enter(RemoteCall::FetchSubscription {
            user_id: user_id.to_string(),
        })
        .await?;
        Ok(self
            .lock()
            .subscriptions
            .get(user_id)
            .copied()
            .unwrap_or_default())
    }

    async fn set_cloud_sync_enabled(&self, user_id: &str, enabled: bool) -> SyncResult<()> {
        self.enter(RemoteCall::SetCloudSyncEnabled {
            user_id: user_id.to_string(),
            enabled,
        })
        .await?;
        self.lock()
            .profiles
            .entry(user_id.to_string())
            .or_insert_with(|| Profile::new(user_id))
            .cloud_sync_enabled = enabled;
        Ok(())
    }

    async fn set_last_synced(&self, user_id: &str, synced_at: i64) -> SyncResult<()> {
        self.enter(RemoteCall::SetLastSynced {
            user_id: user_id.to_string(),
            synced_at,
        })
        .await?;
        self.lock()
            .profiles
            .entry(user_id.to_string())
            .or_insert_with(|| Profile::new(user_id))
            .last_synced = Some(synced_at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> RemoteRow {
        match value {
            Value::Object(row) => row,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_rows_are_scoped_by_user() {
        let remote = MemoryRemote::new();
        remote.insert_row(Collection::Notes, row(json!({"id": "a", "user_id": "u1"})));
        remote.insert_row(Collection::Notes, row(json!({"id": "b", "user_id": "u2"})));

        let rows = remote.select_all(Collection::Notes, "u1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!("a"));
    }

    #[tokio::test]
    async fn test_pomodoro_rows_are_keyed_by_user() {
        let remote = MemoryRemote::new();
        let first = row(json!({"user_id": "u1", "work_minutes": 25}));
        let second = row(json!({"user_id": "u1", "work_minutes": 50}));
        remote
            .upsert(Collection::PomodoroSettings, vec![first])
            .await
            .unwrap();
        remote
            .upsert(Collection::PomodoroSettings, vec![second])
            .await
            .unwrap();

        let rows = remote.rows(Collection::PomodoroSettings, "u1");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["work_minutes"], json!(50));
    }

    #[tokio::test]
    async fn test_delete_ignores_other_users_rows() {
        let remote = MemoryRemote::new();
        remote.insert_row(Collection::Todos, row(json!({"id": "a", "user_id": "u2"})));
        remote
            .delete(Collection::Todos, "u1", &[RecordId::from("a")])
            .await
            .unwrap();
        assert_eq!(remote.rows(Collection::Todos, "u2").len(), 1);
    }

    #[tokio::test]
    async fn test_update_fields_patches_row() {
        let remote = MemoryRemote::new();
        remote.insert_row(
            Collection::Todos,
            row(json!({"id": "a", "user_id": "u1", "text": "x", "completed": false})),
        );
        remote
            .update_fields(
                Collection::Todos,
                "u1",
                &RecordId::from("a"),
                row(json!({"completed": true})),
            )
            .await
            .unwrap();
        let rows = remote.rows(Collection::Todos, "u1");
        assert_eq!(rows[0]["completed"], json!(true));
        assert_eq!(rows[0]["text"], json!("x"));
    }

    #[tokio::test]
    async fn test_fail_next_fails_once_and_still_records_call() {
        let remote = MemoryRemote::new();
        remote.fail_next(RemoteOp::Select);

        assert!(remote.select_all(Collection::Notes, "u1").await.is_err());
        assert!(remote.select_all(Collection::Notes, "u1").await.is_ok());
        assert_eq!(remote.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_offline_fails_everything() {
        let remote = MemoryRemote::new();
        remote.set_offline(true);
        assert!(remote.fetch_profile("u1").await.is_err());
        assert!(remote
            .upsert(Collection::Notes, vec![row(json!({"id": "a", "user_id": "u1"}))])
            .await
            .is_err());
        assert!(remote.rows(Collection::Notes, "u1").is_empty());

        remote.clear_failures();
        assert_eq!(
            remote.fetch_profile("u1").await.unwrap(),
            Profile::new("u1")
        );
    }

    #[tokio::test]
    async fn test_profile_updates_are_persisted() {
        let remote = MemoryRemote::new();
        remote.set_cloud_sync_enabled("u1", true).await.unwrap();
        remote.set_last_synced("u1", 42).await.unwrap();

        let profile = remote.fetch_profile("u1").await.unwrap();
        assert!(profile.cloud_sync_enabled);
        assert_eq!(profile.last_synced, Some(42));
        assert_eq!(
            remote.fetch_subscription("u1").await.unwrap(),
            SubscriptionStatus::None
        );
    }
}
