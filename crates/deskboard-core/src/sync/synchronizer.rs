//! One sync pass for one collection

use super::context::SyncContext;
use super::reconcile::{reconcile, ReconcileMode};
use super::remote::RemoteBackend;
use super::SyncResult;
use crate::models::{Collection, Event, Note, PomodoroSettings, SyncRecord, Todo};

/// What a single pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub collection: Collection,
    /// The pass adopted remote-only records instead of deleting them.
    pub bootstrap: bool,
    /// Records in the local collection after the pass.
    pub merged: usize,
    pub upserted: usize,
    pub deleted: usize,
    /// Records whose remote version replaced or joined the local one.
    pub adopted: usize,
    /// Remote rows that could not be parsed and were left alone.
    pub skipped_rows: usize,
    /// A local write landed mid-pass, so the merged result was not written
    /// and no deletions were sent.
    pub local_write_skipped: bool,
}

impl SyncReport {
    const fn empty(collection: Collection, bootstrap: bool) -> Self {
        Self {
            collection,
            bootstrap,
            merged: 0,
            upserted: 0,
            deleted: 0,
            adopted: 0,
            skipped_rows: 0,
            local_write_skipped: false,
        }
    }
}

/// Run a pass for `collection`.
pub async fn sync_collection<B: RemoteBackend>(
    ctx: &SyncContext<B>,
    collection: Collection,
) -> SyncResult<SyncReport> {
    match collection {
        Collection::Notes => sync_records::<Note, B>(ctx).await,
        Collection::Todos => sync_records::<Todo, B>(ctx).await,
        Collection::Events => sync_records::<Event, B>(ctx).await,
        Collection::PomodoroSettings => sync_pomodoro(ctx).await,
    }
}

/// Reconcile an id-keyed collection against the remote table.
///
/// The pass starts from the durable copy, so writes by other processes
/// sharing the store are seen. The merged result is written locally only if
/// the collection did not change while the remote was being read; when it
/// did, no deletions are sent and a first pass stays a first pass. Upserts
/// and deletes are both attempted even if one fails; the first failure is
/// returned.
pub async fn sync_records<T: SyncRecord, B: RemoteBackend>(
    ctx: &SyncContext<B>,
) -> SyncResult<SyncReport> {
    let collection = T::COLLECTION;
    let key = collection.store_key();
    let _guard = ctx.lock(collection).await;
    ctx.store.reload()?;

    let revision = ctx.store.revision(key);
    let local: Vec<T> = ctx.store.read(key, Vec::new());
    let rows = ctx.remote.select_all(collection, &ctx.user_id).await?;

    let mut skipped_rows = 0;
    let mut remote = Vec::with_capacity(rows.len());
    for row in rows {
        match T::from_row(row) {
            Ok(record) => remote.push(record),
            Err(error) => {
                skipped_rows += 1;
                tracing::warn!("Skipping unreadable {} row: {}", collection, error);
            }
        }
    }

    let bootstrap = ctx.needs_bootstrap(collection);
    let mode = if bootstrap {
        ReconcileMode::Bootstrap
    } else {
        ReconcileMode::Propagate
    };
    let outcome = reconcile(&local, &remote, mode);

    let mut report = SyncReport::empty(collection, bootstrap);
    report.merged = outcome.merged.len();
    report.adopted = outcome.adopted.len();
    report.skipped_rows = skipped_rows;

    if outcome.merged != local && !ctx.store.write_if_revision(key, &outcome.merged, revision) {
        report.local_write_skipped = true;
        tracing::debug!(
            "Local {} changed during sync; merged result deferred to next pass",
            collection
        );
    }

    let upsert_result = if outcome.upserts.is_empty() {
        Ok(())
    } else {
        let rows = outcome
            .upserts
            .iter()
            .map(|record| record.to_row(&ctx.user_id))
            .collect();
        ctx.remote.upsert(collection, rows).await
    };
    let delete_result = if outcome.deletes.is_empty() || report.local_write_skipped {
        Ok(())
    } else {
        ctx.remote
            .delete(collection, &ctx.user_id, &outcome.deletes)
            .await
    };

    if let Err(error) = &upsert_result {
        tracing::warn!("Failed to push {} upserts: {}", collection, error);
    } else {
        report.upserted = outcome.upserts.len();
    }
    if let Err(error) = &delete_result {
        tracing::warn!("Failed to push {} deletions: {}", collection, error);
    } else if !report.local_write_skipped {
        report.deleted = outcome.deletes.len();
    }
    upsert_result?;
    delete_result?;

    if bootstrap && !report.local_write_skipped {
        ctx.mark_bootstrapped(collection);
    }

    tracing::debug!(
        "Synced {}: {} records, {} upserted, {} deleted, {} adopted",
        collection,
        report.merged,
        report.upserted,
        report.deleted,
        report.adopted
    );
    Ok(report)
}

/// Push the pomodoro aggregate.
///
/// The settings are a singleton without timestamps, so they are not
/// reconciled: local overwrites remote. On the user's first pass, a device
/// that never stored settings adopts the remote copy instead.
pub async fn sync_pomodoro<B: RemoteBackend>(ctx: &SyncContext<B>) -> SyncResult<SyncReport> {
    let collection = Collection::PomodoroSettings;
    let key = collection.store_key();
    let _guard = ctx.lock(collection).await;
    ctx.store.reload()?;

    let bootstrap = ctx.needs_bootstrap(collection);
    let mut report = SyncReport::empty(collection, bootstrap);
    report.merged = 1;

    if bootstrap && !ctx.store.contains(key) {
        let revision = ctx.store.revision(key);
        let rows = ctx.remote.select_all(collection, &ctx.user_id).await?;
        if let Some(row) = rows.into_iter().next() {
            match PomodoroSettings::from_row(row) {
                Ok(settings) => {
                    if ctx.store.write_if_revision(key, &settings, revision) {
                        report.adopted = 1;
                        ctx.mark_bootstrapped(collection);
                        tracing::debug!("Adopted remote {}", collection);
                        return Ok(report);
                    }
                }
                Err(error) => {
                    report.skipped_rows = 1;
                    tracing::warn!("Ignoring unreadable {} row: {}", collection, error);
                }
            }
        }
    }

    let settings = ctx
        .store
        .read(key, PomodoroSettings::default())
        .normalized();
    ctx.remote
        .upsert(collection, vec![settings.to_row(&ctx.user_id)])
        .await?;
    report.upserted = 1;

    if bootstrap {
        ctx.mark_bootstrapped(collection);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::models::{AlarmSound, RecordId};
    use crate::store::{EnvelopeStore, MemoryBlobStorage};
    use crate::sync::{CollectionLocks, MemoryRemote, RemoteCall, RemoteOp};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Fixture {
        store: Arc<EnvelopeStore>,
        remote: Arc<MemoryRemote>,
        ctx: SyncContext<MemoryRemote>,
    }

    fn fixture() -> Fixture {
        let store =
            Arc::new(EnvelopeStore::open("root", Arc::new(MemoryBlobStorage::new())).unwrap());
        let remote = Arc::new(MemoryRemote::new());
        let ctx = SyncContext::new(
            "u1",
            Arc::clone(&store),
            Arc::clone(&remote),
            Arc::new(CollectionLocks::new()),
        );
        Fixture { store, remote, ctx }
    }

    fn todo(id: &str, text: &str, updated_at: i64) -> Todo {
        Todo {
            id: RecordId::from(id),
            text: text.to_string(),
            completed: false,
            created_at: 1,
            updated_at,
        }
    }

    fn local_todos(store: &EnvelopeStore) -> Vec<Todo> {
        store.read("todos", Vec::new())
    }

    #[tokio::test]
    async fn test_first_pass_pushes_local_and_adopts_remote() {
        let f = fixture();
        f.store.write("todos", &vec![todo("local", "mine", 10)]);
        f.remote
            .insert_row(Collection::Todos, todo("phone", "theirs", 20).to_row("u1"));

        let report = sync_records::<Todo, _>(&f.ctx).await.unwrap();

        assert!(report.bootstrap);
        assert_eq!(report.upserted, 1);
        assert_eq!(report.deleted, 0);
        assert_eq!(report.adopted, 1);
        let ids: Vec<String> = local_todos(&f.store)
            .iter()
            .map(|todo| todo.id.to_string())
            .collect();
        assert_eq!(ids, vec!["phone", "local"]);
        assert_eq!(f.remote.rows(Collection::Todos, "u1").len(), 2);
    }

    #[tokio::test]
    async fn test_later_pass_propagates_local_deletion() {
        let f = fixture();
        f.store
            .write("todos", &vec![todo("a", "keep", 10), todo("b", "drop", 10)]);
        sync_records::<Todo, _>(&f.ctx).await.unwrap();

        f.store.write("todos", &vec![todo("a", "keep", 10)]);
        let report = sync_records::<Todo, _>(&f.ctx).await.unwrap();

        assert!(!report.bootstrap);
        assert_eq!(report.deleted, 1);
        let remote_ids: Vec<_> = f
            .remote
            .rows(Collection::Todos, "u1")
            .into_iter()
            .map(|row| row["id"].clone())
            .collect();
        assert_eq!(remote_ids, vec![json!("a")]);
    }

    #[tokio::test]
    async fn test_repeated_pass_makes_no_remote_writes() {
        let f = fixture();
        f.store.write("todos", &vec![todo("a", "x", 10)]);
        sync_records::<Todo, _>(&f.ctx).await.unwrap();
        f.remote.clear_calls();

        let report = sync_records::<Todo, _>(&f.ctx).await.unwrap();
        assert_eq!(report.upserted, 0);
        assert_eq!(report.deleted, 0);
        assert!(f.remote.writes_to(Collection::Todos).is_empty());
    }

    #[tokio::test]
    async fn test_newer_remote_replaces_local() {
        let f = fixture();
        f.store.write("todos", &vec![todo("a", "old", 10)]);
        sync_records::<Todo, _>(&f.ctx).await.unwrap();
        f.remote
            .insert_row(Collection::Todos, todo("a", "edited elsewhere", 99).to_row("u1"));
        f.remote.clear_calls();

        sync_records::<Todo, _>(&f.ctx).await.unwrap();

        assert_eq!(local_todos(&f.store)[0].text, "edited elsewhere");
        assert!(f.remote.writes_to(Collection::Todos).is_empty());
    }

    #[tokio::test]
    async fn test_select_failure_leaves_local_untouched() {
        let f = fixture();
        let before = vec![todo("a", "x", 10)];
        f.store.write("todos", &before);
        f.remote.fail_next(RemoteOp::Select);

        assert!(sync_records::<Todo, _>(&f.ctx).await.is_err());
        assert_eq!(local_todos(&f.store), before);
        assert!(f.remote.writes_to(Collection::Todos).is_empty());
        assert!(f.ctx.needs_bootstrap(Collection::Todos));
    }

    #[tokio::test]
    async fn test_delete_still_attempted_when_upsert_fails() {
        let f = fixture();
        f.store
            .write("todos", &vec![todo("a", "x", 10), todo("b", "y", 10)]);
        sync_records::<Todo, _>(&f.ctx).await.unwrap();

        f.store
            .write("todos", &vec![todo("a", "changed", 20), todo("c", "new", 20)]);
        f.remote.clear_calls();
        f.remote.fail_next(RemoteOp::Upsert);

        assert!(sync_records::<Todo, _>(&f.ctx).await.is_err());
        let writes = f.remote.writes_to(Collection::Todos);
        assert_eq!(writes.len(), 2);
        assert!(matches!(writes[1], RemoteCall::Delete { .. }));
        assert!(f.remote.rows(Collection::Todos, "u1").len() == 1);
    }

    #[tokio::test]
    async fn test_unreadable_rows_are_skipped_not_deleted_on_bootstrap() {
        let f = fixture();
        let serde_json::Value::Object(bad) = json!({"id": "bad", "user_id": "u1"}) else {
            unreachable!()
        };
        f.remote.insert_row(Collection::Todos, bad);

        let report = sync_records::<Todo, _>(&f.ctx).await.unwrap();
        assert_eq!(report.skipped_rows, 1);
        assert_eq!(f.remote.rows(Collection::Todos, "u1").len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_local_write_during_pass_is_not_overwritten() {
        let f = fixture();
        f.remote
            .insert_row(Collection::Todos, todo("remote", "r", 10).to_row("u1"));
        f.remote.set_latency(Some(Duration::from_millis(100)));

        let ctx = f.ctx.clone();
        let pass = tokio::spawn(async move { sync_records::<Todo, _>(&ctx).await });

        tokio::time::sleep(Duration::from_millis(30)).await;
        let typed = vec![todo("typed", "mid-pass", 50)];
        f.store.write("todos", &typed);

        let report = pass.await.unwrap().unwrap();
        assert!(report.local_write_skipped);
        assert_eq!(local_todos(&f.store), typed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_first_pass_interrupted_by_local_write_stays_first_pass() {
        let f = fixture();
        f.remote
            .insert_row(Collection::Todos, todo("phone", "from phone", 10).to_row("u1"));
        f.remote.set_latency(Some(Duration::from_millis(100)));

        let ctx = f.ctx.clone();
        let pass = tokio::spawn(async move { sync_records::<Todo, _>(&ctx).await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        f.store.write("todos", &vec![todo("typed", "mid-pass", 50)]);

        let first = pass.await.unwrap().unwrap();
        assert!(first.bootstrap);
        assert!(first.local_write_skipped);
        assert!(f.ctx.needs_bootstrap(Collection::Todos));

        f.remote.set_latency(None);
        let second = sync_records::<Todo, _>(&f.ctx).await.unwrap();
        assert!(second.bootstrap);
        assert_eq!(second.deleted, 0);

        let mut remote_ids: Vec<_> = f
            .remote
            .rows(Collection::Todos, "u1")
            .into_iter()
            .map(|row| row["id"].clone())
            .collect();
        remote_ids.sort_by_key(ToString::to_string);
        assert_eq!(remote_ids, vec![json!("phone"), json!("typed")]);
        assert_eq!(local_todos(&f.store).len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_no_deletions_sent_when_local_changed_mid_pass() {
        let f = fixture();
        f.store
            .write("todos", &vec![todo("a", "x", 10), todo("b", "y", 10)]);
        sync_records::<Todo, _>(&f.ctx).await.unwrap();

        f.store.write("todos", &vec![todo("a", "x", 10)]);
        f.remote.set_latency(Some(Duration::from_millis(100)));
        f.remote.clear_calls();

        let ctx = f.ctx.clone();
        let pass = tokio::spawn(async move { sync_records::<Todo, _>(&ctx).await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        f.store.write("todos", &vec![todo("a", "x", 10), todo("c", "new", 60)]);

        let report = pass.await.unwrap().unwrap();
        assert!(report.local_write_skipped);
        assert_eq!(report.deleted, 0);
        assert!(!f
            .remote
            .writes_to(Collection::Todos)
            .iter()
            .any(|call| matches!(call, RemoteCall::Delete { .. })));
    }

    #[tokio::test]
    async fn test_pass_sees_records_written_by_another_store() {
        let storage = Arc::new(MemoryBlobStorage::new());
        let watcher =
            Arc::new(EnvelopeStore::open("root", storage.clone()).unwrap());
        let remote = Arc::new(MemoryRemote::new());
        let ctx = SyncContext::new(
            "u1",
            Arc::clone(&watcher),
            Arc::clone(&remote),
            Arc::new(CollectionLocks::new()),
        );
        sync_records::<Todo, _>(&ctx).await.unwrap();

        let editor = EnvelopeStore::open("root", storage).unwrap();
        editor.write("todos", &vec![todo("added", "from another window", 20)]);

        let report = sync_records::<Todo, _>(&ctx).await.unwrap();
        assert_eq!(report.upserted, 1);
        assert_eq!(report.deleted, 0);
        assert_eq!(remote.rows(Collection::Todos, "u1").len(), 1);
        assert_eq!(local_todos(&editor).len(), 1);
    }

    #[tokio::test]
    async fn test_pomodoro_is_pushed_whole() {
        let f = fixture();
        let settings = PomodoroSettings {
            work_minutes: 50,
            alarm_sound: AlarmSound::Chime,
            ..PomodoroSettings::default()
        };
        f.store.write("pomodoro-settings", &settings);

        let report = sync_pomodoro(&f.ctx).await.unwrap();
        assert_eq!(report.upserted, 1);

        let rows = f.remote.rows(Collection::PomodoroSettings, "u1");
        assert_eq!(rows.len(), 1);
        assert_eq!(PomodoroSettings::from_row(rows[0].clone()).unwrap(), settings);
    }

    #[tokio::test]
    async fn test_pomodoro_overwrites_remote_after_bootstrap() {
        let f = fixture();
        f.store.write("pomodoro-settings", &PomodoroSettings::default());
        f.remote.insert_row(
            Collection::PomodoroSettings,
            PomodoroSettings {
                work_minutes: 90,
                ..PomodoroSettings::default()
            }
            .to_row("u1"),
        );

        sync_pomodoro(&f.ctx).await.unwrap();
        let rows = f.remote.rows(Collection::PomodoroSettings, "u1");
        assert_eq!(rows[0]["work_minutes"], json!(25));
    }

    #[tokio::test]
    async fn test_fresh_device_adopts_remote_pomodoro() {
        let f = fixture();
        let remote_settings = PomodoroSettings {
            work_minutes: 45,
            ..PomodoroSettings::default()
        };
        f.remote
            .insert_row(Collection::PomodoroSettings, remote_settings.to_row("u1"));

        let report = sync_pomodoro(&f.ctx).await.unwrap();
        assert_eq!(report.adopted, 1);
        assert_eq!(report.upserted, 0);
        assert_eq!(
            f.store
                .read("pomodoro-settings", PomodoroSettings::default()),
            remote_settings
        );
    }

    #[tokio::test]
    async fn test_sync_collection_dispatches_by_collection() {
        let f = fixture();
        f.store
            .write("events", &Vec::<crate::models::Event>::new());
        let report = sync_collection(&f.ctx, Collection::Events).await.unwrap();
        assert_eq!(report.collection, Collection::Events);
        assert!(matches!(
            f.remote.calls().first(),
            Some(RemoteCall::Select {
                collection: Collection::Events,
                ..
            })
        ));
    }
}
