//! Sync engine: session, gate, explicit actions and full syncs

use std::slice;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use serde_json::Value;

use super::context::{CollectionLocks, SyncContext, BOOTSTRAP_KEY};
use super::entitlement::{EntitlementGate, SyncState};
use super::field_tracker::{BlurAction, FieldTracker};
use super::remote::{ProfileService, RemoteBackend};
use super::synchronizer::{self, SyncReport};
use super::{Session, SyncError, SyncResult};
use crate::config::SyncSettings;
use crate::models::{Collection, PomodoroSettings, RecordId, RemoteRow, SyncRecord, Todo};
use crate::store::EnvelopeStore;
use crate::util::{millis_to_iso, unix_millis_now};

/// Remote column edited through a focus/blur session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTarget {
    pub id: RecordId,
    /// Remote column name, e.g. `content`
    pub column: &'static str,
}

impl FieldTarget {
    pub fn new(id: RecordId, column: &'static str) -> Self {
        Self { id, column }
    }
}

/// Result of ending a field edit session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlurOutcome {
    Unchanged,
    /// The changed value was written to the remote row.
    Committed,
    /// Sync is inactive; the change stays local until the next full sync.
    Deferred,
    /// Blur without a focused session.
    Ignored,
}

/// Outcome of a pass over every collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullSyncReport {
    pub reports: Vec<SyncReport>,
    /// Completion time, stored as the profile's last sync (Unix ms)
    pub synced_at: i64,
}

impl FullSyncReport {
    pub fn total_upserted(&self) -> usize {
        self.reports.iter().map(|report| report.upserted).sum()
    }

    pub fn total_deleted(&self) -> usize {
        self.reports.iter().map(|report| report.deleted).sum()
    }

    pub fn total_adopted(&self) -> usize {
        self.reports.iter().map(|report| report.adopted).sum()
    }
}

/// Owns the sync gate and runs every remote interaction.
///
/// Local writes always happen first and never wait for the network. Remote
/// writes only happen while the gate is active, and are serialized per
/// collection with sync passes.
pub struct SyncEngine<B, P> {
    store: Arc<EnvelopeStore>,
    remote: Arc<B>,
    profiles: Arc<P>,
    gate: EntitlementGate,
    session: RwLock<Option<Session>>,
    locks: Arc<CollectionLocks>,
    settings: SyncSettings,
}

impl<B: RemoteBackend, P: ProfileService> SyncEngine<B, P> {
    pub fn new(
        store: Arc<EnvelopeStore>,
        remote: Arc<B>,
        profiles: Arc<P>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            remote,
            profiles,
            gate: EntitlementGate::new(),
            session: RwLock::new(None),
            locks: Arc::new(CollectionLocks::new()),
            settings,
        }
    }

    pub fn store(&self) -> &Arc<EnvelopeStore> {
        &self.store
    }

    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub const fn gate(&self) -> &EntitlementGate {
        &self.gate
    }

    pub fn state(&self) -> SyncState {
        self.gate.state()
    }

    pub fn session(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Adopt a session from the auth subsystem and load its profile.
    pub async fn sign_in(&self, session: Session) -> SyncResult<SyncState> {
        tracing::info!("Signed in as {}", session.user_id);
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
        self.gate.set_authenticated(true);
        self.refresh_profile().await
    }

    pub fn sign_out(&self) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.gate.set_authenticated(false);
        tracing::info!("Signed out; cloud sync stopped");
    }

    /// Re-read profile and subscription and recompute the gate.
    pub async fn refresh_profile(&self) -> SyncResult<SyncState> {
        let user_id = self.user_id()?;
        let profile = self.profiles.fetch_profile(&user_id).await?;
        let subscription = self.profiles.fetch_subscription(&user_id).await?;
        self.gate.apply_profile(&profile, subscription);
        Ok(self.gate.state())
    }

    /// Turn cloud sync on and run an immediate full sync.
    ///
    /// Fails without touching the profile when the user is signed out or
    /// has no active subscription.
    pub async fn enable_cloud_sync(&self) -> SyncResult<FullSyncReport> {
        self.gate.check_can_enable()?;
        let user_id = self.user_id()?;
        self.profiles.set_cloud_sync_enabled(&user_id, true).await?;
        self.gate.set_cloud_sync_enabled(true);
        tracing::info!("Cloud sync enabled for {}", user_id);
        self.full_sync().await
    }

    /// Turn cloud sync off. The bootstrap marker is cleared, so the first
    /// pass after re-enabling adopts remote-only records again.
    pub async fn disable_cloud_sync(&self) -> SyncResult<()> {
        let user_id = self.user_id()?;
        self.profiles.set_cloud_sync_enabled(&user_id, false).await?;
        self.gate.set_cloud_sync_enabled(false);
        self.store.remove(BOOTSTRAP_KEY);
        tracing::info!("Cloud sync disabled for {}", user_id);
        Ok(())
    }

    /// One pass for one collection; fails with [`SyncError::Inactive`] when
    /// the gate is closed.
    pub async fn sync_collection(&self, collection: Collection) -> SyncResult<SyncReport> {
        let ctx = self.active_context()?;
        synchronizer::sync_collection(&ctx, collection).await
    }

    /// Pass over every collection. Each collection is attempted even if an
    /// earlier one failed; the last sync time is stamped only when all
    /// succeeded.
    pub async fn full_sync(&self) -> SyncResult<FullSyncReport> {
        let ctx = self.active_context()?;
        let mut reports = Vec::with_capacity(Collection::ALL.len());
        let mut failed = Vec::new();
        let mut first_error = None;

        for collection in Collection::ALL {
            match synchronizer::sync_collection(&ctx, collection).await {
                Ok(report) => reports.push(report),
                Err(error) => {
                    tracing::warn!("Sync of {} failed: {}", collection, error);
                    failed.push(collection);
                    first_error.get_or_insert_with(|| error.to_string());
                }
            }
        }

        if let Some(message) = first_error {
            return Err(SyncError::Incomplete { failed, message });
        }

        let synced_at = unix_millis_now();
        self.gate.mark_synced(synced_at);
        if let Err(error) = self.profiles.set_last_synced(&ctx.user_id, synced_at).await {
            tracing::warn!("Failed to record last sync time: {}", error);
        }
        tracing::info!("Full sync completed");

        Ok(FullSyncReport { reports, synced_at })
    }

    /// Local records of `T`, newest first as last merged.
    pub fn records<T: SyncRecord>(&self) -> Vec<T> {
        self.store.read(T::COLLECTION.store_key(), Vec::new())
    }

    /// Add a record locally, then insert it remotely when sync is active.
    ///
    /// A failed remote write is returned; the local record stays and the
    /// next pass pushes it.
    pub async fn create<T: SyncRecord>(&self, record: T) -> SyncResult<T> {
        self.store
            .update(T::COLLECTION.store_key(), Vec::<T>::new(), |records| {
                records.insert(0, record.clone());
            });
        self.push_record(&record).await?;
        Ok(record)
    }

    /// Mutate one record locally, then write it remotely when sync is
    /// active. `mutate` is expected to bump `updated_at` through the model's
    /// setters.
    pub async fn update<T: SyncRecord>(
        &self,
        id: &RecordId,
        mutate: impl FnOnce(&mut T),
    ) -> SyncResult<T> {
        let updated = self.update_local::<T>(id, mutate)?;
        self.push_record(&updated).await?;
        Ok(updated)
    }

    /// Flip a todo's completion, sending only the changed columns.
    pub async fn toggle_todo(&self, id: &RecordId) -> SyncResult<Todo> {
        let todo = self.update_local::<Todo>(id, |todo| {
            todo.toggle();
        })?;

        if let Some(ctx) = self.point_write_context() {
            let mut fields = RemoteRow::new();
            fields.insert("completed".to_string(), Value::Bool(todo.completed));
            fields.insert(
                "updated_at".to_string(),
                Value::String(millis_to_iso(todo.updated_at)),
            );
            let _guard = ctx.lock(Collection::Todos).await;
            ctx.remote
                .update_fields(Collection::Todos, &ctx.user_id, &todo.id, fields)
                .await?;
        }
        Ok(todo)
    }

    /// Remove a record locally, then delete it remotely when sync is active.
    pub async fn delete<T: SyncRecord>(&self, id: &RecordId) -> SyncResult<T> {
        let removed = self
            .store
            .update(T::COLLECTION.store_key(), Vec::<T>::new(), |records| {
                records
                    .iter()
                    .position(|record| record.id() == id)
                    .map(|position| records.remove(position))
            })
            .ok_or_else(|| not_found(T::COLLECTION, id))?;

        if let Some(ctx) = self.point_write_context() {
            let _guard = ctx.lock(T::COLLECTION).await;
            ctx.remote
                .delete(T::COLLECTION, &ctx.user_id, slice::from_ref(removed.id()))
                .await?;
        }
        Ok(removed)
    }

    pub fn pomodoro(&self) -> PomodoroSettings {
        self.store.read(
            Collection::PomodoroSettings.store_key(),
            PomodoroSettings::default(),
        )
    }

    /// Store new timer settings and push them when sync is active.
    pub async fn save_pomodoro(&self, settings: PomodoroSettings) -> SyncResult<PomodoroSettings> {
        let settings = settings.normalized();
        self.store
            .write(Collection::PomodoroSettings.store_key(), &settings);

        if let Some(ctx) = self.point_write_context() {
            let _guard = ctx.lock(Collection::PomodoroSettings).await;
            ctx.remote
                .upsert(
                    Collection::PomodoroSettings,
                    vec![settings.to_row(&ctx.user_id)],
                )
                .await?;
        }
        Ok(settings)
    }

    /// Write one column of a record remotely, stamped with the record's
    /// local `updated_at`.
    pub async fn commit_field<T: SyncRecord>(
        &self,
        target: &FieldTarget,
        value: Value,
    ) -> SyncResult<()> {
        let ctx = self.active_context()?;
        let record = self
            .records::<T>()
            .into_iter()
            .find(|record| record.id() == &target.id)
            .ok_or_else(|| not_found(T::COLLECTION, &target.id))?;

        let mut fields = RemoteRow::new();
        fields.insert(target.column.to_string(), value);
        fields.insert(
            "updated_at".to_string(),
            Value::String(millis_to_iso(record.updated_at())),
        );

        let _guard = ctx.lock(T::COLLECTION).await;
        ctx.remote
            .update_fields(T::COLLECTION, &ctx.user_id, &target.id, fields)
            .await
    }

    /// End a field edit session started with [`FieldTracker::focus`].
    pub async fn blur_field<T, V>(
        &self,
        tracker: &mut FieldTracker<V>,
        target: &FieldTarget,
        live: V,
    ) -> SyncResult<BlurOutcome>
    where
        T: SyncRecord,
        V: Clone + PartialEq + Serialize,
    {
        match tracker.blur(live, self.gate.is_active()) {
            BlurAction::Unchanged => Ok(BlurOutcome::Unchanged),
            BlurAction::NotFocused => Ok(BlurOutcome::Ignored),
            BlurAction::FallbackSync => Ok(BlurOutcome::Deferred),
            BlurAction::Commit(value) => {
                let result = match serde_json::to_value(&value) {
                    Ok(value) => self.commit_field::<T>(target, value).await,
                    Err(error) => Err(SyncError::Local(error.into())),
                };
                tracker.finish_commit();
                if let Err(error) = &result {
                    tracing::warn!("Failed to commit {}: {}", target.column, error);
                }
                result.map(|()| BlurOutcome::Committed)
            }
        }
    }

    fn user_id(&self) -> SyncResult<String> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|session| session.user_id.clone())
            .ok_or(SyncError::NotAuthenticated)
    }

    fn active_context(&self) -> SyncResult<SyncContext<B>> {
        if !self.gate.is_active() {
            return Err(SyncError::Inactive);
        }
        let user_id = self.user_id()?;
        Ok(SyncContext::new(
            user_id,
            Arc::clone(&self.store),
            Arc::clone(&self.remote),
            Arc::clone(&self.locks),
        ))
    }

    /// Context for a remote point write, or `None` when the change should
    /// stay local.
    fn point_write_context(&self) -> Option<SyncContext<B>> {
        self.active_context().ok()
    }

    async fn push_record<T: SyncRecord>(&self, record: &T) -> SyncResult<()> {
        let Some(ctx) = self.point_write_context() else {
            return Ok(());
        };
        let _guard = ctx.lock(T::COLLECTION).await;
        ctx.remote
            .upsert(T::COLLECTION, vec![record.to_row(&ctx.user_id)])
            .await
    }

    /// Mutate one record locally without any remote write. Used while a
    /// field is being edited; [`SyncEngine::blur_field`] publishes the result.
    pub fn update_local<T: SyncRecord>(
        &self,
        id: &RecordId,
        mutate: impl FnOnce(&mut T),
    ) -> SyncResult<T> {
        if !self.records::<T>().iter().any(|record| record.id() == id) {
            return Err(not_found(T::COLLECTION, id));
        }
        self.store
            .update(T::COLLECTION.store_key(), Vec::<T>::new(), |records| {
                records
                    .iter_mut()
                    .find(|record| record.id() == id)
                    .map(|record| {
                        mutate(record);
                        record.clone()
                    })
            })
            .ok_or_else(|| not_found(T::COLLECTION, id))
    }
}

fn not_found(collection: Collection, id: &RecordId) -> SyncError {
    SyncError::Local(crate::Error::NotFound(format!("{collection} record {id}")))
}
