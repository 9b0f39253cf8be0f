//! Seams to the remote side: the row store and the profile service

use std::future::Future;

use super::SyncResult;
use crate::models::{Collection, Profile, RecordId, RemoteRow, SubscriptionStatus};

/// Remote tabular store, scoped by `user_id` on every row.
///
/// Record collections are keyed by `id`; the pomodoro aggregate is keyed by
/// `user_id`, so an upsert of it replaces the user's single row.
pub trait RemoteBackend: Send + Sync + 'static {
    /// All rows of `collection` owned by `user_id`.
    fn select_all(
        &self,
        collection: Collection,
        user_id: &str,
    ) -> impl Future<Output = SyncResult<Vec<RemoteRow>>> + Send;

    /// Insert-or-replace rows in one batch.
    fn upsert(
        &self,
        collection: Collection,
        rows: Vec<RemoteRow>,
    ) -> impl Future<Output = SyncResult<()>> + Send;

    /// Delete the given ids of `user_id` in one batch.
    fn delete(
        &self,
        collection: Collection,
        user_id: &str,
        ids: &[RecordId],
    ) -> impl Future<Output = SyncResult<()>> + Send;

    /// Patch a subset of columns of a single row.
    fn update_fields(
        &self,
        collection: Collection,
        user_id: &str,
        id: &RecordId,
        fields: RemoteRow,
    ) -> impl Future<Output = SyncResult<()>> + Send;
}

/// Per-user profile and subscription data that gate cloud sync.
pub trait ProfileService: Send + Sync + 'static {
    /// Profile of `user_id`; a user without a profile row gets the defaults.
    fn fetch_profile(&self, user_id: &str) -> impl Future<Output = SyncResult<Profile>> + Send;

    fn fetch_subscription(
        &self,
        user_id: &str,
    ) -> impl Future<Output = SyncResult<SubscriptionStatus>> + Send;

    fn set_cloud_sync_enabled(
        &self,
        user_id: &str,
        enabled: bool,
    ) -> impl Future<Output = SyncResult<()>> + Send;

    /// Record the completion time (Unix ms) of a full sync.
    fn set_last_synced(
        &self,
        user_id: &str,
        synced_at: i64,
    ) -> impl Future<Output = SyncResult<()>> + Send;
}
