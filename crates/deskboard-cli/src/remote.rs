//! Remote backend chosen from the active profile.

use deskboard_core::config::BackendConfig;
use deskboard_core::models::{Collection, Profile, RecordId, RemoteRow, SubscriptionStatus};
use deskboard_core::sync::{PostgrestBackend, ProfileService, RemoteBackend, Session};
use deskboard_core::{SyncError, SyncResult};

/// Either a configured PostgREST backend, or a stand-in that refuses every
/// call so local commands work without any backend configured.
#[derive(Debug)]
pub enum CliRemote {
    Postgrest(PostgrestBackend),
    Unconfigured,
}

impl CliRemote {
    pub fn from_config(config: &BackendConfig, session: Option<&Session>) -> SyncResult<Self> {
        if !config.is_configured() {
            return Ok(Self::Unconfigured);
        }
        let backend = PostgrestBackend::new(config)?;
        if let Some(session) = session {
            backend.set_access_token(Some(session.access_token.clone()));
        }
        Ok(Self::Postgrest(backend))
    }

    pub const fn is_configured(&self) -> bool {
        matches!(self, Self::Postgrest(_))
    }

    fn backend(&self) -> SyncResult<&PostgrestBackend> {
        match self {
            Self::Postgrest(backend) => Ok(backend),
            Self::Unconfigured => Err(SyncError::InvalidConfiguration(
                "no backend URL configured for this profile".to_string(),
            )),
        }
    }
}

impl RemoteBackend for CliRemote {
    async fn select_all(&self, collection: Collection, user_id: &str) -> SyncResult<Vec<RemoteRow>> {
        self.backend()?.select_all(collection, user_id).await
    }

    async fn upsert(&self, collection: Collection, rows: Vec<RemoteRow>) -> SyncResult<()> {
        self.backend()?.upsert(collection, rows).await
    }

    async fn delete(&self, collection: Collection, user_id: &str, ids: &[RecordId]) -> SyncResult<()> {
        self.backend()?.delete(collection, user_id, ids).await
    }

    async fn update_fields(
        &self,
        collection: Collection,
        user_id: &str,
        id: &RecordId,
        fields: RemoteRow,
    ) -> SyncResult<()> {
        self.backend()?
            .update_fields(collection, user_id, id, fields)
            .await
    }
}

impl ProfileService for CliRemote {
    async fn fetch_profile(&self, user_id: &str) -> SyncResult<Profile> {
        self.backend()?.fetch_profile(user_id).await
    }

    async fn fetch_subscription(&self, user_id: &str) -> SyncResult<SubscriptionStatus> {
        self.backend()?.fetch_subscription(user_id).await
    }

    async fn set_cloud_sync_enabled(&self, user_id: &str, enabled: bool) -> SyncResult<()> {
        self.backend()?
            .set_cloud_sync_enabled(user_id, enabled)
            .await
    }

    async fn set_last_synced(&self, user_id: &str, synced_at: i64) -> SyncResult<()> {
        self.backend()?.set_last_synced(user_id, synced_at).await
    }
}
