//! Local-first sync engine.
//!
//! The envelope store is the source of truth; the remote backend mirrors it.
//! [`reconcile`] is the pure last-write-wins merge, the synchronizer runs it
//! against a backend for one collection, and [`SyncEngine`] plus
//! [`SyncDispatcher`] decide when that happens.

mod context;
mod dispatcher;
mod engine;
mod entitlement;
mod field_tracker;
#[cfg(any(test, feature = "test-util"))]
mod memory;
mod postgrest;
mod reconcile;
mod remote;
mod synchronizer;

use std::fmt;

use thiserror::Error;

use crate::models::Collection;

pub use context::{CollectionLocks, SyncContext, BOOTSTRAP_KEY};
pub use dispatcher::SyncDispatcher;
pub use engine::{BlurOutcome, FieldTarget, FullSyncReport, SyncEngine};
pub use entitlement::{sync_active, EntitlementGate, SyncState};
pub use field_tracker::{BlurAction, FieldState, FieldTracker};
#[cfg(any(test, feature = "test-util"))]
pub use memory::{MemoryRemote, RemoteCall, RemoteOp};
pub use postgrest::PostgrestBackend;
pub use reconcile::{reconcile, ReconcileMode, Reconciliation};
pub use remote::{ProfileService, RemoteBackend};
pub use synchronizer::{sync_collection, sync_pomodoro, sync_records, SyncReport};

/// Authenticated user as handed over by the auth subsystem.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub access_token: String,
}

impl Session {
    pub fn new(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: access_token.into(),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// Errors raised by the sync engine and its remote collaborators
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Sign in to use cloud sync")]
    NotAuthenticated,
    #[error("Cloud sync requires an active subscription")]
    NotEntitled,
    #[error("Cloud sync is not active")]
    Inactive,
    #[error("Invalid backend configuration: {0}")]
    InvalidConfiguration(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Remote API error: {0}")]
    Api(String),
    #[error("Invalid remote payload: {0}")]
    InvalidPayload(String),
    #[error("Sync failed for {}: {message}", format_collections(.failed))]
    Incomplete {
        failed: Vec<Collection>,
        message: String,
    },
    #[error(transparent)]
    Local(#[from] crate::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;

fn format_collections(collections: &[Collection]) -> String {
    collections
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
