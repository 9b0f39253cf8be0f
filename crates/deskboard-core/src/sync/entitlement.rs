//! Whether cloud sync may run right now

use tokio::sync::watch;

use super::{SyncError, SyncResult};
use crate::models::{Profile, SubscriptionStatus};

/// Inputs of the sync gate plus the last full sync time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncState {
    pub is_authenticated: bool,
    pub cloud_sync_enabled: bool,
    pub subscription_active: bool,
    /// Completion of the last successful full sync (Unix ms)
    pub last_synced_at: Option<i64>,
}

impl SyncState {
    pub const fn is_active(&self) -> bool {
        self.is_authenticated && self.cloud_sync_enabled && self.subscription_active
    }
}

/// Cloud sync runs only for a signed-in user who turned it on and holds an
/// active subscription.
pub const fn sync_active(
    is_authenticated: bool,
    cloud_sync_enabled: bool,
    subscription: SubscriptionStatus,
) -> bool {
    is_authenticated && cloud_sync_enabled && subscription.is_active()
}

/// Current [`SyncState`], observable through a watch channel.
#[derive(Debug)]
pub struct EntitlementGate {
    state: watch::Sender<SyncState>,
}

impl Default for EntitlementGate {
    fn default() -> Self {
        Self::new()
    }
}

impl EntitlementGate {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SyncState::default());
        Self { state }
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Signing out clears everything learned from the previous profile.
    pub fn set_authenticated(&self, authenticated: bool) {
        self.modify(|state| {
            if authenticated {
                state.is_authenticated = true;
            } else {
                *state = SyncState::default();
            }
        });
    }

    /// Apply a freshly fetched profile and subscription.
    pub fn apply_profile(&self, profile: &Profile, subscription: SubscriptionStatus) {
        self.modify(|state| {
            state.cloud_sync_enabled = profile.cloud_sync_enabled;
            state.subscription_active = subscription.is_active();
            state.last_synced_at = profile.last_synced;
        });
    }

    pub fn set_cloud_sync_enabled(&self, enabled: bool) {
        self.modify(|state| state.cloud_sync_enabled = enabled);
    }

    pub fn set_subscription(&self, subscription: SubscriptionStatus) {
        self.modify(|state| state.subscription_active = subscription.is_active());
    }

    pub fn mark_synced(&self, synced_at: i64) {
        self.modify(|state| state.last_synced_at = Some(synced_at));
    }

    /// Fail fast when enabling cloud sync cannot succeed.
    pub fn check_can_enable(&self) -> SyncResult<()> {
        let state = self.state();
        if !state.is_authenticated {
            return Err(SyncError::NotAuthenticated);
        }
        if !state.subscription_active {
            return Err(SyncError::NotEntitled);
        }
        Ok(())
    }

    fn modify(&self, mutate: impl FnOnce(&mut SyncState)) {
        self.state.send_if_modified(|state| {
            let before = *state;
            mutate(state);
            let changed = *state != before;
            if changed && before.is_active() != state.is_active() {
                tracing::info!(
                    "Cloud sync {}",
                    if state.is_active() {
                        "activated"
                    } else {
                        "deactivated"
                    }
                );
            }
            changed
        });
    }
}
