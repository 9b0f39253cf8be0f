//! Account profile and subscription as reported by the entitlement service

use serde::{Deserialize, Serialize};

/// Billing state of the user's subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    #[default]
    #[serde(other)]
    None,
}

impl SubscriptionStatus {
    /// Only a fully active subscription entitles the user to cloud sync.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Sync-relevant slice of the user's profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub cloud_sync_enabled: bool,
    /// Last successful full sync (Unix ms)
    pub last_synced: Option<i64>,
}

impl Profile {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            cloud_sync_enabled: false,
            last_synced: None,
        }
    }
}
