//! Runtime configuration for the sync engine and remote backend.
//!
//! `SyncSettings` tunes the local store and the periodic trigger;
//! `BackendConfig` holds the safe-to-ship endpoint and anon key used to reach
//! the hosted data service.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::{is_http_url, normalize_text_option};

/// Storage key under which the whole envelope blob is persisted.
pub const DEFAULT_ROOT_KEY: &str = "dashboard-storage";

/// Default period between background sync passes.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Local store and trigger tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Root storage key holding every collection envelope
    pub root_key: String,
    /// Interval of the periodic trigger, per collection
    pub interval: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            root_key: DEFAULT_ROOT_KEY.to_string(),
            interval: DEFAULT_SYNC_INTERVAL,
        }
    }
}

impl SyncSettings {
    /// Override the periodic sync interval
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Override the root storage key
    #[must_use]
    pub fn with_root_key(mut self, root_key: impl Into<String>) -> Self {
        self.root_key = root_key.into();
        self
    }
}

/// Remote backend endpoint configuration.
///
/// These values are public; user credentials are never stored here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub anon_key: Option<String>,
}

impl BackendConfig {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            anon_key: Some(anon_key.into()),
        }
    }

    /// Returns `true` when both the endpoint and the anon key are present.
    pub fn is_configured(&self) -> bool {
        normalize_text_option(self.base_url.clone()).is_some()
            && normalize_text_option(self.anon_key.clone()).is_some()
    }

    /// Returns the PostgREST root (`<base>/rest/v1`) for data requests.
    pub fn rest_url(&self) -> Result<String, String> {
        let base = normalize_base_url(self.base_url.clone())?;
        if base.ends_with("/rest/v1") {
            Ok(base)
        } else {
            Ok(format!("{base}/rest/v1"))
        }
    }

    pub fn anon_key(&self) -> Result<String, String> {
        normalize_text_option(self.anon_key.clone())
            .ok_or_else(|| "backend anon key is required".to_string())
    }
}

fn normalize_base_url(raw: Option<String>) -> Result<String, String> {
    let value =
        normalize_text_option(raw).ok_or_else(|| "backend base URL is required".to_string())?;
    if is_http_url(&value) {
        Ok(value.trim_end_matches('/').to_string())
    } else {
        Err("backend base URL must include http:// or https://".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_settings_default_to_thirty_seconds() {
        let settings = SyncSettings::default();
        assert_eq!(settings.interval, Duration::from_secs(30));
        assert_eq!(settings.root_key, "dashboard-storage");
    }

    #[test]
    fn rest_url_appends_rest_path_once() {
        let config = BackendConfig::new("https://project.example.co/", "anon");
        assert_eq!(
            config.rest_url().unwrap(),
            "https://project.example.co/rest/v1"
        );

        let config = BackendConfig::new("https://project.example.co/rest/v1", "anon");
        assert_eq!(
            config.rest_url().unwrap(),
            "https://project.example.co/rest/v1"
        );
    }

    #[test]
    fn rest_url_rejects_missing_scheme() {
        let config = BackendConfig::new("project.example.co", "anon");
        assert!(config.rest_url().unwrap_err().contains("http://"));
    }

    #[test]
    fn blank_values_are_not_configured() {
        let config = BackendConfig::new("  ", "anon");
        assert!(!config.is_configured());
        assert!(!BackendConfig::default().is_configured());
    }
}
