//! PostgREST (Supabase) remote backend

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use super::remote::{ProfileService, RemoteBackend};
use super::{SyncError, SyncResult};
use crate::config::BackendConfig;
use crate::models::{Collection, Profile, RecordId, RemoteRow, SubscriptionStatus};
use crate::util::{compact_text, iso_to_millis, millis_to_iso, normalize_text_option};

const PROFILES_TABLE: &str = "profiles";
const SUBSCRIPTIONS_TABLE: &str = "subscriptions";

/// Row store and profile service over a PostgREST endpoint.
///
/// Requests carry the anon key as `apikey` and the user's access token as
/// bearer; row-level security on the server enforces the `user_id` scope.
#[derive(Clone)]
pub struct PostgrestBackend {
    rest_url: String,
    anon_key: String,
    access_token: Arc<RwLock<Option<String>>>,
    client: Client,
}

impl fmt::Debug for PostgrestBackend {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("PostgrestBackend")
            .field("rest_url", &self.rest_url)
            .field("anon_key", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl PostgrestBackend {
    pub fn new(config: &BackendConfig) -> SyncResult<Self> {
        let rest_url = config.rest_url().map_err(SyncError::InvalidConfiguration)?;
        let anon_key = config.anon_key().map_err(SyncError::InvalidConfiguration)?;
        Ok(Self {
            rest_url,
            anon_key,
            access_token: Arc::new(RwLock::new(None)),
            client: Client::builder().build()?,
        })
    }

    #[must_use]
    pub fn with_access_token(self, access_token: impl Into<String>) -> Self {
        self.set_access_token(Some(access_token.into()));
        self
    }

    /// Replace the bearer token, e.g. after a session refresh.
    pub fn set_access_token(&self, access_token: Option<String>) {
        *self
            .access_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = normalize_text_option(access_token);
    }

    fn request(&self, method: Method, table: &str, query: &str) -> RequestBuilder {
        let url = if query.is_empty() {
            format!("{}/{table}", self.rest_url)
        } else {
            format!("{}/{table}?{query}", self.rest_url)
        };
        let token = self
            .access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| self.anon_key.clone());

        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("Accept", "application/json")
            .bearer_auth(token)
    }

    async fn send(request: RequestBuilder) -> SyncResult<Response> {
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Api(parse_api_error(status, &body)));
        }
        Ok(response)
    }

    async fn patch(&self, table: &str, query: &str, body: &Value) -> SyncResult<()> {
        let request = self
            .request(Method::PATCH, table, query)
            .header("Prefer", "return=minimal")
            .json(body);
        Self::send(request).await?;
        Ok(())
    }
}

impl RemoteBackend for PostgrestBackend {
    async fn select_all(&self, collection: Collection, user_id: &str) -> SyncResult<Vec<RemoteRow>> {
        let query = format!("select=*&{}", eq_filter("user_id", user_id));
        let response = Self::send(self.request(Method::GET, collection.table(), &query)).await?;
        response
            .json::<Vec<RemoteRow>>()
            .await
            .map_err(|error| SyncError::InvalidPayload(format!("{collection} rows: {error}")))
    }

    async fn upsert(&self, collection: Collection, rows: Vec<RemoteRow>) -> SyncResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let query = format!("on_conflict={}", conflict_column(collection));
        let request = self
            .request(Method::POST, collection.table(), &query)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&rows);
        Self::send(request).await?;
        tracing::debug!("Upserted {} {} row(s)", rows.len(), collection);
        Ok(())
    }

    async fn delete(&self, collection: Collection, user_id: &str, ids: &[RecordId]) -> SyncResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let query = format!("{}&{}", eq_filter("user_id", user_id), in_filter("id", ids));
        let request = self
            .request(Method::DELETE, collection.table(), &query)
            .header("Prefer", "return=minimal");
        Self::send(request).await?;
        tracing::debug!("Deleted {} {} row(s)", ids.len(), collection);
        Ok(())
    }

    async fn update_fields(
        &self,
        collection: Collection,
        user_id: &str,
        id: &RecordId,
        fields: RemoteRow,
    ) -> SyncResult<()> {
        let query = format!(
            "{}&{}",
            eq_filter("id", id.as_str()),
            eq_filter("user_id", user_id)
        );
        self.patch(collection.table(), &query, &Value::Object(fields))
            .await
    }
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    #[serde(default)]
    cloud_sync_enabled: Option<bool>,
    #[serde(default)]
    last_synced_at: Option<String>,
}

impl ProfileRow {
    fn into_profile(self, user_id: &str) -> Profile {
        Profile {
            user_id: user_id.to_string(),
            cloud_sync_enabled: self.cloud_sync_enabled.unwrap_or(false),
            last_synced: self.last_synced_at.as_deref().and_then(iso_to_millis),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubscriptionRow {
    #[serde(default)]
    status: SubscriptionStatus,
}

impl ProfileService for PostgrestBackend {
    async fn fetch_profile(&self, user_id: &str) -> SyncResult<Profile> {
        let query = format!(
            "select=cloud_sync_enabled,last_synced_at&{}",
            eq_filter("id", user_id)
        );
        let response = Self::send(self.request(Method::GET, PROFILES_TABLE, &query)).await?;
        let rows = response
            .json::<Vec<ProfileRow>>()
            .await
            .map_err(|error| SyncError::InvalidPayload(format!("profile: {error}")))?;
        Ok(rows.into_iter().next().map_or_else(
            || Profile::new(user_id),
            |row| row.into_profile(user_id),
        ))
    }

    async fn fetch_subscription(&self, user_id: &str) -> SyncResult<SubscriptionStatus> {
        let query = format!(
            "select=status&{}&order=created_at.desc&limit=1",
            eq_filter("user_id", user_id)
        );
        let response = Self::send(self.request(Method::GET, SUBSCRIPTIONS_TABLE, &query)).await?;
        let rows = response
            .json::<Vec<SubscriptionRow>>()
            .await
            .map_err(|error| SyncError::InvalidPayload(format!("subscription: {error}")))?;
        Ok(rows
            .into_iter()
            .next()
            .map(|row| row.status)
            .unwrap_or_default())
    }

    async fn set_cloud_sync_enabled(&self, user_id: &str, enabled: bool) -> SyncResult<()> {
        self.patch(
            PROFILES_TABLE,
            &eq_filter("id", user_id),
            &json!({ "cloud_sync_enabled": enabled }),
        )
        .await
    }

    async fn set_last_synced(&self, user_id: &str, synced_at: i64) -> SyncResult<()> {
        self.patch(
            PROFILES_TABLE,
            &eq_filter("id", user_id),
            &json!({ "last_synced_at": millis_to_iso(synced_at) }),
        )
        .await
    }
}

/// Key column an upsert conflicts on.
const fn conflict_column(collection: Collection) -> &'static str {
    if collection.is_record_collection() {
        "id"
    } else {
        "user_id"
    }
}

fn eq_filter(column: &str, value: &str) -> String {
    format!("{column}=eq.{}", urlencoding::encode(value))
}

fn in_filter(column: &str, ids: &[RecordId]) -> String {
    let values = ids
        .iter()
        .map(|id| format!("\"{}\"", urlencoding::encode(id.as_str())))
        .collect::<Vec<_>>()
        .join(",");
    format!("{column}=in.({values})")
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
    error: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<PostgrestErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            let detail = payload
                .details
                .or(payload.hint)
                .map(|detail| format!(": {}", detail.trim()))
                .unwrap_or_default();
            return format!("{}{} ({})", message.trim(), detail, status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", compact_text(trimmed), status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_requires_configured_backend() {
        let error = PostgrestBackend::new(&BackendConfig::default()).unwrap_err();
        assert!(matches!(error, SyncError::InvalidConfiguration(_)));

        let error =
            PostgrestBackend::new(&BackendConfig::new("example.supabase.co", "anon")).unwrap_err();
        assert!(error.to_string().contains("http://"));
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let backend = PostgrestBackend::new(&BackendConfig::new(
            "https://example.supabase.co",
            "anon-key-value",
        ))
        .unwrap()
        .with_access_token("user-token-value");

        let rendered = format!("{backend:?}");
        assert!(rendered.contains("https://example.supabase.co/rest/v1"));
        assert!(!rendered.contains("anon-key-value"));
        assert!(!rendered.contains("user-token-value"));
    }

    #[test]
    fn test_filters_are_url_encoded() {
        assert_eq!(eq_filter("user_id", "a b&c"), "user_id=eq.a%20b%26c");
        assert_eq!(
            in_filter("id", &[RecordId::from("x"), RecordId::from("y z")]),
            "id=in.(\"x\",\"y%20z\")"
        );
    }

    #[test]
    fn test_pomodoro_conflicts_on_user() {
        assert_eq!(conflict_column(Collection::Notes), "id");
        assert_eq!(conflict_column(Collection::PomodoroSettings), "user_id");
    }

    #[test]
    fn test_parse_api_error_prefers_message_and_details() {
        let body = r#"{"code":"23505","message":"duplicate key","details":"Key (id) exists"}"#;
        assert_eq!(
            parse_api_error(StatusCode::CONFLICT, body),
            "duplicate key: Key (id) exists (409)"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
        assert_eq!(
            parse_api_error(StatusCode::UNAUTHORIZED, "JWT expired"),
            "JWT expired (401)"
        );
    }

    #[test]
    fn test_profile_row_defaults() {
        let row: ProfileRow = serde_json::from_str(r#"{"cloud_sync_enabled": null}"#).unwrap();
        assert_eq!(row.into_profile("u1"), Profile::new("u1"));

        let row: ProfileRow = serde_json::from_str(
            r#"{"cloud_sync_enabled": true, "last_synced_at": "2023-11-14T22:13:20Z"}"#,
        )
        .unwrap();
        let profile = row.into_profile("u1");
        assert!(profile.cloud_sync_enabled);
        assert_eq!(profile.last_synced, Some(1_700_000_000_000));
    }

    #[test]
    fn test_subscription_row_tolerates_unknown_status() {
        let row: SubscriptionRow = serde_json::from_str(r#"{"status": "unpaid"}"#).unwrap();
        assert_eq!(row.status, SubscriptionStatus::None);
    }
}
