//! Shared shape of records that are reconciled by id

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Collection;
use crate::util::{iso_to_millis, unix_millis_now};

/// A flat field set as it crosses the remote boundary.
pub type RemoteRow = serde_json::Map<String, serde_json::Value>;

/// Opaque record identifier, generated client-side as a random UUID.
///
/// The remote side never regenerates it; it is the join key between the
/// local and remote copies of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Create a new random record ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A record that lives in an id-keyed collection and is reconciled
/// last-write-wins on `updated_at`.
pub trait SyncRecord:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Collection this record type belongs to
    const COLLECTION: Collection;

    fn id(&self) -> &RecordId;

    /// Creation timestamp (Unix ms)
    fn created_at(&self) -> i64;

    /// Last mutation timestamp (Unix ms)
    fn updated_at(&self) -> i64;

    /// Convert to the remote row shape, stamping the owning user.
    fn to_row(&self, user_id: &str) -> RemoteRow;

    /// Parse a remote row. Timestamps arrive as ISO-8601 strings.
    fn from_row(row: RemoteRow) -> Result<Self, String>;
}

/// Next `updated_at` for a mutation: wall clock, never earlier than `previous`.
pub fn next_updated_at(previous: i64) -> i64 {
    unix_millis_now().max(previous)
}

/// Deserialize a remote row into a wire struct, naming the collection on error.
pub(crate) fn parse_row<T: DeserializeOwned>(
    collection: Collection,
    row: RemoteRow,
) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::Object(row))
        .map_err(|error| format!("invalid {collection} row: {error}"))
}

/// Parse a wire timestamp; ISO strings are expected, bare millis tolerated.
pub(crate) fn parse_wire_timestamp(value: &WireTimestamp, field: &str) -> Result<i64, String> {
    match value {
        WireTimestamp::Millis(millis) => Ok(*millis),
        WireTimestamp::Iso(text) => {
            iso_to_millis(text).ok_or_else(|| format!("field '{field}' is not ISO-8601: {text}"))
        }
    }
}

/// Resolve the pair of wire timestamps; a missing `updated_at` falls back to
/// `created_at`.
pub(crate) fn wire_timestamps(
    created_at: Option<WireTimestamp>,
    updated_at: Option<WireTimestamp>,
) -> Result<(i64, i64), String> {
    let created_at = created_at
        .as_ref()
        .map(|value| parse_wire_timestamp(value, "created_at"))
        .transpose()?;
    let updated_at = updated_at
        .as_ref()
        .map(|value| parse_wire_timestamp(value, "updated_at"))
        .transpose()?;

    match (created_at, updated_at) {
        (Some(created), Some(updated)) => Ok((created, updated)),
        (Some(created), None) => Ok((created, created)),
        (None, Some(updated)) => Ok((updated, updated)),
        (None, None) => Err("row has neither created_at nor updated_at".to_string()),
    }
}

/// Timestamp as found in a remote row.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireTimestamp {
    Millis(i64),
    Iso(String),
}

/// Serialize a wire struct into a row. Wire structs only hold plain fields.
pub(crate) fn into_row<T: Serialize>(wire: &T) -> RemoteRow {
    match serde_json::to_value(wire) {
        Ok(serde_json::Value::Object(row)) => row,
        _ => RemoteRow::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_ids_are_unique_uuids() {
        let first = RecordId::new();
        let second = RecordId::new();
        assert_ne!(first, second);
        assert!(Uuid::parse_str(first.as_str()).is_ok());
    }

    #[test]
    fn record_id_serializes_as_plain_string() {
        let id = RecordId::from("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
    }

    #[test]
    fn next_updated_at_never_goes_backwards() {
        let future = unix_millis_now() + 60_000;
        assert_eq!(next_updated_at(future), future);
        assert!(next_updated_at(0) > 0);
    }

    #[test]
    fn wire_timestamp_accepts_iso_and_millis() {
        let iso = WireTimestamp::Iso("2023-11-14T22:13:20.123Z".to_string());
        assert_eq!(
            parse_wire_timestamp(&iso, "updated_at"),
            Ok(1_700_000_000_123)
        );
        assert_eq!(
            parse_wire_timestamp(&WireTimestamp::Millis(5), "updated_at"),
            Ok(5)
        );
        let bad = WireTimestamp::Iso("soon".to_string());
        assert!(parse_wire_timestamp(&bad, "updated_at")
            .unwrap_err()
            .contains("updated_at"));
    }
}
