//! Note model

use serde::{Deserialize, Serialize};

use super::record::{into_row, next_updated_at, parse_row, wire_timestamps, WireTimestamp};
use super::{Collection, RecordId, RemoteRow, SyncRecord};
use crate::util::{millis_to_iso, unix_millis_now};

/// A note widget entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Unique identifier
    pub id: RecordId,
    /// Short heading
    #[serde(default)]
    pub title: String,
    /// Plain text content
    #[serde(default)]
    pub content: String,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl Note {
    /// Create a new note with the given title and content
    #[must_use]
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = unix_millis_now();
        Self {
            id: RecordId::new(),
            title: title.into(),
            content: content.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.updated_at = next_updated_at(self.updated_at);
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.updated_at = next_updated_at(self.updated_at);
    }

    /// Get first line of the content as a preview, truncated to `max_len` characters
    #[must_use]
    pub fn preview(&self, max_len: usize) -> String {
        let source = if self.title.trim().is_empty() {
            self.content.lines().next().unwrap_or("")
        } else {
            self.title.as_str()
        };
        source.trim().chars().take(max_len).collect()
    }
}

#[derive(Debug, Serialize)]
struct NoteRowOut<'a> {
    id: &'a str,
    user_id: &'a str,
    title: &'a str,
    content: &'a str,
    created_at: String,
    updated_at: String,
}

#[derive(Debug, Deserialize)]
struct NoteRowIn {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    created_at: Option<WireTimestamp>,
    #[serde(default)]
    updated_at: Option<WireTimestamp>,
}

impl SyncRecord for Note {
    const COLLECTION: Collection = Collection::Notes;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn to_row(&self, user_id: &str) -> RemoteRow {
        into_row(&NoteRowOut {
            id: self.id.as_str(),
            user_id,
            title: &self.title,
            content: &self.content,
            created_at: millis_to_iso(self.created_at),
            updated_at: millis_to_iso(self.updated_at),
        })
    }

    fn from_row(row: RemoteRow) -> Result<Self, String> {
        let wire: NoteRowIn = parse_row(Self::COLLECTION, row)?;
        let (created_at, updated_at) = wire_timestamps(wire.created_at, wire.updated_at)?;
        Ok(Self {
            id: RecordId::from(wire.id),
            title: wire.title.unwrap_or_default(),
            content: wire.content.unwrap_or_default(),
            created_at,
            updated_at,
        })
    }
}
