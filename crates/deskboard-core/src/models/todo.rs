//! Todo model

use serde::{Deserialize, Serialize};

use super::record::{into_row, next_updated_at, parse_row, wire_timestamps, WireTimestamp};
use super::{Collection, RecordId, RemoteRow, SyncRecord};
use crate::util::{millis_to_iso, unix_millis_now};

/// A task list entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: RecordId,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Todo {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        let now = unix_millis_now();
        Self {
            id: RecordId::new(),
            text: text.into(),
            completed: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.updated_at = next_updated_at(self.updated_at);
    }

    /// Flip completion and return the new state.
    pub fn toggle(&mut self) -> bool {
        self.completed = !self.completed;
        self.updated_at = next_updated_at(self.updated_at);
        self.completed
    }
}

#[derive(Debug, Serialize)]
struct TodoRowOut<'a> {
    id: &'a str,
    user_id: &'a str,
    text: &'a str,
    completed: bool,
    created_at: String,
    updated_at: String,
}

#[derive(Debug, Deserialize)]
struct TodoRowIn {
    id: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    completed: Option<bool>,
    #[serde(default)]
    created_at: Option<WireTimestamp>,
    #[serde(default)]
    updated_at: Option<WireTimestamp>,
}

impl SyncRecord for Todo {
    const COLLECTION: Collection = Collection::Todos;

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
        into_row(&TodoRowOut {
            id: self.id.as_str(),
            user_id,
            text: &self.text,
            completed: self.completed,
            created_at: millis_to_iso(self.created_at),
            updated_at: millis_to_iso(self.updated_at),
        })
    }

    fn from_row(row: RemoteRow) -> Result<Self, String> {
        let wire: TodoRowIn = parse_row(Self::COLLECTION, row)?;
        let (created_at, updated_at) = wire_timestamps(wire.created_at, wire.updated_at)?;
        Ok(Self {
            id: RecordId::from(wire.id),
            text: wire.text.unwrap_or_default(),
            completed: wire.completed.unwrap_or(false),
            created_at,
            updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_toggle_flips_and_bumps() {
        let mut todo = Todo::new("water plants");
        todo.updated_at = 1;
        assert!(todo.toggle());
        assert!(todo.updated_at > 1);
        assert!(!todo.toggle());
    }

    #[test]
    fn test_row_roundtrip_keeps_completion() {
        let mut todo = Todo::new("ship it");
        todo.completed = true;
        let row = todo.to_row("u");
        assert_eq!(row["completed"], json!(true));
        assert_eq!(Todo::from_row(row).unwrap(), todo);
    }

    #[test]
    fn test_legacy_local_entry_without_completed_flag() {
        let todo: Todo = serde_json::from_value(json!({
            "id": "t1",
            "text": "old",
            "createdAt": 1,
            "updatedAt": 1
        }))
        .unwrap();
        assert!(!todo.completed);
    }
}
