//! Scheduled event model

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::record::{into_row, next_updated_at, parse_row, wire_timestamps, WireTimestamp};
use super::{Collection, RecordId, RemoteRow, SyncRecord};
use crate::util::{millis_to_iso, unix_millis_now};

/// A calendar entry shown by the schedule widget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: RecordId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Calendar day (`YYYY-MM-DD`)
    pub date: NaiveDate,
    /// Optional start time; all-day when absent
    #[serde(default)]
    pub time: Option<NaiveTime>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Event {
    #[must_use]
    pub fn new(title: impl Into<String>, date: NaiveDate, time: Option<NaiveTime>) -> Self {
        let now = unix_millis_now();
        Self {
            id: RecordId::new(),
            title: title.into(),
            description: String::new(),
            date,
            time,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.updated_at = next_updated_at(self.updated_at);
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
        self.updated_at = next_updated_at(self.updated_at);
    }

    pub fn reschedule(&mut self, date: NaiveDate, time: Option<NaiveTime>) {
        self.date = date;
        self.time = time;
        self.updated_at = next_updated_at(self.updated_at);
    }

    pub const fn is_all_day(&self) -> bool {
        self.time.is_none()
    }
}

#[derive(Debug, Serialize)]
struct EventRowOut<'a> {
    id: &'a str,
    user_id: &'a str,
    title: &'a str,
    description: &'a str,
    date: NaiveDate,
    time: Option<NaiveTime>,
    created_at: String,
    updated_at: String,
}

#[derive(Debug, Deserialize)]
struct EventRowIn {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    date: NaiveDate,
    #[serde(default)]
    time: Option<NaiveTime>,
    #[serde(default)]
    created_at: Option<WireTimestamp>,
    #[serde(default)]
    updated_at: Option<WireTimestamp>,
}

impl SyncRecord for Event {
    const COLLECTION: Collection = Collection::Events;

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
        into_row(&EventRowOut {
            id: self.id.as_str(),
            user_id,
            title: &self.title,
            description: &self.description,
            date: self.date,
            time: self.time,
            created_at: millis_to_iso(self.created_at),
            updated_at: millis_to_iso(self.updated_at),
        })
    }

    fn from_row(row: RemoteRow) -> Result<Self, String> {
        let wire: EventRowIn = parse_row(Self::COLLECTION, row)?;
        let (created_at, updated_at) = wire_timestamps(wire.created_at, wire.updated_at)?;
        Ok(Self {
            id: RecordId::from(wire.id),
            title: wire.title.unwrap_or_default(),
            description: wire.description.unwrap_or_default(),
            date: wire.date,
            time: wire.time,
            created_at,
            updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_reschedule_bumps_updated_at() {
        let mut event = Event::new("Dentist", date(2026, 3, 1), None);
        assert!(event.is_all_day());
        event.updated_at = 0;
        event.reschedule(date(2026, 3, 2), NaiveTime::from_hms_opt(9, 30, 0));
        assert!(!event.is_all_day());
        assert!(event.updated_at > 0);
    }

    #[test]
    fn test_row_uses_iso_date_and_time() {
        let event = Event::new("Standup", date(2026, 1, 5), NaiveTime::from_hms_opt(9, 0, 0));
        let row = event.to_row("u");
        assert_eq!(row["date"], json!("2026-01-05"));
        assert_eq!(row["time"], json!("09:00:00"));
        assert_eq!(Event::from_row(row).unwrap(), event);
    }

    #[test]
    fn test_from_row_requires_date() {
        let serde_json::Value::Object(row) = json!({
            "id": "e1",
            "title": "No date",
            "created_at": "2026-01-01T00:00:00Z"
        }) else {
            unreachable!()
        };
        assert!(Event::from_row(row).is_err());
    }
}
