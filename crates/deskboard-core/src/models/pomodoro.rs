//! Focus timer configuration
//!
//! A singleton aggregate: there is exactly one per user, with no per-record
//! id or `updated_at`, so it is pushed whole rather than reconciled.

use serde::{Deserialize, Serialize};

use super::record::{into_row, parse_row};
use super::{Collection, RemoteRow};

/// Alarm played when a focus session ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlarmSound {
    #[default]
    Bell,
    Chime,
    Digital,
    None,
}

/// Focus timer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PomodoroSettings {
    /// Focus session length in minutes
    pub work_minutes: u32,
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
    /// Focus sessions before a long break
    pub sessions_until_long_break: u32,
    pub alarm_sound: AlarmSound,
    /// Alarm volume, 0-100
    pub volume: u8,
}

impl Default for PomodoroSettings {
    fn default() -> Self {
        Self {
            work_minutes: 25,
            short_break_minutes: 5,
            long_break_minutes: 15,
            sessions_until_long_break: 4,
            alarm_sound: AlarmSound::Bell,
            volume: 50,
        }
    }
}

impl PomodoroSettings {
    /// Clamp out-of-range values into something the timer can run.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.work_minutes = self.work_minutes.clamp(1, 180);
        self.short_break_minutes = self.short_break_minutes.clamp(1, 60);
        self.long_break_minutes = self.long_break_minutes.clamp(1, 120);
        self.sessions_until_long_break = self.sessions_until_long_break.clamp(1, 12);
        self.volume = self.volume.min(100);
        self
    }

    /// Remote row, keyed by the owning user.
    pub fn to_row(&self, user_id: &str) -> RemoteRow {
        into_row(&PomodoroRow {
            user_id: user_id.to_string(),
            work_minutes: self.work_minutes,
            short_break_minutes: self.short_break_minutes,
            long_break_minutes: self.long_break_minutes,
            sessions_until_long_break: self.sessions_until_long_break,
            alarm_sound: self.alarm_sound,
            volume: self.volume,
        })
    }

    pub fn from_row(row: RemoteRow) -> Result<Self, String> {
        let wire: PomodoroRow = parse_row(Collection::PomodoroSettings, row)?;
        Ok(Self {
            work_minutes: wire.work_minutes,
            short_break_minutes: wire.short_break_minutes,
            long_break_minutes: wire.long_break_minutes,
            sessions_until_long_break: wire.sessions_until_long_break,
            alarm_sound: wire.alarm_sound,
            volume: wire.volume,
        }
        .normalized())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PomodoroRow {
    #[serde(default)]
    user_id: String,
    work_minutes: u32,
    short_break_minutes: u32,
    long_break_minutes: u32,
    sessions_until_long_break: u32,
    #[serde(default)]
    alarm_sound: AlarmSound,
    volume: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pomodoro_default() {
        let settings = PomodoroSettings::default();
        assert_eq!(settings.work_minutes, 25);
        assert_eq!(settings.alarm_sound, AlarmSound::Bell);
    }

    #[test]
    fn test_partial_local_value_fills_defaults() {
        let settings: PomodoroSettings =
            serde_json::from_value(json!({ "workMinutes": 50, "alarmSound": "chime" })).unwrap();
        assert_eq!(settings.work_minutes, 50);
        assert_eq!(settings.alarm_sound, AlarmSound::Chime);
        assert_eq!(settings.short_break_minutes, 5);
    }

    #[test]
    fn test_row_is_keyed_by_user() {
        let row = PomodoroSettings::default().to_row("user-9");
        assert_eq!(row["user_id"], json!("user-9"));
        assert_eq!(row["alarm_sound"], json!("bell"));
        assert_eq!(
            PomodoroSettings::from_row(row).unwrap(),
            PomodoroSettings::default()
        );
    }

    #[test]
    fn test_normalized_clamps() {
        let settings = PomodoroSettings {
            work_minutes: 0,
            volume: 250,
            ..PomodoroSettings::default()
        }
        .normalized();
        assert_eq!(settings.work_minutes, 1);
        assert_eq!(settings.volume, 100);
    }
}
