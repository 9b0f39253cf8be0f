//! Logical collections kept in the envelope store and mirrored remotely

use std::fmt;

use serde::{Deserialize, Serialize};

/// One synchronized entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Notes,
    Todos,
    Events,
    PomodoroSettings,
}

impl Collection {
    /// Every collection, in the order a full sync visits them.
    pub const ALL: [Self; 4] = [
        Self::Notes,
        Self::Todos,
        Self::Events,
        Self::PomodoroSettings,
    ];

    /// Key of this collection's envelope inside the root blob.
    pub const fn store_key(self) -> &'static str {
        match self {
            Self::Notes => "notes",
            Self::Todos => "todos",
            Self::Events => "events",
            Self::PomodoroSettings => "pomodoro-settings",
        }
    }

    /// Remote table name.
    pub const fn table(self) -> &'static str {
        match self {
            Self::Notes => "notes",
            Self::Todos => "todos",
            Self::Events => "events",
            Self::PomodoroSettings => "pomodoro_settings",
        }
    }

    /// Whether records are reconciled by id (as opposed to a singleton push).
    pub const fn is_record_collection(self) -> bool {
        !matches!(self, Self::PomodoroSettings)
    }

    /// Position in [`Collection::ALL`]; used to index per-collection state.
    pub const fn index(self) -> usize {
        match self {
            Self::Notes => 0,
            Self::Todos => 1,
            Self::Events => 2,
            Self::PomodoroSettings => 3,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_keys_and_tables_differ_only_for_pomodoro() {
        for collection in Collection::ALL {
            if collection.is_record_collection() {
                assert_eq!(collection.store_key(), collection.table());
            }
        }
        assert_eq!(Collection::PomodoroSettings.store_key(), "pomodoro-settings");
        assert_eq!(Collection::PomodoroSettings.table(), "pomodoro_settings");
    }

    #[test]
    fn index_matches_position_in_all() {
        for (position, collection) in Collection::ALL.iter().enumerate() {
            assert_eq!(collection.index(), position);
        }
    }
}
