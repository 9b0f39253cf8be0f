use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use deskboard_core::models::AlarmSound;

#[derive(Parser)]
#[command(name = "deskboard")]
#[command(about = "Notes, todos, events and a focus timer, synced when you want them to be")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name holding backend and session configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage notes
    Note {
        #[command(subcommand)]
        command: NoteCommands,
    },
    /// Manage todos
    Todo {
        #[command(subcommand)]
        command: TodoCommands,
    },
    /// Manage calendar events
    Event {
        #[command(subcommand)]
        command: EventCommands,
    },
    /// Show or change focus timer settings
    Pomodoro {
        #[command(subcommand)]
        command: PomodoroCommands,
    },
    /// Cloud sync
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum NoteCommands {
    /// Create a new note
    #[command(alias = "new")]
    Add {
        /// Note title
        #[arg(short, long, default_value = "")]
        title: String,
        /// Note content
        content: Vec<String>,
    },
    /// List notes, most recently changed first
    List {
        /// Number of notes to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit a note's content in $EDITOR
    Edit {
        /// Note ID or unique ID prefix
        id: String,
        /// Replace the content without opening an editor
        #[arg(long)]
        content: Option<String>,
    },
    /// Delete a note
    Delete {
        /// Note ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum TodoCommands {
    /// Add a todo
    Add {
        /// Todo text
        text: Vec<String>,
    },
    /// List todos
    List {
        /// Hide completed todos
        #[arg(long)]
        open: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a todo done, or undone again
    Toggle {
        /// Todo ID or unique ID prefix
        id: String,
    },
    /// Delete a todo
    Delete {
        /// Todo ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum EventCommands {
    /// Add an event
    Add {
        /// Event title
        title: String,
        /// Day of the event (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        date: String,
        /// Start time (HH:MM); all-day when omitted
        #[arg(long, value_name = "TIME")]
        time: Option<String>,
        /// Longer description
        #[arg(long)]
        description: Option<String>,
    },
    /// List events in calendar order
    List {
        /// Only events on or after this day (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        from: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete an event
    Delete {
        /// Event ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum PomodoroCommands {
    /// Show current settings
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change settings; omitted values are kept
    Set {
        /// Focus session length in minutes
        #[arg(long)]
        work: Option<u32>,
        /// Short break length in minutes
        #[arg(long)]
        short_break: Option<u32>,
        /// Long break length in minutes
        #[arg(long)]
        long_break: Option<u32>,
        /// Focus sessions before a long break
        #[arg(long)]
        sessions: Option<u32>,
        /// Alarm played when a session ends
        #[arg(long, value_enum)]
        sound: Option<SoundArg>,
        /// Alarm volume, 0-100
        #[arg(long)]
        volume: Option<u8>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum SoundArg {
    Bell,
    Chime,
    Digital,
    None,
}

impl From<SoundArg> for AlarmSound {
    fn from(value: SoundArg) -> Self {
        match value {
            SoundArg::Bell => Self::Bell,
            SoundArg::Chime => Self::Chime,
            SoundArg::Digital => Self::Digital,
            SoundArg::None => Self::None,
        }
    }
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Run a full sync of every collection now
    Now,
    /// Turn cloud sync on for the signed-in account and sync immediately
    Enable,
    /// Turn cloud sync off; local data is kept
    Disable,
    /// Show sign-in, entitlement and last sync time
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep syncing periodically until interrupted
    Watch {
        /// Seconds between passes
        #[arg(long, default_value = "30")]
        interval: u64,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Backend project URL
        #[arg(long, value_name = "URL")]
        backend_url: Option<String>,
        /// Backend anon/public key
        #[arg(long, value_name = "KEY")]
        anon_key: Option<String>,
        /// Signed-in user id
        #[arg(long, value_name = "ID")]
        user_id: Option<String>,
        /// Access token of the signed-in user
        #[arg(long, value_name = "TOKEN")]
        access_token: Option<String>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
}
