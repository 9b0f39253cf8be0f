//! Data models for Deskboard widgets

mod collection;
mod event;
mod note;
mod pomodoro;
mod profile;
mod record;
mod todo;

pub use collection::Collection;
pub use event::Event;
pub use note::Note;
pub use pomodoro::{AlarmSound, PomodoroSettings};
pub use profile::{Profile, SubscriptionStatus};
pub use record::{RecordId, RemoteRow, SyncRecord};
pub use todo::Todo;
