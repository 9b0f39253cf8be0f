//! deskboard-core - Core library for Deskboard
//!
//! This crate contains the widget models, the local envelope store, and the
//! local-first sync engine shared by every Deskboard interface.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod store;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Event, Note, PomodoroSettings, RecordId, Todo};
pub use store::{CollectionHandle, EnvelopeStore};
pub use sync::{SyncEngine, SyncError, SyncResult};
