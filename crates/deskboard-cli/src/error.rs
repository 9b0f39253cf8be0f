use std::io;

use deskboard_core::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] deskboard_core::Error),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No content provided")]
    EmptyContent,
    #[error("Edited note content cannot be empty")]
    EmptyEditedContent,
    #[error("ID cannot be empty")]
    EmptyRecordId,
    #[error("No {0} found for id/prefix: {1}")]
    RecordNotFound(&'static str, String),
    #[error("{0}")]
    AmbiguousRecordId(String),
    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("Invalid time '{0}', expected HH:MM")]
    InvalidTime(String),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Cloud sync is not configured. Run `deskboard config init` with --backend-url, --anon-key, --user-id and --access-token."
    )]
    SyncNotConfigured,
}
