use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{NaiveDate, NaiveTime, Utc};
use deskboard_core::config::SyncSettings;
use deskboard_core::db::SqliteBlobStorage;
use deskboard_core::models::{Collection, SyncRecord};
use deskboard_core::{EnvelopeStore, SyncEngine, SyncError, SyncResult};

use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;
use crate::remote::CliRemote;

pub type CliEngine = SyncEngine<CliRemote, CliRemote>;

/// Resolved inputs shared by every data command.
#[derive(Debug, Clone)]
pub struct CommandEnv {
    pub db_path: PathBuf,
    pub profile_name: String,
    pub profile: CliProfile,
}

impl CommandEnv {
    pub fn load(db_path: PathBuf, explicit_profile: Option<&str>) -> Result<Self, CliError> {
        let config = CliProfilesConfig::load().map_err(CliError::Config)?;
        let profile_name = config.resolve_profile_name(explicit_profile);
        let profile = config.profile(&profile_name).cloned().unwrap_or_default();
        Ok(Self {
            db_path,
            profile_name,
            profile,
        })
    }

    /// Environment with no backend configured; every change stays local.
    pub fn offline(db_path: PathBuf) -> Self {
        Self {
            db_path,
            profile_name: "default".to_string(),
            profile: CliProfile::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineMode {
    /// Never touch the network
    Local,
    /// Sign in when a session is configured; failures fall back to local
    Connected,
    /// Sign-in must succeed
    RequireSync,
}

pub async fn open_engine(env: &CommandEnv, mode: EngineMode) -> Result<Arc<CliEngine>, CliError> {
    open_engine_with_settings(env, mode, SyncSettings::default()).await
}

pub async fn open_engine_with_settings(
    env: &CommandEnv,
    mode: EngineMode,
    settings: SyncSettings,
) -> Result<Arc<CliEngine>, CliError> {
    if let Some(parent) = env.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let storage = SqliteBlobStorage::open(&env.db_path)?;
    let store = Arc::new(EnvelopeStore::open(
        settings.root_key.clone(),
        Arc::new(storage),
    )?);

    let session = match mode {
        EngineMode::Local => None,
        EngineMode::Connected | EngineMode::RequireSync => env.profile.session(),
    };
    let remote = match CliRemote::from_config(&env.profile.backend_config(), session.as_ref()) {
        Ok(remote) => remote,
        Err(error) if mode == EngineMode::RequireSync => return Err(error.into()),
        Err(error) => {
            tracing::warn!("Ignoring backend configuration: {}", error);
            CliRemote::Unconfigured
        }
    };
    let remote_configured = remote.is_configured();
    let remote = Arc::new(remote);
    let engine = Arc::new(SyncEngine::new(
        store,
        Arc::clone(&remote),
        remote,
        settings,
    ));

    match (mode, session) {
        (EngineMode::Local, _) => {}
        (EngineMode::RequireSync, None) => return Err(CliError::SyncNotConfigured),
        (EngineMode::RequireSync, Some(_)) if !remote_configured => {
            return Err(CliError::SyncNotConfigured);
        }
        (EngineMode::RequireSync, Some(session)) => {
            engine.sign_in(session).await?;
        }
        (EngineMode::Connected, Some(session)) if remote_configured => {
            if let Err(error) = engine.sign_in(session).await {
                tracing::warn!("Continuing offline, sign-in failed: {}", error);
            }
        }
        (EngineMode::Connected, _) => {
            tracing::debug!("No backend session for profile '{}'", env.profile_name);
        }
    }

    Ok(engine)
}

/// Treat a remote write failure as a warning. The local change has already
/// been applied and the next full sync pushes it.
pub fn keep_local_change<T>(result: SyncResult<T>) -> Result<Option<T>, CliError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(SyncError::Local(error)) => Err(error.into()),
        Err(error) => {
            tracing::warn!("Remote write failed: {}", error);
            eprintln!("Warning: saved locally, cloud update failed: {error}");
            Ok(None)
        }
    }
}

pub const fn record_label(collection: Collection) -> &'static str {
    match collection {
        Collection::Notes => "note",
        Collection::Todos => "todo",
        Collection::Events => "event",
        Collection::PomodoroSettings => "pomodoro settings",
    }
}

pub fn normalize_record_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyRecordId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Find a record by full id or by a unique id prefix.
pub fn resolve_record<T: SyncRecord>(records: &[T], query: &str) -> Result<T, CliError> {
    let query = normalize_record_identifier(query)?;
    if let Some(record) = records.iter().find(|record| record.id().as_str() == query) {
        return Ok(record.clone());
    }

    let matching = records
        .iter()
        .filter(|record| record.id().as_str().starts_with(&query))
        .collect::<Vec<_>>();

    match matching.as_slice() {
        [] => Err(CliError::RecordNotFound(
            record_label(T::COLLECTION),
            query,
        )),
        [record] => Ok((*record).clone()),
        _ => {
            let options = matching
                .iter()
                .take(3)
                .map(|record| short_id(record.id().as_str()))
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousRecordId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

pub fn text_preview(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| CliError::InvalidDate(value.to_string()))
}

pub fn parse_time(value: &str) -> Result<NaiveTime, CliError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| CliError::InvalidTime(value.to_string()))
}

/// Content from arguments, then piped stdin, then `$EDITOR`.
pub fn resolve_text_input(parts: &[String]) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    if let Some(content) = capture_editor_input_with_initial("")? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Command::new(editor).arg(file_path).status() {
        Ok(status) => {
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let mut command = Command::new(program);
            command.args(parts).arg(file_path);

            let status = command.status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

fn create_temp_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("deskboard-{}-{now}.md", std::process::id()))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("DESKBOARD_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("deskboard")
        .join("deskboard.db")
}
