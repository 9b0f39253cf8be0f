use deskboard_core::sync::{BlurOutcome, FieldTarget, FieldTracker};
use deskboard_core::Note;
use serde::Serialize;

use crate::cli::NoteCommands;
use crate::commands::common::{
    capture_editor_input_with_initial, format_relative_time, keep_local_change, normalize_content,
    now_ms, open_engine, resolve_record, resolve_text_input, short_id, text_preview, CommandEnv,
    EngineMode,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct NoteListItem {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub content: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub relative_time: String,
}

pub async fn run_note(command: NoteCommands, env: &CommandEnv) -> Result<(), CliError> {
    match command {
        NoteCommands::Add { title, content } => run_note_add(&title, &content, env).await,
        NoteCommands::List { limit, json } => run_note_list(limit, json, env).await,
        NoteCommands::Edit { id, content } => run_note_edit(&id, content, env).await,
        NoteCommands::Delete { id } => run_note_delete(&id, env).await,
    }
}

pub async fn run_note_add(
    title: &str,
    content_parts: &[String],
    env: &CommandEnv,
) -> Result<(), CliError> {
    let content = resolve_text_input(content_parts)?;
    let note = Note::new(title.trim(), content);
    let id = note.id.clone();

    let engine = open_engine(env, EngineMode::Connected).await?;
    keep_local_change(engine.create(note).await)?;

    println!("{id}");
    Ok(())
}

pub async fn list_notes(limit: usize, env: &CommandEnv) -> Result<Vec<Note>, CliError> {
    let engine = open_engine(env, EngineMode::Local).await?;
    let mut notes = engine.records::<Note>();
    notes.sort_by(|left, right| {
        right
            .updated_at
            .cmp(&left.updated_at)
            .then_with(|| left.id.cmp(&right.id))
    });
    notes.truncate(limit);
    Ok(notes)
}

async fn run_note_list(limit: usize, as_json: bool, env: &CommandEnv) -> Result<(), CliError> {
    let notes = list_notes(limit, env).await?;

    if as_json {
        let json_items = notes
            .iter()
            .map(note_to_list_item)
            .collect::<Vec<NoteListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if notes.is_empty() {
        println!("No notes yet.");
    } else {
        for line in format_note_lines(&notes) {
            println!("{line}");
        }
    }

    Ok(())
}

/// Edit a note's content as one focus/blur session: the change lands locally
/// first and is published when the session ends.
pub async fn run_note_edit(
    id: &str,
    replacement: Option<String>,
    env: &CommandEnv,
) -> Result<(), CliError> {
    let engine = open_engine(env, EngineMode::Connected).await?;
    let note = resolve_record(&engine.records::<Note>(), id)?;

    let mut tracker = FieldTracker::new();
    tracker.focus(note.content.clone());

    let edited = match replacement {
        Some(content) => normalize_content(&content),
        None => capture_editor_input_with_initial(&note.content)?,
    };
    let Some(edited) = edited else {
        return Err(CliError::EmptyEditedContent);
    };

    if edited != note.content {
        let content = edited.clone();
        engine.update_local::<Note>(&note.id, move |note| note.set_content(content))?;
    }

    let target = FieldTarget::new(note.id.clone(), "content");
    if let Some(outcome) =
        keep_local_change(engine.blur_field::<Note, String>(&mut tracker, &target, edited).await)?
    {
        if outcome == BlurOutcome::Deferred {
            tracing::debug!("Note {} saved locally; cloud sync is inactive", note.id);
        }
    }

    println!("{}", note.id);
    Ok(())
}

pub async fn run_note_delete(id: &str, env: &CommandEnv) -> Result<(), CliError> {
    let engine = open_engine(env, EngineMode::Connected).await?;
    let note = resolve_record(&engine.records::<Note>(), id)?;

    keep_local_change(engine.delete::<Note>(&note.id).await)?;
    println!("{}", note.id);
    Ok(())
}

pub fn format_note_lines(notes: &[Note]) -> Vec<String> {
    let now_ms = now_ms();
    notes
        .iter()
        .map(|note| {
            let short_id = short_id(note.id.as_str());
            let preview = note_preview(note, 40);
            let relative_time = format_relative_time(note.updated_at, now_ms);
            format!("{short_id:<13}  {preview:<40}  {relative_time}")
        })
        .collect()
}

pub fn note_to_list_item(note: &Note) -> NoteListItem {
    NoteListItem {
        id: note.id.to_string(),
        title: note.title.clone(),
        preview: note_preview(note, 80),
        content: note.content.clone(),
        created_at: note.created_at,
        updated_at: note.updated_at,
        relative_time: format_relative_time(note.updated_at, now_ms()),
    }
}

/// Title when present, otherwise the first line of the content.
pub fn note_preview(note: &Note, max_chars: usize) -> String {
    if note.title.trim().is_empty() {
        text_preview(&note.content, max_chars)
    } else {
        text_preview(&note.title, max_chars)
    }
}
