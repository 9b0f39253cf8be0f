use chrono::NaiveDate;
use deskboard_core::Event;
use serde::Serialize;

use crate::cli::EventCommands;
use crate::commands::common::{
    keep_local_change, open_engine, parse_date, parse_time, resolve_record, short_id,
    text_preview, CommandEnv, EngineMode,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct EventListItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub date: String,
    pub time: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

pub async fn run_event(command: EventCommands, env: &CommandEnv) -> Result<(), CliError> {
    match command {
        EventCommands::Add {
            title,
            date,
            time,
            description,
        } => run_event_add(&title, &date, time.as_deref(), description, env).await,
        EventCommands::List { from, json } => run_event_list(from.as_deref(), json, env).await,
        EventCommands::Delete { id } => run_event_delete(&id, env).await,
    }
}

pub async fn run_event_add(
    title: &str,
    date: &str,
    time: Option<&str>,
    description: Option<String>,
    env: &CommandEnv,
) -> Result<(), CliError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(CliError::EmptyContent);
    }
    let date = parse_date(date)?;
    let time = time.map(parse_time).transpose()?;

    let mut event = Event::new(title, date, time);
    if let Some(description) = description {
        event.description = description.trim().to_string();
    }
    let id = event.id.clone();

    let engine = open_engine(env, EngineMode::Connected).await?;
    keep_local_change(engine.create(event).await)?;

    println!("{id}");
    Ok(())
}

/// Events in calendar order; all-day events lead their day.
pub async fn list_events(from: Option<NaiveDate>, env: &CommandEnv) -> Result<Vec<Event>, CliError> {
    let engine = open_engine(env, EngineMode::Local).await?;
    let mut events = engine.records::<Event>();
    if let Some(from) = from {
        events.retain(|event| event.date >= from);
    }
    events.sort_by(|left, right| {
        left.date
            .cmp(&right.date)
            .then_with(|| left.time.cmp(&right.time))
            .then_with(|| left.title.cmp(&right.title))
    });
    Ok(events)
}

async fn run_event_list(from: Option<&str>, as_json: bool, env: &CommandEnv) -> Result<(), CliError> {
    let from = from.map(parse_date).transpose()?;
    let events = list_events(from, env).await?;

    if as_json {
        let json_items = events
            .iter()
            .map(event_to_list_item)
            .collect::<Vec<EventListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if events.is_empty() {
        println!("No events.");
    } else {
        for line in format_event_lines(&events) {
            println!("{line}");
        }
    }

    Ok(())
}

pub async fn run_event_delete(id: &str, env: &CommandEnv) -> Result<(), CliError> {
    let engine = open_engine(env, EngineMode::Connected).await?;
    let event = resolve_record(&engine.records::<Event>(), id)?;

    keep_local_change(engine.delete::<Event>(&event.id).await)?;
    println!("{}", event.id);
    Ok(())
}

pub fn format_event_lines(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .map(|event| {
            let when = event.time.map_or_else(
                || "all day".to_string(),
                |time| time.format("%H:%M").to_string(),
            );
            format!(
                "{:<13}  {}  {when:<7}  {}",
                short_id(event.id.as_str()),
                event.date.format("%Y-%m-%d"),
                text_preview(&event.title, 50)
            )
        })
        .collect()
}

pub fn event_to_list_item(event: &Event) -> EventListItem {
    EventListItem {
        id: event.id.to_string(),
        title: event.title.clone(),
        description: event.description.clone(),
        date: event.date.format("%Y-%m-%d").to_string(),
        time: event.time.map(|time| time.format("%H:%M").to_string()),
        created_at: event.created_at,
        updated_at: event.updated_at,
    }
}
