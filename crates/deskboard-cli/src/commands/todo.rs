use deskboard_core::Todo;
use serde::Serialize;

use crate::cli::TodoCommands;
use crate::commands::common::{
    keep_local_change, open_engine, resolve_record, resolve_text_input, short_id, text_preview,
    CommandEnv, EngineMode,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct TodoListItem {
    pub id: String,
    pub text: String,
    pub completed: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

pub async fn run_todo(command: TodoCommands, env: &CommandEnv) -> Result<(), CliError> {
    match command {
        TodoCommands::Add { text } => run_todo_add(&text, env).await,
        TodoCommands::List { open, json } => run_todo_list(open, json, env).await,
        TodoCommands::Toggle { id } => run_todo_toggle(&id, env).await,
        TodoCommands::Delete { id } => run_todo_delete(&id, env).await,
    }
}

pub async fn run_todo_add(text_parts: &[String], env: &CommandEnv) -> Result<(), CliError> {
    let text = resolve_text_input(text_parts)?;
    let todo = Todo::new(text);
    let id = todo.id.clone();

    let engine = open_engine(env, EngineMode::Connected).await?;
    keep_local_change(engine.create(todo).await)?;

    println!("{id}");
    Ok(())
}

/// Open todos first, then newest first.
pub async fn list_todos(open_only: bool, env: &CommandEnv) -> Result<Vec<Todo>, CliError> {
    let engine = open_engine(env, EngineMode::Local).await?;
    let mut todos = engine.records::<Todo>();
    if open_only {
        todos.retain(|todo| !todo.completed);
    }
    todos.sort_by(|left, right| {
        left.completed
            .cmp(&right.completed)
            .then_with(|| right.created_at.cmp(&left.created_at))
            .then_with(|| left.id.cmp(&right.id))
    });
    Ok(todos)
}

async fn run_todo_list(open_only: bool, as_json: bool, env: &CommandEnv) -> Result<(), CliError> {
    let todos = list_todos(open_only, env).await?;

    if as_json {
        let json_items = todos
            .iter()
            .map(todo_to_list_item)
            .collect::<Vec<TodoListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if todos.is_empty() {
        println!("Nothing to do.");
    } else {
        for line in format_todo_lines(&todos) {
            println!("{line}");
        }
    }

    Ok(())
}

pub async fn run_todo_toggle(id: &str, env: &CommandEnv) -> Result<(), CliError> {
    let engine = open_engine(env, EngineMode::Connected).await?;
    let todo = resolve_record(&engine.records::<Todo>(), id)?;

    keep_local_change(engine.toggle_todo(&todo.id).await)?;
    let toggled = resolve_record(&engine.records::<Todo>(), todo.id.as_str())?;

    println!("{}", format_todo_line(&toggled));
    Ok(())
}

pub async fn run_todo_delete(id: &str, env: &CommandEnv) -> Result<(), CliError> {
    let engine = open_engine(env, EngineMode::Connected).await?;
    let todo = resolve_record(&engine.records::<Todo>(), id)?;

    keep_local_change(engine.delete::<Todo>(&todo.id).await)?;
    println!("{}", todo.id);
    Ok(())
}

pub fn format_todo_lines(todos: &[Todo]) -> Vec<String> {
    todos.iter().map(format_todo_line).collect()
}

pub fn format_todo_line(todo: &Todo) -> String {
    let mark = if todo.completed { "x" } else { " " };
    format!(
        "{:<13}  [{mark}] {}",
        short_id(todo.id.as_str()),
        text_preview(&todo.text, 60)
    )
}

pub fn todo_to_list_item(todo: &Todo) -> TodoListItem {
    TodoListItem {
        id: todo.id.to_string(),
        text: todo.text.clone(),
        completed: todo.completed,
        created_at: todo.created_at,
        updated_at: todo.updated_at,
    }
}
