//! Deskboard CLI - notes, todos, events and focus timer settings from the
//! terminal, with optional cloud sync.

mod cli;
mod commands;
mod config_profiles;
mod error;
mod remote;


use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::common::{resolve_db_path, CommandEnv};
use crate::commands::config::run_config;
use crate::commands::event::run_event;
use crate::commands::note::run_note;
use crate::commands::pomodoro::run_pomodoro;
use crate::commands::sync::run_sync;
use crate::commands::todo::run_todo;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "deskboard=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    let profile = cli.profile.as_deref();
    let load_env = || CommandEnv::load(db_path.clone(), profile);

    match cli.command {
        Commands::Config { command } => run_config(command, profile),
        Commands::Note { command } => run_note(command, &load_env()?).await,
        Commands::Todo { command } => run_todo(command, &load_env()?).await,
        Commands::Event { command } => run_event(command, &load_env()?).await,
        Commands::Pomodoro { command } => run_pomodoro(command, &load_env()?).await,
        Commands::Sync { command } => run_sync(command, &load_env()?).await,
    }
}
