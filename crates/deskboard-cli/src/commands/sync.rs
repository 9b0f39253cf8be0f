use std::sync::Arc;
use std::time::Duration;

use deskboard_core::config::SyncSettings;
use deskboard_core::sync::{FullSyncReport, SyncDispatcher, SyncReport, SyncState};
use deskboard_core::SyncError;
use serde::Serialize;

use crate::cli::SyncCommands;
use crate::commands::common::{
    format_sync_timestamp, open_engine, open_engine_with_settings, CommandEnv, EngineMode,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct SyncStatusItem {
    pub profile: String,
    pub backend_configured: bool,
    pub signed_in: bool,
    pub cloud_sync_enabled: bool,
    pub subscription_active: bool,
    pub active: bool,
    pub last_synced_at: Option<i64>,
    pub last_synced_at_iso: Option<String>,
}

pub async fn run_sync(command: SyncCommands, env: &CommandEnv) -> Result<(), CliError> {
    match command {
        SyncCommands::Now => run_sync_now(env).await,
        SyncCommands::Enable => run_sync_enable(env).await,
        SyncCommands::Disable => run_sync_disable(env).await,
        SyncCommands::Status { json } => run_sync_status(json, env).await,
        SyncCommands::Watch { interval } => run_sync_watch(interval, env).await,
    }
}

pub async fn run_sync_now(env: &CommandEnv) -> Result<(), CliError> {
    let engine = open_engine(env, EngineMode::RequireSync).await?;
    if !engine.state().is_active() {
        return Err(SyncError::Inactive.into());
    }

    let report = engine.full_sync().await?;
    print_full_sync_report(&report);
    Ok(())
}

pub async fn run_sync_enable(env: &CommandEnv) -> Result<(), CliError> {
    let engine = open_engine(env, EngineMode::RequireSync).await?;
    let report = engine.enable_cloud_sync().await?;
    println!("Cloud sync enabled");
    print_full_sync_report(&report);
    Ok(())
}

pub async fn run_sync_disable(env: &CommandEnv) -> Result<(), CliError> {
    let engine = open_engine(env, EngineMode::RequireSync).await?;
    engine.disable_cloud_sync().await?;
    println!("Cloud sync disabled; local data is kept");
    Ok(())
}

async fn run_sync_status(as_json: bool, env: &CommandEnv) -> Result<(), CliError> {
    let engine = open_engine(env, EngineMode::Connected).await?;
    let status = sync_status_item(env, &engine.state());

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        for line in format_sync_status_lines(&status) {
            println!("{line}");
        }
    }
    Ok(())
}

/// Run the periodic dispatcher until Ctrl-C.
pub async fn run_sync_watch(interval_secs: u64, env: &CommandEnv) -> Result<(), CliError> {
    let settings =
        SyncSettings::default().with_interval(Duration::from_secs(interval_secs.max(1)));
    let engine = open_engine_with_settings(env, EngineMode::RequireSync, settings).await?;
    if !engine.state().is_active() {
        return Err(SyncError::Inactive.into());
    }

    let dispatcher = SyncDispatcher::start(Arc::clone(&engine));
    println!(
        "Syncing every {}s as profile '{}'; press Ctrl-C to stop",
        engine.settings().interval.as_secs(),
        env.profile_name
    );

    tokio::signal::ctrl_c().await?;
    dispatcher.shutdown();
    println!("Stopped");
    Ok(())
}

pub fn sync_status_item(env: &CommandEnv, state: &SyncState) -> SyncStatusItem {
    SyncStatusItem {
        profile: env.profile_name.clone(),
        backend_configured: env.profile.backend_config().is_configured(),
        signed_in: state.is_authenticated,
        cloud_sync_enabled: state.cloud_sync_enabled,
        subscription_active: state.subscription_active,
        active: state.is_active(),
        last_synced_at: state.last_synced_at,
        last_synced_at_iso: state.last_synced_at.map(format_sync_timestamp),
    }
}

pub fn format_sync_status_lines(status: &SyncStatusItem) -> Vec<String> {
    let yes_no = |value: bool| if value { "yes" } else { "no" };
    vec![
        format!("Profile:             {}", status.profile),
        format!("Backend configured:  {}", yes_no(status.backend_configured)),
        format!("Signed in:           {}", yes_no(status.signed_in)),
        format!("Cloud sync enabled:  {}", yes_no(status.cloud_sync_enabled)),
        format!("Subscription active: {}", yes_no(status.subscription_active)),
        format!(
            "Last synced:         {}",
            status.last_synced_at_iso.as_deref().unwrap_or("never")
        ),
    ]
}

fn print_full_sync_report(report: &FullSyncReport) {
    for line in format_sync_report_lines(&report.reports) {
        println!("{line}");
    }
    println!(
        "Sync completed at {}",
        format_sync_timestamp(report.synced_at)
    );
}

pub fn format_sync_report_lines(reports: &[SyncReport]) -> Vec<String> {
    reports
        .iter()
        .map(|report| {
            let mut line = format!(
                "{:<18} {} local, {} pushed, {} deleted, {} pulled",
                report.collection.to_string(),
                report.merged,
                report.upserted,
                report.deleted,
                report.adopted
            );
            if report.bootstrap {
                line.push_str(" (first sync)");
            }
            if report.skipped_rows > 0 {
                line.push_str(&format!(", {} unreadable row(s) skipped", report.skipped_rows));
            }
            line
        })
        .collect()
}
