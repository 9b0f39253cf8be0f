use std::env;
use std::path::Path;

use deskboard_core::util::is_http_url;

use crate::cli::ConfigCommands;
use crate::config_profiles::{normalize_text_option, CliProfile, CliProfilesConfig};
use crate::error::CliError;

/// Values passed to `config init`; `None` falls back to the environment,
/// then to what the profile already holds.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub backend_url: Option<String>,
    pub anon_key: Option<String>,
    pub user_id: Option<String>,
    pub access_token: Option<String>,
}

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            backend_url,
            anon_key,
            user_id,
            access_token,
            no_activate,
        } => {
            let update = ProfileUpdate {
                backend_url,
                anon_key,
                user_id,
                access_token,
            };
            let path = crate::config_profiles::default_config_path().map_err(CliError::Config)?;
            run_config_init(&path, profile.as_deref().or(global_profile), update, no_activate)
        }
    }
}

pub fn run_config_init(
    config_path: &Path,
    profile_name: Option<&str>,
    update: ProfileUpdate,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load_from_path(config_path).map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    let existing_profile = config.profile(&profile_name).cloned().unwrap_or_default();

    let merged = merge_profile(&existing_profile, update);
    validate_profile(&merged)?;

    *config.profile_mut_or_default(&profile_name) = merged;
    if !no_activate || config.active_profile.is_none() {
        config.active_profile = Some(profile_name.clone());
    }

    config.save_to_path(config_path).map_err(CliError::Config)?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        config_path.display()
    );

    let profile = config
        .profiles
        .get(&profile_name)
        .ok_or_else(|| CliError::Config("Failed to persist profile".to_string()))?;
    let missing_fields = missing_sync_fields(profile);
    if missing_fields.is_empty() {
        println!(
            "Cloud sync profile '{profile_name}' is ready. Run `deskboard sync enable` to turn it on."
        );
    } else {
        println!(
            "Profile '{}' is missing: {}",
            profile_name,
            missing_fields.join(", ")
        );
    }

    Ok(())
}

pub fn merge_profile(existing: &CliProfile, update: ProfileUpdate) -> CliProfile {
    CliProfile {
        backend_url: normalize_text_option(update.backend_url)
            .or_else(|| normalize_text_option(env::var("DESKBOARD_BACKEND_URL").ok()))
            .or_else(|| normalize_text_option(existing.backend_url.clone())),
        anon_key: normalize_text_option(update.anon_key)
            .or_else(|| normalize_text_option(env::var("DESKBOARD_ANON_KEY").ok()))
            .or_else(|| normalize_text_option(existing.anon_key.clone())),
        user_id: normalize_text_option(update.user_id)
            .or_else(|| normalize_text_option(existing.user_id.clone())),
        access_token: normalize_text_option(update.access_token)
            .or_else(|| normalize_text_option(existing.access_token.clone())),
    }
}

pub fn missing_sync_fields(profile: &CliProfile) -> Vec<&'static str> {
    let mut missing_fields = Vec::new();
    if profile.backend_url.is_none() {
        missing_fields.push("backend_url");
    }
    if profile.anon_key.is_none() {
        missing_fields.push("anon_key");
    }
    if profile.user_id.is_none() {
        missing_fields.push("user_id");
    }
    if profile.access_token.is_none() {
        missing_fields.push("access_token");
    }
    missing_fields
}

fn validate_profile(profile: &CliProfile) -> Result<(), CliError> {
    if let Some(url) = profile.backend_url.as_deref() {
        if !is_http_url(url) {
            return Err(CliError::Config(
                "backend_url must include http:// or https://".to_string(),
            ));
        }
    }
    Ok(())
}
