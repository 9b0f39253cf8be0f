use deskboard_core::models::AlarmSound;
use deskboard_core::PomodoroSettings;

use crate::cli::PomodoroCommands;
use crate::commands::common::{keep_local_change, open_engine, CommandEnv, EngineMode};
use crate::error::CliError;

/// Requested changes; `None` keeps the stored value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PomodoroChanges {
    pub work: Option<u32>,
    pub short_break: Option<u32>,
    pub long_break: Option<u32>,
    pub sessions: Option<u32>,
    pub sound: Option<AlarmSound>,
    pub volume: Option<u8>,
}

impl PomodoroChanges {
    pub const fn is_empty(&self) -> bool {
        self.work.is_none()
            && self.short_break.is_none()
            && self.long_break.is_none()
            && self.sessions.is_none()
            && self.sound.is_none()
            && self.volume.is_none()
    }

    pub fn apply(self, mut settings: PomodoroSettings) -> PomodoroSettings {
        if let Some(work) = self.work {
            settings.work_minutes = work;
        }
        if let Some(short_break) = self.short_break {
            settings.short_break_minutes = short_break;
        }
        if let Some(long_break) = self.long_break {
            settings.long_break_minutes = long_break;
        }
        if let Some(sessions) = self.sessions {
            settings.sessions_until_long_break = sessions;
        }
        if let Some(sound) = self.sound {
            settings.alarm_sound = sound;
        }
        if let Some(volume) = self.volume {
            settings.volume = volume;
        }
        settings.normalized()
    }
}

pub async fn run_pomodoro(command: PomodoroCommands, env: &CommandEnv) -> Result<(), CliError> {
    match command {
        PomodoroCommands::Show { json } => run_pomodoro_show(json, env).await,
        PomodoroCommands::Set {
            work,
            short_break,
            long_break,
            sessions,
            sound,
            volume,
        } => {
            let changes = PomodoroChanges {
                work,
                short_break,
                long_break,
                sessions,
                sound: sound.map(AlarmSound::from),
                volume,
            };
            run_pomodoro_set(changes, env).await
        }
    }
}

async fn run_pomodoro_show(as_json: bool, env: &CommandEnv) -> Result<(), CliError> {
    let engine = open_engine(env, EngineMode::Local).await?;
    let settings = engine.pomodoro();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&settings)?);
    } else {
        for line in format_pomodoro_lines(&settings) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_pomodoro_set(changes: PomodoroChanges, env: &CommandEnv) -> Result<(), CliError> {
    let engine = open_engine(env, EngineMode::Connected).await?;
    let current = engine.pomodoro();
    if changes.is_empty() {
        for line in format_pomodoro_lines(&current) {
            println!("{line}");
        }
        return Ok(());
    }

    let updated = changes.apply(current);
    keep_local_change(engine.save_pomodoro(updated.clone()).await)?;

    for line in format_pomodoro_lines(&updated) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_pomodoro_lines(settings: &PomodoroSettings) -> Vec<String> {
    vec![
        format!("Focus:        {} min", settings.work_minutes),
        format!("Short break:  {} min", settings.short_break_minutes),
        format!("Long break:   {} min", settings.long_break_minutes),
        format!(
            "Long break every {} session(s)",
            settings.sessions_until_long_break
        ),
        format!(
            "Alarm:        {} at {}%",
            alarm_label(settings.alarm_sound),
            settings.volume
        ),
    ]
}

const fn alarm_label(sound: AlarmSound) -> &'static str {
    match sound {
        AlarmSound::Bell => "bell",
        AlarmSound::Chime => "chime",
        AlarmSound::Digital => "digital",
        AlarmSound::None => "none",
    }
}
