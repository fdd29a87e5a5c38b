use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::session::MAX_ALERT_STAGE;

/// Sound value meaning "use the fallback tone"
pub const FALLBACK_TONE: &str = "system_bell";

pub const DEFAULT_GAME_MIN: u64 = 25;
pub const DEFAULT_SHORT_STUDY_MIN: u64 = 5;
pub const DEFAULT_LONG_STUDY_MIN: u64 = 30;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub settings: AppSettings,

    #[serde(default)]
    pub sounds: SoundSettings,

    #[serde(default)]
    pub durations: DurationSettings,

    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub tick_interval_ms: u64,
    pub escalation_interval_secs: u64,
    pub launch_settle_ms: u64,
    pub terminate_grace_ms: u64,
    pub log_level: String,
}

/// Executables and the window titles to enforce
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub game_path: String,
    pub game_title: String,
    pub study_app_path: String,
    pub study_app_title: String,
}

/// Sound file per alert stage, or `system_bell` for the fallback tone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundSettings {
    pub stage_0: String,
    pub stage_1: String,
    pub stage_2: String,
    pub stage_3: String,
    pub stage_4: String,
    pub stage_5: String,
}

/// Phase lengths in minutes, kept as strings like the rest of the file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationSettings {
    #[serde(
        default = "default_game_min",
        deserialize_with = "string_or_number"
    )]
    pub game_min: String,
    #[serde(
        default = "default_short_study_min",
        deserialize_with = "string_or_number"
    )]
    pub short_study_min: String,
    #[serde(
        default = "default_long_study_min",
        deserialize_with = "string_or_number"
    )]
    pub long_study_min: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub session_complete: bool, // "All cycles complete" notification
    pub session_errors: bool,   // Start refusals and worker failures
}

/// Result of checking one configured executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathCheck {
    pub label: &'static str,
    pub command: String,
    pub found: bool,
}

fn default_game_min() -> String {
    DEFAULT_GAME_MIN.to_string()
}

fn default_short_study_min() -> String {
    DEFAULT_SHORT_STUDY_MIN.to_string()
}

fn default_long_study_min() -> String {
    DEFAULT_LONG_STUDY_MIN.to_string()
}

// Accept `game_min = "25"` as well as `game_min = 25`
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(i64),
    }

    Ok(match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(value) => value,
        StringOrNumber::Number(value) => value.to_string(),
    })
}

fn parse_minutes(key: &str, value: &str, fallback: u64) -> Duration {
    match value
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|minutes| *minutes > 0)
        .and_then(|minutes| minutes.checked_mul(60))
    {
        Some(secs) => Duration::from_secs(secs),
        None => {
            warn!(
                "Invalid duration {} = '{}', using default of {} minutes",
                key, value, fallback
            );
            Duration::from_secs(fallback * 60)
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            escalation_interval_secs: 10,
            launch_settle_ms: 3000,
            terminate_grace_ms: 3000,
            log_level: "info".to_string(),
        }
    }
}

impl Default for SoundSettings {
    fn default() -> Self {
        Self {
            stage_0: FALLBACK_TONE.to_string(),
            stage_1: FALLBACK_TONE.to_string(),
            stage_2: FALLBACK_TONE.to_string(),
            stage_3: FALLBACK_TONE.to_string(),
            stage_4: FALLBACK_TONE.to_string(),
            stage_5: FALLBACK_TONE.to_string(),
        }
    }
}

impl Default for DurationSettings {
    fn default() -> Self {
        Self {
            game_min: default_game_min(),
            short_study_min: default_short_study_min(),
            long_study_min: default_long_study_min(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            session_complete: true,
            session_errors: true,
        }
    }
}

impl SoundSettings {
    /// Configured value for `stage`, `None` past the last stage
    pub fn stage(&self, stage: u8) -> Option<&str> {
        let value = match stage {
            0 => &self.stage_0,
            1 => &self.stage_1,
            2 => &self.stage_2,
            3 => &self.stage_3,
            4 => &self.stage_4,
            5 => &self.stage_5,
            _ => return None,
        };
        Some(value.as_str())
    }

    /// Returns false if `stage` is out of range
    pub fn set_stage(&mut self, stage: u8, value: impl Into<String>) -> bool {
        let slot = match stage {
            0 => &mut self.stage_0,
            1 => &mut self.stage_1,
            2 => &mut self.stage_2,
            3 => &mut self.stage_3,
            4 => &mut self.stage_4,
            5 => &mut self.stage_5,
            _ => return false,
        };
        *slot = value.into();
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &str)> {
        (0..=MAX_ALERT_STAGE).filter_map(move |stage| self.stage(stage).map(|v| (stage, v)))
    }
}

impl DurationSettings {
    pub fn game(&self) -> Duration {
        parse_minutes("game_min", &self.game_min, DEFAULT_GAME_MIN)
    }

    pub fn short_study(&self) -> Duration {
        parse_minutes("short_study_min", &self.short_study_min, DEFAULT_SHORT_STUDY_MIN)
    }

    pub fn long_study(&self) -> Duration {
        parse_minutes("long_study_min", &self.long_study_min, DEFAULT_LONG_STUDY_MIN)
    }
}

impl Config {
    /// Check that the first word of each configured command is an existing
    /// file, either as a path or somewhere on `PATH`
    pub fn validate_paths(&self) -> Vec<PathCheck> {
        [
            ("Game executable", &self.settings.game_path),
            ("Study app executable", &self.settings.study_app_path),
        ]
        .into_iter()
        .filter(|(_, command)| !command.trim().is_empty())
        .map(|(label, command)| PathCheck {
            label,
            command: command.clone(),
            found: command
                .split_whitespace()
                .next()
                .is_some_and(executable_exists),
        })
        .collect()
    }
}

fn executable_exists(program: &str) -> bool {
    let path = Path::new(program);
    if path.components().count() > 1 || path.is_absolute() {
        return path.exists();
    }

    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths)
                .map(|dir: PathBuf| dir.join(program))
                .any(|candidate| candidate.is_file())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();

        assert_eq!(config.durations.game(), Duration::from_secs(25 * 60));
        assert_eq!(config.durations.short_study(), Duration::from_secs(5 * 60));
        assert_eq!(config.durations.long_study(), Duration::from_secs(30 * 60));
        assert!(config.sounds.iter().all(|(_, v)| v == FALLBACK_TONE));
        assert_eq!(config.general.tick_interval_ms, 1000);
        assert_eq!(config.general.escalation_interval_secs, 10);
    }

    #[test]
    fn test_durations_accept_strings_and_integers() {
        let config: Config = toml::from_str(
            r#"
[durations]
game_min = "1"
short_study_min = 2
"#,
        )
        .unwrap();

        assert_eq!(config.durations.game(), Duration::from_secs(60));
        assert_eq!(config.durations.short_study(), Duration::from_secs(120));
        assert_eq!(config.durations.long_study(), Duration::from_secs(30 * 60));
    }

    #[test]
    fn test_invalid_duration_falls_back_to_default() {
        let durations = DurationSettings {
            game_min: "soon".to_string(),
            short_study_min: "0".to_string(),
            long_study_min: " 45 ".to_string(),
        };

        assert_eq!(durations.game(), Duration::from_secs(25 * 60));
        assert_eq!(durations.short_study(), Duration::from_secs(5 * 60));
        assert_eq!(durations.long_study(), Duration::from_secs(45 * 60));
    }

    #[test]
    fn test_overflowing_duration_falls_back_to_default() {
        let durations = DurationSettings {
            game_min: "307445734561825861".to_string(),
            short_study_min: u64::MAX.to_string(),
            long_study_min: (u64::MAX / 60).to_string(),
        };

        assert_eq!(durations.game(), Duration::from_secs(25 * 60));
        assert_eq!(durations.short_study(), Duration::from_secs(5 * 60));
        // Largest value that still fits is accepted as-is
        assert_eq!(
            durations.long_study(),
            Duration::from_secs(u64::MAX / 60 * 60)
        );
    }

    #[test]
    fn test_sound_stage_accessors() {
        let mut sounds = SoundSettings::default();

        assert!(sounds.set_stage(3, "/tmp/siren.wav"));
        assert!(!sounds.set_stage(6, "/tmp/nope.wav"));
        assert_eq!(sounds.stage(3), Some("/tmp/siren.wav"));
        assert_eq!(sounds.stage(6), None);
        assert_eq!(sounds.iter().count(), 6);
    }

    #[test]
    fn test_validate_paths_skips_empty_and_checks_first_word() {
        let mut config = Config::default();
        config.settings.game_path = "/definitely/missing/game --windowed".to_string();

        let checks = config.validate_paths();

        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].label, "Game executable");
        assert!(!checks[0].found);
    }

    #[cfg(unix)]
    #[test]
    fn test_validate_paths_finds_programs_on_path() {
        let mut config = Config::default();
        config.settings.study_app_path = "sh -c true".to_string();

        let checks = config.validate_paths();

        assert_eq!(checks.len(), 1);
        assert!(checks[0].found);
    }
}
