use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::chime::clock::LAST_MINUTE_OF_HOUR;
use crate::preferences::ThemePreference;

const SETTINGS_VERSION: u32 = 1;

/// The three persisted preferences. Everything else is runtime state.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct ChimeSettings {
    pub minute_of_hour: u32,
    pub active: bool,
    pub theme_preference: ThemePreference,
}

/// Loads settings, treating a missing file as a first run.
pub fn load_settings(path: &Path) -> Result<ChimeSettings> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!(path = %path.display(), "no settings file yet, using defaults");
            return Ok(ChimeSettings::default());
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("unable to read settings file {}", path.display()));
        }
    };
    parse_settings_text(&content)
}

pub fn parse_settings_text(content: &str) -> Result<ChimeSettings> {
    let raw = serde_json::from_str::<SettingsFile>(content).map_err(|err| {
        let line = err.line();
        let column = err.column();
        anyhow::anyhow!("invalid JSON at line {line}, column {column}: {err}")
    })?;

    if raw.version != SETTINGS_VERSION {
        bail!(
            "unsupported settings version {}; expected version {SETTINGS_VERSION}",
            raw.version
        );
    }
    if raw.minute_of_hour > LAST_MINUTE_OF_HOUR {
        bail!(
            "minute_of_hour must be between 0 and {LAST_MINUTE_OF_HOUR}, got {}",
            raw.minute_of_hour
        );
    }

    Ok(ChimeSettings {
        minute_of_hour: raw.minute_of_hour,
        active: raw.active,
        theme_preference: raw.theme_preference,
    })
}

pub fn save_settings(path: &Path, settings: &ChimeSettings) -> Result<()> {
    let payload = SettingsFile {
        version: SETTINGS_VERSION,
        minute_of_hour: settings.minute_of_hour,
        active: settings.active,
        theme_preference: settings.theme_preference,
    };
    let text = serde_json::to_string_pretty(&payload)?;
    fs::write(path, format!("{text}\n"))
        .with_context(|| format!("unable to write settings file {}", path.display()))?;
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
struct SettingsFile {
    version: u32,
    #[serde(default)]
    minute_of_hour: u32,
    #[serde(default)]
    active: bool,
    #[serde(default)]
    theme_preference: ThemePreference,
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn parses_valid_settings() {
        let json = r#"
{
  "version": 1,
  "minute_of_hour": 45,
  "active": true,
  "theme_preference": "dark"
}
"#;
        let settings = parse_settings_text(json).expect("valid settings");
        assert_eq!(settings.minute_of_hour, 45);
        assert!(settings.active);
        assert_eq!(settings.theme_preference, ThemePreference::Dark);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let settings = parse_settings_text(r#"{ "version": 1 }"#).expect("valid settings");
        assert_eq!(settings, ChimeSettings::default());
        assert_eq!(settings.theme_preference, ThemePreference::System);
    }

    #[test]
    fn rejects_out_of_range_minute() {
        let err = parse_settings_text(r#"{ "version": 1, "minute_of_hour": 60 }"#)
            .expect_err("minute 60 should fail");
        assert!(err.to_string().contains("minute_of_hour must be between 0 and 59"));
    }

    #[test]
    fn rejects_unknown_theme() {
        let err = parse_settings_text(r#"{ "version": 1, "theme_preference": "sepia" }"#)
            .expect_err("unknown theme should fail");
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = parse_settings_text(r#"{ "version": 2 }"#).expect_err("version 2 should fail");
        assert!(err.to_string().contains("unsupported settings version 2"));
    }

    #[test]
    fn missing_file_is_a_first_run() {
        let dir = tempdir().expect("tempdir");
        let settings = load_settings(&dir.path().join("absent.json")).expect("defaults");
        assert_eq!(settings, ChimeSettings::default());
    }

    #[test]
    fn saved_settings_load_back() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("chime.json");
        let settings = ChimeSettings {
            minute_of_hour: 7,
            active: true,
            theme_preference: ThemePreference::Light,
        };
        save_settings(&path, &settings).expect("save");
        let text = fs::read_to_string(&path).expect("read back");
        assert!(text.contains("\"theme_preference\": \"light\""));
        assert_eq!(load_settings(&path).expect("load"), settings);
    }
}
