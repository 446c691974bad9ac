use std::env;
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

use chrono::Timelike;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ChimeError;
use crate::ticker::sleep_while_running;

/// Regions whose conventional clock is 12-hour.
const TWELVE_HOUR_REGIONS: &[&str] = &[
    "US", "CA", "AU", "NZ", "IN", "PH", "PK", "BD", "EG", "SA", "JO", "MY",
];

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ThemePreference {
    #[default]
    System,
    Light,
    Dark,
}

impl ThemePreference {
    pub fn label(&self) -> &'static str {
        match self {
            ThemePreference::System => "system",
            ThemePreference::Light => "light",
            ThemePreference::Dark => "dark",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedTheme {
    Light,
    Dark,
}

impl ResolvedTheme {
    pub fn label(&self) -> &'static str {
        match self {
            ResolvedTheme::Light => "light",
            ResolvedTheme::Dark => "dark",
        }
    }
}

/// An explicit preference wins; `System` follows the OS signal.
pub fn resolve_theme(preference: ThemePreference, os_prefers_dark: bool) -> ResolvedTheme {
    match preference {
        ThemePreference::Light => ResolvedTheme::Light,
        ThemePreference::Dark => ResolvedTheme::Dark,
        ThemePreference::System if os_prefers_dark => ResolvedTheme::Dark,
        ThemePreference::System => ResolvedTheme::Light,
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TimeDisplayMode {
    Hour24,
    Hour12,
}

impl TimeDisplayMode {
    pub fn from_prefers_24_hour(prefers_24_hour: bool) -> Self {
        if prefers_24_hour {
            TimeDisplayMode::Hour24
        } else {
            TimeDisplayMode::Hour12
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimeDisplayMode::Hour24 => "24-hour",
            TimeDisplayMode::Hour12 => "12-hour",
        }
    }
}

/// Day-period labels used by 12-hour times.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct DayPeriods {
    pub am: &'static str,
    pub pm: &'static str,
}

impl Default for DayPeriods {
    fn default() -> Self {
        Self { am: "AM", pm: "PM" }
    }
}

impl DayPeriods {
    /// Labels for the language of a locale tag. Only languages written with
    /// a trailing period are listed; everything else uses `AM`/`PM`.
    pub fn for_locale(locale: Option<&str>) -> Self {
        let language = locale
            .and_then(|tag| tag.split(['.', '@', '_', '-']).next())
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let (am, pm) = match language.as_str() {
            "ar" => ("ص", "م"),
            "es" => ("a.\u{a0}m.", "p.\u{a0}m."),
            "hi" => ("am", "pm"),
            "ms" => ("PG", "PTG"),
            _ => return Self::default(),
        };
        Self { am, pm }
    }
}

pub fn format_time<T: Timelike>(
    time: &T,
    include_seconds: bool,
    mode: TimeDisplayMode,
    periods: DayPeriods,
) -> String {
    let seconds = if include_seconds {
        format!(":{:02}", time.second())
    } else {
        String::new()
    };
    match mode {
        TimeDisplayMode::Hour24 => format!("{:02}:{:02}{seconds}", time.hour(), time.minute()),
        TimeDisplayMode::Hour12 => {
            let (is_pm, hour12) = time.hour12();
            let period = if is_pm { periods.pm } else { periods.am };
            format!("{hour12}:{:02}{seconds} {period}", time.minute())
        }
    }
}

/// Formats times with the host hint when known, else the locale convention.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct TimeFormatter {
    hint: Option<TimeDisplayMode>,
    locale_default: TimeDisplayMode,
    periods: DayPeriods,
}

impl TimeFormatter {
    pub fn new(hint: Option<TimeDisplayMode>, locale_default: TimeDisplayMode) -> Self {
        Self {
            hint,
            locale_default,
            periods: DayPeriods::default(),
        }
    }

    pub fn for_locale(hint: Option<TimeDisplayMode>, locale: Option<&str>) -> Self {
        Self {
            hint,
            locale_default: locale_default_mode(locale),
            periods: DayPeriods::for_locale(locale),
        }
    }

    pub fn from_environment(hint: Option<TimeDisplayMode>) -> Self {
        Self::for_locale(hint, environment_locale().as_deref())
    }

    pub fn with_hint(self, hint: Option<TimeDisplayMode>) -> Self {
        Self { hint, ..self }
    }

    pub fn hint(&self) -> Option<TimeDisplayMode> {
        self.hint
    }

    pub fn prefers_24_hour(&self) -> Option<bool> {
        self.hint.map(|mode| mode == TimeDisplayMode::Hour24)
    }

    pub fn effective_mode(&self) -> TimeDisplayMode {
        self.hint.unwrap_or(self.locale_default)
    }

    pub fn format<T: Timelike>(&self, time: &T, include_seconds: bool) -> String {
        format_time(time, include_seconds, self.effective_mode(), self.periods)
    }
}

pub fn environment_locale() -> Option<String> {
    ["LC_ALL", "LC_TIME", "LANG"]
        .iter()
        .filter_map(|key| env::var(key).ok())
        .find(|value| !value.trim().is_empty())
}

/// Clock convention for a POSIX/BCP 47 locale tag such as `en_US.UTF-8`.
/// The C/POSIX locale and unknown tags use 24-hour time.
pub fn locale_default_mode(locale: Option<&str>) -> TimeDisplayMode {
    let Some(locale) = locale else {
        return TimeDisplayMode::Hour24;
    };
    let tag = locale
        .split(['.', '@'])
        .next()
        .unwrap_or_default()
        .trim();
    let mut parts = tag.split(['_', '-']);
    let language = parts.next().unwrap_or_default().to_ascii_lowercase();
    let region = parts.next().map(str::to_ascii_uppercase);

    match region {
        Some(region) if language != "fr" && TWELVE_HOUR_REGIONS.contains(&region.as_str()) => {
            TimeDisplayMode::Hour12
        }
        None if language == "en" => TimeDisplayMode::Hour12,
        _ => TimeDisplayMode::Hour24,
    }
}

/// Asks the host desktop whether it prefers a 24-hour clock. `Ok(None)`
/// means the host has no explicit setting.
#[cfg(target_os = "macos")]
pub fn query_host_time_format() -> Result<Option<TimeDisplayMode>, ChimeError> {
    let force_24 = run_query("defaults", &["read", "-g", "AppleICUForce24HourTime"]);
    if force_24.as_deref().map(parse_macos_flag).unwrap_or(false) {
        return Ok(Some(TimeDisplayMode::Hour24));
    }
    let force_12 = run_query("defaults", &["read", "-g", "AppleICUForce12HourTime"]);
    if force_12.as_deref().map(parse_macos_flag).unwrap_or(false) {
        return Ok(Some(TimeDisplayMode::Hour12));
    }
    Ok(None)
}

#[cfg(windows)]
pub fn query_host_time_format() -> Result<Option<TimeDisplayMode>, ChimeError> {
    let output = run_query(
        "reg",
        &["query", r"HKCU\Control Panel\International", "/v", "sShortTime"],
    )?;
    Ok(parse_windows_time_pattern(&output))
}

#[cfg(all(unix, not(target_os = "macos")))]
pub fn query_host_time_format() -> Result<Option<TimeDisplayMode>, ChimeError> {
    let output = run_query(
        "gsettings",
        &["get", "org.gnome.desktop.interface", "clock-format"],
    )?;
    Ok(parse_gnome_clock_format(&output))
}

#[cfg(not(any(unix, windows)))]
pub fn query_host_time_format() -> Result<Option<TimeDisplayMode>, ChimeError> {
    Err(ChimeError::PreferenceQueryFailure(
        "no time format query for this platform".to_string(),
    ))
}

#[cfg_attr(not(any(unix, windows)), allow(dead_code))]
fn run_query(program: &str, args: &[&str]) -> Result<String, ChimeError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|err| ChimeError::PreferenceQueryFailure(format!("{program}: {err}")))?;
    if !output.status.success() {
        return Err(ChimeError::PreferenceQueryFailure(format!(
            "{program} exited with {}",
            output.status
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn parse_macos_flag(output: &str) -> bool {
    matches!(output.trim(), "1" | "true" | "YES")
}

#[cfg_attr(not(all(unix, not(target_os = "macos"))), allow(dead_code))]
fn parse_gnome_clock_format(output: &str) -> Option<TimeDisplayMode> {
    match output.trim().trim_matches('\'') {
        "24h" => Some(TimeDisplayMode::Hour24),
        "12h" => Some(TimeDisplayMode::Hour12),
        _ => None,
    }
}

#[cfg_attr(not(windows), allow(dead_code))]
fn parse_windows_time_pattern(output: &str) -> Option<TimeDisplayMode> {
    let pattern = output
        .lines()
        .find(|line| line.contains("REG_SZ"))?
        .split("REG_SZ")
        .nth(1)?
        .trim();
    if pattern.contains('H') {
        Some(TimeDisplayMode::Hour24)
    } else if pattern.contains('h') {
        Some(TimeDisplayMode::Hour12)
    } else {
        None
    }
}

/// One-shot background query of the host time format. Until it answers the
/// formatter keeps using the locale default.
pub struct TimeFormatLookup {
    receiver: Receiver<Option<TimeDisplayMode>>,
}

type HostFormatQuery = fn() -> Result<Option<TimeDisplayMode>, ChimeError>;

impl TimeFormatLookup {
    pub fn spawn() -> Self {
        Self::spawn_with(query_host_time_format)
    }

    /// A failed query answers "unknown" rather than leaving the lookup
    /// pending forever.
    pub fn spawn_with(query: HostFormatQuery) -> Self {
        let (sender, receiver) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name("time-format-lookup".to_string())
            .spawn(move || {
                let hint = match query() {
                    Ok(hint) => hint,
                    Err(err) => {
                        debug!(%err, "host time format unknown");
                        None
                    }
                };
                let _ = sender.send(hint);
            });
        if let Err(err) = spawned {
            warn!(%err, "could not start time format lookup");
        }
        Self { receiver }
    }

    pub fn resolved(hint: Option<TimeDisplayMode>) -> Self {
        let (sender, receiver) = mpsc::channel();
        let _ = sender.send(hint);
        Self { receiver }
    }

    /// Yields the answer once; `None` while pending and after delivery.
    pub fn poll(&self) -> Option<Option<TimeDisplayMode>> {
        self.receiver.try_recv().ok()
    }
}

pub fn detect_system_dark() -> bool {
    matches!(dark_light::detect(), dark_light::Mode::Dark)
}

/// OS dark-mode signal delivered as change events.
pub struct ThemeSignal {
    receiver: Receiver<bool>,
    stop: Arc<AtomicBool>,
}

impl ThemeSignal {
    pub fn pinned(prefers_dark: bool) -> Self {
        let (sender, receiver) = mpsc::channel();
        let _ = sender.send(prefers_dark);
        Self {
            receiver,
            stop: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn watch_system(interval: Duration) -> Self {
        Self::watch_with(interval, detect_system_dark)
    }

    /// The first reading is taken before returning, so a poll right after
    /// construction already sees the OS value.
    pub fn watch_with(interval: Duration, detect: fn() -> bool) -> Self {
        let (sender, receiver) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let initial = detect();
        let _ = sender.send(initial);
        let stop_for_thread = Arc::clone(&stop);
        let spawned = thread::Builder::new()
            .name("theme-signal".to_string())
            .spawn(move || {
                let mut last = initial;
                while !stop_for_thread.load(Ordering::Relaxed) {
                    sleep_while_running(&stop_for_thread, interval);
                    if stop_for_thread.load(Ordering::Relaxed) {
                        break;
                    }
                    let prefers_dark = detect();
                    if prefers_dark != last {
                        last = prefers_dark;
                        if sender.send(prefers_dark).is_err() {
                            break;
                        }
                    }
                }
            });
        if let Err(err) = spawned {
            warn!(%err, "could not start theme watcher");
        }
        Self { receiver, stop }
    }

    /// Latest OS value since the previous poll, if it changed.
    pub fn poll(&self) -> Option<bool> {
        self.receiver.try_iter().last()
    }
}

impl Drop for ThemeSignal {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
