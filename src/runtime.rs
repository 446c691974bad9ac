use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chime::clock::{ChimeClock, ChimeSchedule, UPCOMING_CHIME_COUNT};
use crate::chime::settings::{ChimeSettings, save_settings};
use crate::error::ChimeError;
use crate::preferences::{
    ResolvedTheme, ThemePreference, TimeDisplayMode, TimeFormatter, resolve_theme,
};
use crate::status::{StatusPublisher, StatusSurface};
use crate::tone::player::ChimeOutput;

/// Serializable view of the runtime, shared with the HTTP API.
#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct RuntimeSnapshot {
    pub current_time: String,
    pub next_chime: Option<String>,
    pub next_chimes: Vec<String>,
    pub minute_of_hour: u32,
    pub active: bool,
    pub theme_preference: String,
    pub resolved_theme: String,
    pub prefers_24_hour: bool,
    pub chimes_fired: u64,
    pub last_fired_hour: Option<u32>,
    pub iso_local: String,
}

/// Everything the presentation layers drive: the chime clock, the sound
/// output, the status surface and the persisted preferences.
pub struct ChimeRuntime<O, S> {
    clock: ChimeClock,
    output: O,
    publisher: StatusPublisher<S>,
    theme_preference: ThemePreference,
    os_prefers_dark: bool,
    formatter: TimeFormatter,
    settings_path: Option<PathBuf>,
    chimes_fired: u64,
}

impl<O: ChimeOutput, S: StatusSurface> ChimeRuntime<O, S> {
    pub fn new(
        settings: ChimeSettings,
        now: NaiveDateTime,
        output: O,
        surface: S,
        formatter: TimeFormatter,
    ) -> Result<Self, ChimeError> {
        let schedule = ChimeSchedule::new(settings.minute_of_hour)?;
        let mut runtime = Self {
            clock: ChimeClock::new(schedule, settings.active, now),
            output,
            publisher: StatusPublisher::new(surface),
            theme_preference: settings.theme_preference,
            os_prefers_dark: false,
            formatter,
            settings_path: None,
            chimes_fired: 0,
        };
        runtime.publish_status();
        Ok(runtime)
    }

    /// Persists every later preference change to `path`.
    pub fn with_settings_path(mut self, path: PathBuf) -> Self {
        self.settings_path = Some(path);
        self
    }

    pub fn tick(&mut self, now: NaiveDateTime) -> bool {
        let outcome = self.clock.tick(now);
        if outcome.fired {
            self.chimes_fired += 1;
            info!(
                hour = outcome.hour,
                minute = self.clock.schedule().minute_of_hour(),
                "hourly chime"
            );
            self.output.play_chime();
        }
        self.publish_status();
        outcome.fired
    }

    pub fn set_minute(&mut self, minute_of_hour: u32) -> Result<(), ChimeError> {
        self.clock.set_minute(minute_of_hour)?;
        debug!(minute_of_hour, "chime minute changed");
        self.persist();
        self.publish_status();
        Ok(())
    }

    pub fn set_active(&mut self, active: bool) {
        if self.clock.is_active() == active {
            return;
        }
        self.clock.set_active(active);
        info!(active, "chimes toggled");
        self.persist();
        self.publish_status();
    }

    pub fn set_theme_preference(&mut self, preference: ThemePreference) {
        if self.theme_preference == preference {
            return;
        }
        self.theme_preference = preference;
        debug!(preference = preference.label(), "theme preference changed");
        self.persist();
    }

    /// Returns true when the resolved theme changed.
    pub fn set_system_prefers_dark(&mut self, prefers_dark: bool) -> bool {
        let before = self.resolved_theme();
        self.os_prefers_dark = prefers_dark;
        let after = self.resolved_theme();
        if before != after {
            debug!(theme = after.label(), "resolved theme changed");
        }
        before != after
    }

    pub fn set_time_format_hint(&mut self, hint: Option<TimeDisplayMode>) {
        self.formatter = self.formatter.with_hint(hint);
        debug!(
            mode = self.formatter.effective_mode().label(),
            "time format updated"
        );
        self.publish_status();
    }

    /// Plays one chime now, outside the schedule and without touching the
    /// debounce token.
    pub fn test_chime(&mut self) {
        info!("test chime");
        self.output.play_chime();
    }

    pub fn resolved_theme(&self) -> ResolvedTheme {
        resolve_theme(self.theme_preference, self.os_prefers_dark)
    }

    pub fn theme_preference(&self) -> ThemePreference {
        self.theme_preference
    }

    pub fn clock(&self) -> &ChimeClock {
        &self.clock
    }

    pub fn formatter(&self) -> &TimeFormatter {
        &self.formatter
    }

    pub fn chimes_fired(&self) -> u64 {
        self.chimes_fired
    }

    pub fn publisher(&self) -> &StatusPublisher<S> {
        &self.publisher
    }

    pub fn settings(&self) -> ChimeSettings {
        ChimeSettings {
            minute_of_hour: self.clock.schedule().minute_of_hour(),
            active: self.clock.is_active(),
            theme_preference: self.theme_preference,
        }
    }

    pub fn next_chime_text(&self) -> Option<String> {
        self.clock
            .next_chime_times(1)
            .first()
            .map(|time| self.formatter.format(time, false))
    }

    pub fn upcoming_chimes(&self) -> Vec<String> {
        self.clock
            .next_chime_times(UPCOMING_CHIME_COUNT)
            .iter()
            .map(|time| self.formatter.format(time, false))
            .collect()
    }

    pub fn current_time_text(&self) -> String {
        self.clock.current_display_time(&self.formatter)
    }

    pub fn snapshot(&self) -> RuntimeSnapshot {
        let now = self.clock.now();
        RuntimeSnapshot {
            current_time: self.current_time_text(),
            next_chime: self.next_chime_text(),
            next_chimes: self.upcoming_chimes(),
            minute_of_hour: self.clock.schedule().minute_of_hour(),
            active: self.clock.is_active(),
            theme_preference: self.theme_preference.label().to_string(),
            resolved_theme: self.resolved_theme().label().to_string(),
            prefers_24_hour: self.formatter.effective_mode() == TimeDisplayMode::Hour24,
            chimes_fired: self.chimes_fired,
            last_fired_hour: self.clock.last_fired_hour(),
            iso_local: now.format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
        }
    }

    fn publish_status(&mut self) {
        let next = if self.clock.is_active() {
            self.next_chime_text()
        } else {
            None
        };
        self.publisher.publish(next.as_deref());
    }

    fn persist(&self) {
        let Some(path) = self.settings_path.as_deref() else {
            return;
        };
        if let Err(err) = save_settings(path, &self.settings()) {
            warn!(error = %format!("{err:#}"), "settings not saved");
        }
    }
}
