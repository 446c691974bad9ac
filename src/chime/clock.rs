use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};

use crate::error::ChimeError;
use crate::preferences::TimeFormatter;

pub const LAST_MINUTE_OF_HOUR: u32 = 59;
pub const UPCOMING_CHIME_COUNT: usize = 12;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct ChimeSchedule {
    minute_of_hour: u32,
}

impl ChimeSchedule {
    pub fn new(minute_of_hour: u32) -> Result<Self, ChimeError> {
        if minute_of_hour > LAST_MINUTE_OF_HOUR {
            return Err(ChimeError::InvalidArgument(format!(
                "minute {minute_of_hour} is outside 0..={LAST_MINUTE_OF_HOUR}"
            )));
        }
        Ok(Self { minute_of_hour })
    }

    pub fn minute_of_hour(&self) -> u32 {
        self.minute_of_hour
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum ChimeMode {
    #[default]
    Inactive,
    Active,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct TickOutcome {
    pub fired: bool,
    pub hour: u32,
}

/// Polls the wall clock and decides, at most once per hour, whether the
/// scheduled minute has arrived.
///
/// `last_fired_hour` is the debounce token: the 1 Hz driver sees the matching
/// minute up to sixty times, but only the first sample in a given hour fires.
#[derive(Debug, Clone)]
pub struct ChimeClock {
    schedule: ChimeSchedule,
    mode: ChimeMode,
    last_fired_hour: Option<u32>,
    now: NaiveDateTime,
}

impl ChimeClock {
    pub fn new(schedule: ChimeSchedule, active: bool, now: NaiveDateTime) -> Self {
        Self {
            schedule,
            mode: if active {
                ChimeMode::Active
            } else {
                ChimeMode::Inactive
            },
            last_fired_hour: None,
            now,
        }
    }

    pub fn tick(&mut self, now: NaiveDateTime) -> TickOutcome {
        self.now = now;
        let hour = now.hour();
        let mut outcome = TickOutcome { fired: false, hour };
        if self.mode != ChimeMode::Active {
            return outcome;
        }

        if now.minute() == self.schedule.minute_of_hour() && self.last_fired_hour != Some(hour) {
            self.last_fired_hour = Some(hour);
            outcome.fired = true;
        }
        outcome
    }

    /// Rejects out-of-range minutes and keeps the previous schedule. A new
    /// minute clears the debounce token so it can still fire this hour.
    pub fn set_minute(&mut self, minute_of_hour: u32) -> Result<(), ChimeError> {
        self.schedule = ChimeSchedule::new(minute_of_hour)?;
        self.last_fired_hour = None;
        Ok(())
    }

    /// Enabling never chimes by itself, and the debounce token survives a
    /// disable/enable cycle.
    pub fn set_active(&mut self, active: bool) {
        self.mode = if active {
            ChimeMode::Active
        } else {
            ChimeMode::Inactive
        };
    }

    pub fn is_active(&self) -> bool {
        self.mode == ChimeMode::Active
    }

    pub fn mode(&self) -> ChimeMode {
        self.mode
    }

    pub fn schedule(&self) -> ChimeSchedule {
        self.schedule
    }

    pub fn last_fired_hour(&self) -> Option<u32> {
        self.last_fired_hour
    }

    pub fn now(&self) -> NaiveDateTime {
        self.now
    }

    pub fn next_chime_times(&self, count: usize) -> Vec<NaiveDateTime> {
        next_chime_times(self.now, self.schedule.minute_of_hour(), count)
    }

    pub fn current_display_time(&self, formatter: &TimeFormatter) -> String {
        formatter.format(&self.now, true)
    }
}

/// Upcoming chime instants, one per hour at `minute_of_hour:00`.
///
/// The current hour's slot counts as upcoming until one second past it.
pub fn next_chime_times(
    now: NaiveDateTime,
    minute_of_hour: u32,
    count: usize,
) -> Vec<NaiveDateTime> {
    let passed_this_hour = now.minute() > minute_of_hour
        || (now.minute() == minute_of_hour && now.second() > 0);
    let Some(slot) = NaiveTime::from_hms_opt(now.hour(), minute_of_hour, 0) else {
        return Vec::new();
    };
    let first = now.date().and_time(slot) + Duration::hours(i64::from(passed_this_hour));
    (0..count)
        .map(|offset| first + Duration::hours(offset as i64))
        .collect()
}
