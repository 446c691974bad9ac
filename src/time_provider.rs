use std::time::Instant;

use anyhow::{Result, bail};
use chrono::{Duration as ChronoDuration, Local, NaiveDate, NaiveDateTime, NaiveTime};

/// Source of local wall-clock time for the chime loop.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> NaiveDateTime;
    fn label(&self) -> &'static str;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTimeSource;

impl TimeSource for LocalTimeSource {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn label(&self) -> &'static str {
        "LOCAL"
    }
}

/// Wall clock that starts at `start` and runs `speed` times faster than real
/// time from the moment it is created.
#[derive(Debug, Clone)]
pub struct SimulatedTimeSource {
    start: NaiveDateTime,
    anchor: Instant,
    speed: f64,
}

impl SimulatedTimeSource {
    pub fn new(start: NaiveDateTime, speed: f64) -> Result<Self> {
        if !speed.is_finite() || speed <= 0.0 {
            bail!("speed must be a positive number, got {speed}");
        }
        Ok(Self {
            start,
            anchor: Instant::now(),
            speed,
        })
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    fn elapsed_at(&self, real: Instant) -> ChronoDuration {
        let real_secs = real.saturating_duration_since(self.anchor).as_secs_f64();
        let simulated_ms = (real_secs * self.speed * 1_000.0).round() as i64;
        ChronoDuration::milliseconds(simulated_ms)
    }
}

impl TimeSource for SimulatedTimeSource {
    fn now(&self) -> NaiveDateTime {
        self.start + self.elapsed_at(Instant::now())
    }

    fn label(&self) -> &'static str {
        "SIMULATED"
    }
}

pub struct SelectedTimeSource {
    pub source: Box<dyn TimeSource>,
    pub label: &'static str,
}

/// Real local time unless a start time or a non-unit speed asks for a
/// simulated clock.
pub fn select_time_source(start_at: Option<NaiveDateTime>, speed: f64) -> Result<SelectedTimeSource> {
    let source: Box<dyn TimeSource> = match start_at {
        None if speed == 1.0 => Box::new(LocalTimeSource),
        None => Box::new(SimulatedTimeSource::new(LocalTimeSource.now(), speed)?),
        Some(start) => Box::new(SimulatedTimeSource::new(start, speed)?),
    };
    let label = source.label();
    Ok(SelectedTimeSource { source, label })
}

/// Accepts `YYYY-MM-DDTHH:MM[:SS]`, the same with a space separator, or a bare
/// `HH:MM[:SS]` which is taken as today.
pub fn parse_start_at(value: &str) -> Result<NaiveDateTime> {
    let value = value.trim();
    for format in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(parsed);
        }
    }
    for format in ["%H:%M:%S", "%H:%M"] {
        if let Ok(time) = NaiveTime::parse_from_str(value, format) {
            return Ok(today().and_time(time));
        }
    }
    bail!("invalid start time '{value}'; expected YYYY-MM-DDTHH:MM[:SS] or HH:MM[:SS]")
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Timelike;

    use super::*;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|d| d.and_hms_opt(h, m, s))
            .expect("valid datetime")
    }

    #[test]
    fn simulated_source_advances_at_speed() {
        let source = SimulatedTimeSource::new(at(14, 29, 0), 60.0).expect("source");
        let later = source.anchor + Duration::from_secs(2);
        assert_eq!(source.start + source.elapsed_at(later), at(14, 31, 0));
    }

    #[test]
    fn simulated_source_starts_at_requested_time() {
        let source = SimulatedTimeSource::new(at(9, 0, 0), 1.0).expect("source");
        let now = source.now();
        assert_eq!(now.hour(), 9);
        assert_eq!(now.minute(), 0);
        assert_eq!(source.label(), "SIMULATED");
    }

    #[test]
    fn rejects_non_positive_speed() {
        assert!(SimulatedTimeSource::new(at(9, 0, 0), 0.0).is_err());
        assert!(SimulatedTimeSource::new(at(9, 0, 0), -2.0).is_err());
        assert!(SimulatedTimeSource::new(at(9, 0, 0), f64::NAN).is_err());
    }

    #[test]
    fn selects_local_source_by_default() {
        let selected = select_time_source(None, 1.0).expect("selected");
        assert_eq!(selected.label, "LOCAL");
        let selected = select_time_source(Some(at(1, 2, 3)), 1.0).expect("selected");
        assert_eq!(selected.label, "SIMULATED");
        let selected = select_time_source(None, 10.0).expect("selected");
        assert_eq!(selected.label, "SIMULATED");
    }

    #[test]
    fn parses_start_at_forms() {
        assert_eq!(
            parse_start_at("2024-05-01T14:29:58").expect("full"),
            at(14, 29, 58)
        );
        assert_eq!(parse_start_at("2024-05-01 14:29").expect("space"), at(14, 29, 0));
        let bare = parse_start_at("07:15").expect("bare");
        assert_eq!((bare.hour(), bare.minute(), bare.second()), (7, 15, 0));
        assert!(parse_start_at("tomorrow").is_err());
        assert!(parse_start_at("25:00").is_err());
    }
}
