use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDateTime;
use tracing::warn;

use crate::preferences::{ThemeSignal, TimeFormatLookup};
use crate::runtime::ChimeRuntime;
use crate::status::StatusSurface;
use crate::ticker::{Ticker, TickerThread};
use crate::time_provider::SelectedTimeSource;
use crate::tone::player::ChimeOutput;

pub type SharedRuntime<O, S> = Arc<Mutex<ChimeRuntime<O, S>>>;

/// Everything outside the runtime that a clock tick reads.
pub struct ClockInputs {
    pub time_source: SelectedTimeSource,
    pub theme_signal: ThemeSignal,
    pub time_format_lookup: TimeFormatLookup,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct TickOutcome {
    pub now: NaiveDateTime,
    pub fired: bool,
}

impl ClockInputs {
    /// Applies pending OS signals, then ticks the runtime at the current time.
    pub fn drive<O, S>(&self, runtime: &mut ChimeRuntime<O, S>) -> TickOutcome
    where
        O: ChimeOutput,
        S: StatusSurface,
    {
        if let Some(prefers_dark) = self.theme_signal.poll() {
            runtime.set_system_prefers_dark(prefers_dark);
        }
        if let Some(hint) = self.time_format_lookup.poll() {
            runtime.set_time_format_hint(hint);
        }
        let now = self.time_source.source.now();
        let fired = runtime.tick(now);
        TickOutcome { now, fired }
    }
}

/// Ticks a shared runtime from a background thread, independent of whoever
/// renders it. `after_tick` runs with the runtime still locked.
pub fn spawn_clock<O, S, F>(
    runtime: SharedRuntime<O, S>,
    inputs: ClockInputs,
    period: Duration,
    mut after_tick: F,
) -> Option<TickerThread>
where
    O: ChimeOutput + Send + 'static,
    S: StatusSurface + Send + 'static,
    F: FnMut(&ChimeRuntime<O, S>, TickOutcome) + Send + 'static,
{
    Ticker::new(period).spawn("chime-clock", move |_| {
        let Ok(mut runtime) = runtime.lock() else {
            warn!("runtime lock poisoned; chime clock stopped");
            return ControlFlow::Break(());
        };
        let outcome = inputs.drive(&mut runtime);
        after_tick(&runtime, outcome);
        ControlFlow::Continue(())
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Instant;

    use chrono::NaiveDate;

    use super::*;
    use crate::chime::settings::ChimeSettings;
    use crate::preferences::{
        ResolvedTheme, ThemePreference, TimeDisplayMode, TimeFormatter,
    };
    use crate::status::NullSurface;
    use crate::time_provider::SimulatedTimeSource;

    #[derive(Clone, Default)]
    struct SharedCount {
        played: Arc<AtomicUsize>,
    }

    impl ChimeOutput for SharedCount {
        fn play_chime(&mut self) {
            self.played.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|d| d.and_hms_milli_opt(14, 29, 59, 900))
            .expect("valid datetime")
    }

    fn inputs(start: NaiveDateTime, prefers_dark: bool) -> ClockInputs {
        let source = SimulatedTimeSource::new(start, 1.0).expect("time source");
        ClockInputs {
            time_source: SelectedTimeSource {
                label: "SIMULATED",
                source: Box::new(source),
            },
            theme_signal: ThemeSignal::pinned(prefers_dark),
            time_format_lookup: TimeFormatLookup::resolved(Some(TimeDisplayMode::Hour24)),
        }
    }

    fn runtime(output: SharedCount) -> ChimeRuntime<SharedCount, NullSurface> {
        let settings = ChimeSettings {
            minute_of_hour: 30,
            active: true,
            theme_preference: ThemePreference::System,
        };
        ChimeRuntime::new(
            settings,
            start(),
            output,
            NullSurface,
            TimeFormatter::new(None, TimeDisplayMode::Hour12),
        )
        .expect("runtime")
    }

    #[test]
    fn drive_applies_signals_before_ticking() {
        let output = SharedCount::default();
        let mut runtime = runtime(output.clone());
        let inputs = inputs(start(), true);

        let outcome = inputs.drive(&mut runtime);
        assert!(!outcome.fired);
        assert_eq!(runtime.resolved_theme(), ResolvedTheme::Dark);
        assert_eq!(runtime.formatter().hint(), Some(TimeDisplayMode::Hour24));
    }

    #[test]
    fn clock_thread_chimes_without_anyone_rendering() {
        let output = SharedCount::default();
        let shared = Arc::new(Mutex::new(runtime(output.clone())));
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticks_seen = Arc::clone(&ticks);

        let clock = spawn_clock(
            Arc::clone(&shared),
            inputs(start(), false),
            Duration::from_millis(20),
            move |_, _| {
                ticks_seen.fetch_add(1, Ordering::SeqCst);
            },
        )
        .expect("clock thread");

        let deadline = Instant::now() + Duration::from_secs(5);
        while output.played.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        thread::sleep(Duration::from_millis(100));
        drop(clock);

        assert_eq!(output.played.load(Ordering::SeqCst), 1);
        assert!(ticks.load(Ordering::SeqCst) > 1);
        let runtime = shared.lock().expect("runtime");
        assert_eq!(runtime.chimes_fired(), 1);
        assert_eq!(runtime.clock().last_fired_hour(), Some(14));
    }
}
