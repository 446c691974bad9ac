use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::warn;

pub const TICK_PERIOD: Duration = Duration::from_secs(1);
const SLEEP_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Raw flag, for signal handlers that set it directly.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }
}

/// Fixed-cadence driver. Deadlines missed while the process was stalled or
/// asleep are dropped rather than replayed, and nothing runs after cancel.
pub struct Ticker {
    period: Duration,
    cancel: CancelHandle,
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        Self::with_cancel(period, CancelHandle::new())
    }

    pub fn with_cancel(period: Duration, cancel: CancelHandle) -> Self {
        Self { period, cancel }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Calls `on_tick` with a 1-based tick count, first immediately, then once
    /// per period. Returns how many ticks ran.
    pub fn run<F>(&self, mut on_tick: F) -> u64
    where
        F: FnMut(u64) -> ControlFlow<()>,
    {
        let mut ticks = 0_u64;
        let mut next = Instant::now();
        while !self.cancel.is_cancelled() {
            ticks += 1;
            if on_tick(ticks).is_break() {
                break;
            }

            next += self.period;
            let now = Instant::now();
            if next < now {
                next = now + self.period;
            }
            sleep_until(next, &self.cancel.cancelled);
        }
        ticks
    }

    /// Runs the ticker on its own thread until the returned guard is dropped.
    pub fn spawn<F>(self, name: &str, on_tick: F) -> Option<TickerThread>
    where
        F: FnMut(u64) -> ControlFlow<()> + Send + 'static,
    {
        let cancel = self.cancel_handle();
        match thread::Builder::new()
            .name(name.to_string())
            .spawn(move || self.run(on_tick))
        {
            Ok(join) => Some(TickerThread {
                cancel,
                join: Some(join),
            }),
            Err(err) => {
                warn!(%err, thread = name, "could not start ticker thread");
                None
            }
        }
    }
}

pub struct TickerThread {
    cancel: CancelHandle,
    join: Option<JoinHandle<u64>>,
}

impl Drop for TickerThread {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Sleeps until `deadline` in short slices, returning early once `stop` is set.
pub fn sleep_until(deadline: Instant, stop: &AtomicBool) {
    loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        let remaining = deadline.saturating_duration_since(now);
        thread::sleep(remaining.min(SLEEP_SLICE));
    }
}

pub fn sleep_while_running(stop: &AtomicBool, duration: Duration) {
    sleep_until(Instant::now() + duration, stop);
}
