use std::io::Write;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::error::ChimeError;

/// Somewhere the next chime time is shown outside the main view: a window
/// title, a console line, a tray label.
pub trait StatusSurface {
    /// `None` means chimes are off and the surface should clear itself.
    fn set_next_chime(&mut self, next: Option<&str>) -> Result<()>;
}

impl<T: StatusSurface + ?Sized> StatusSurface for Box<T> {
    fn set_next_chime(&mut self, next: Option<&str>) -> Result<()> {
        (**self).set_next_chime(next)
    }
}

/// Forwards next-chime text to a surface only when it changes.
pub struct StatusPublisher<S> {
    surface: S,
    last_published: Option<Option<String>>,
}

impl<S: StatusSurface> StatusPublisher<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            last_published: None,
        }
    }

    /// Returns true when the value was forwarded. A failed forward is logged
    /// and still counts as published so it is not retried every tick.
    pub fn publish(&mut self, next: Option<&str>) -> bool {
        if let Some(previous) = &self.last_published
            && previous.as_deref() == next
        {
            return false;
        }

        self.last_published = Some(next.map(str::to_string));
        match self.surface.set_next_chime(next) {
            Ok(()) => debug!(next = next.unwrap_or("off"), "status published"),
            Err(err) => {
                let err = ChimeError::StatusPublishFailure(format!("{err:#}"));
                warn!(%err, "status surface rejected update");
            }
        }
        true
    }

    pub fn last_published(&self) -> Option<&str> {
        self.last_published.as_ref().and_then(|value| value.as_deref())
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }
}

/// Prints status changes to stdout, one line each.
#[derive(Debug, Default)]
pub struct ConsoleSurface;

impl StatusSurface for ConsoleSurface {
    fn set_next_chime(&mut self, next: Option<&str>) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        let written = match next {
            Some(time) => writeln!(stdout, "Next chime: {time}"),
            None => writeln!(stdout, "Chimes off"),
        };
        written.context("unable to write status to stdout")?;
        stdout.flush().context("unable to flush stdout")
    }
}

/// Discards updates. Used where no status surface exists.
#[derive(Debug, Default)]
pub struct NullSurface;

impl StatusSurface for NullSurface {
    fn set_next_chime(&mut self, _next: Option<&str>) -> Result<()> {
        Ok(())
    }
}
