//! Elapsed-time measurement.
//!
//! A [`Stopwatch`] records a start instant on `begin()` and an end instant on
//! `finish()`. [`Stopwatch::scope`] and [`Stopwatch::measure`] tie the end to
//! a scope, so it is recorded on every exit path, panics included.

use std::fmt;
use std::ops::Deref;
use std::time::Duration;
use ticking_common::error::TickingResult;
use ticking_common::state::StopwatchState;
use ticking_common::time::{MonotonicInstant, SystemClock, TimeSource};
use tracing::debug;

/// Measures the time between `begin()` and `finish()`.
#[derive(Debug, Clone)]
pub struct Stopwatch<S: TimeSource = SystemClock> {
    title: Option<String>,
    start: Option<MonotonicInstant>,
    end: Option<MonotonicInstant>,
    source: S,
}

impl Stopwatch<SystemClock> {
    /// Create a stopwatch on the system monotonic clock.
    #[must_use]
    pub fn new(title: Option<&str>) -> Self {
        Self::with_source(title, SystemClock::default())
    }
}

impl Default for Stopwatch<SystemClock> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<S: TimeSource> Stopwatch<S> {
    /// Create a stopwatch reading `source`.
    #[must_use]
    pub fn with_source(title: Option<&str>, source: S) -> Self {
        Self {
            title: title.map(str::to_owned),
            start: None,
            end: None,
            source,
        }
    }

    /// Start measuring. Restarting discards any previous end.
    pub fn begin(&mut self) -> &mut Self {
        self.start = Some(self.source.now());
        self.end = None;
        self
    }

    /// Stop measuring.
    ///
    /// # Errors
    ///
    /// Returns [`TickingError::InvalidState`](ticking_common::TickingError::InvalidState)
    /// if the stopwatch is not running.
    pub fn finish(&mut self) -> TickingResult<()> {
        self.state().transition_to(StopwatchState::Finished)?;
        self.record_end();
        Ok(())
    }

    /// Elapsed time: zero before `begin()`, live while running, fixed once
    /// finished.
    #[must_use]
    pub fn total(&self) -> Duration {
        match (self.start, self.end) {
            (None, _) => Duration::ZERO,
            (Some(start), None) => self.source.now().saturating_duration_since(start),
            (Some(start), Some(end)) => end.saturating_duration_since(start),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> StopwatchState {
        match (self.start, self.end) {
            (None, _) => StopwatchState::NotStarted,
            (Some(_), None) => StopwatchState::Running,
            (Some(_), Some(_)) => StopwatchState::Finished,
        }
    }

    /// Label used when formatting.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Instant of the last `begin()`.
    #[must_use]
    pub fn started_at(&self) -> Option<MonotonicInstant> {
        self.start
    }

    /// Instant the current run ended, if it has.
    #[must_use]
    pub fn finished_at(&self) -> Option<MonotonicInstant> {
        self.end
    }

    /// Begin now and finish when the returned guard is dropped.
    ///
    /// The guard derefs to the stopwatch for progress reads.
    pub fn scope(&mut self) -> StopwatchScope<'_, S> {
        self.begin();
        StopwatchScope { stopwatch: self }
    }

    /// Run `f` inside a [`scope`](Self::scope) and return its result.
    ///
    /// The end is recorded even if `f` returns an error or panics.
    pub fn measure<R>(&mut self, f: impl FnOnce(&Stopwatch<S>) -> R) -> R {
        let scope = self.scope();
        f(&scope)
    }

    fn record_end(&mut self) {
        self.end = Some(self.source.now());
        debug!(
            title = self.title.as_deref().unwrap_or_default(),
            elapsed_us = self.total().as_micros() as u64,
            "Stopwatch finished"
        );
    }
}

impl<S: TimeSource> fmt::Display for Stopwatch<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(title) = &self.title {
            write!(f, "{title}: ")?;
        }
        match self.state() {
            StopwatchState::NotStarted => write!(f, "not started"),
            StopwatchState::Running => {
                write!(f, "running since {:.2}s", self.total().as_secs_f64())
            }
            StopwatchState::Finished => write!(f, "took {:.2}s", self.total().as_secs_f64()),
        }
    }
}

/// Running measurement that finishes its stopwatch when dropped.
#[derive(Debug)]
pub struct StopwatchScope<'a, S: TimeSource> {
    stopwatch: &'a mut Stopwatch<S>,
}

impl<S: TimeSource> Deref for StopwatchScope<'_, S> {
    type Target = Stopwatch<S>;

    fn deref(&self) -> &Self::Target {
        self.stopwatch
    }
}

impl<S: TimeSource> Drop for StopwatchScope<'_, S> {
    fn drop(&mut self) {
        self.stopwatch.record_end();
    }
}
