//! Profiling scopes.
//!
//! [`profiled`] enables a [`ProfilingSession`] around a block of work and
//! always disables it afterwards, dumping the results when an output path is
//! given. [`SectionProfiler`] is the built-in session: it aggregates timings
//! of named sections and dumps them as JSON.

use crate::stopwatch::Stopwatch;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use ticking_common::error::{TickingError, TickingResult};
use ticking_common::metrics::{SectionSnapshot, SectionStats};
use ticking_common::time::{duration_nanos, SystemClock, TimeSource};
use tracing::{debug, info, trace, warn};

/// Samples kept per section for percentiles.
pub const DEFAULT_HISTOGRAM_SIZE: usize = 1024;

/// A profiler that can be switched on and off and persisted.
pub trait ProfilingSession {
    /// Start collecting.
    fn enable(&mut self) -> TickingResult<()>;

    /// Stop collecting.
    fn disable(&mut self) -> TickingResult<()>;

    /// Write collected data to `path`.
    fn dump(&self, path: &Path) -> TickingResult<()>;
}

/// Run `f` with `session` enabled.
///
/// The session is disabled on every exit path, and dumped to `output` if
/// given. When `f` panics, teardown failures are logged instead of returned.
///
/// # Errors
///
/// Returns the first error from `enable`, `disable`, or `dump`. If `enable`
/// fails, `f` is not run.
pub fn profiled<P, R, F>(session: &mut P, output: Option<&Path>, f: F) -> TickingResult<R>
where
    P: ProfilingSession,
    F: FnOnce(&mut P) -> R,
{
    session.enable()?;

    let mut guard = ProfileGuard {
        session,
        output,
        armed: true,
    };
    let result = f(&mut *guard.session);
    guard.close()?;

    Ok(result)
}

/// Disables (and dumps) the session if the profiled block unwinds.
struct ProfileGuard<'a, P: ProfilingSession> {
    session: &'a mut P,
    output: Option<&'a Path>,
    armed: bool,
}

impl<P: ProfilingSession> ProfileGuard<'_, P> {
    fn close(&mut self) -> TickingResult<()> {
        self.armed = false;
        self.session.disable()?;
        if let Some(path) = self.output {
            self.session.dump(path)?;
        }
        Ok(())
    }
}

impl<P: ProfilingSession> Drop for ProfileGuard<'_, P> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = self.close() {
            warn!(error = %e, "Profiling teardown failed while unwinding");
        }
    }
}

/// Serializable profiling results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileReport {
    /// Time spent enabled, in nanoseconds.
    pub profiled_ns: u64,
    /// Statistics per section name.
    pub sections: BTreeMap<String, SectionSnapshot>,
}

/// Aggregates timings of named sections while enabled.
#[derive(Debug)]
pub struct SectionProfiler<S: TimeSource + Clone = SystemClock> {
    sections: BTreeMap<String, SectionStats>,
    histogram_size: usize,
    window: Stopwatch<S>,
    profiled: Duration,
    source: S,
}

impl SectionProfiler<SystemClock> {
    /// Create a profiler on the system monotonic clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_source(SystemClock::default(), DEFAULT_HISTOGRAM_SIZE)
    }
}

impl Default for SectionProfiler<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: TimeSource + Clone> SectionProfiler<S> {
    /// Create a disabled profiler reading `source`.
    #[must_use]
    pub fn with_source(source: S, histogram_size: usize) -> Self {
        Self {
            sections: BTreeMap::new(),
            histogram_size,
            window: Stopwatch::with_source(Some("profiling"), source.clone()),
            profiled: Duration::ZERO,
            source,
        }
    }

    /// Returns true between `enable()` and `disable()`.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.window.state().is_running()
    }

    /// Record one execution of `name`. Ignored while disabled.
    pub fn record(&mut self, name: &str, duration: Duration) {
        if !self.is_enabled() {
            trace!(section = name, "Profiler disabled, sample dropped");
            return;
        }

        let histogram_size = self.histogram_size;
        self.sections
            .entry(name.to_owned())
            .or_insert_with(|| SectionStats::new(histogram_size))
            .record(duration);
    }

    /// Time `f` and record it under `name`.
    pub fn section<R>(&mut self, name: &str, f: impl FnOnce() -> R) -> R {
        let mut stopwatch = Stopwatch::with_source(Some(name), self.source.clone());
        let result = stopwatch.measure(|_| f());
        self.record(name, stopwatch.total());
        result
    }

    /// Statistics for `name`, if recorded.
    #[must_use]
    pub fn section_stats(&self, name: &str) -> Option<&SectionStats> {
        self.sections.get(name)
    }

    /// Total time spent enabled, including the current window.
    #[must_use]
    pub fn profiled_time(&self) -> Duration {
        if self.is_enabled() {
            self.profiled + self.window.total()
        } else {
            self.profiled
        }
    }

    /// Snapshot of everything collected so far.
    #[must_use]
    pub fn report(&self) -> ProfileReport {
        ProfileReport {
            profiled_ns: duration_nanos(self.profiled_time()),
            sections: self
                .sections
                .iter()
                .map(|(name, stats)| (name.clone(), stats.snapshot()))
                .collect(),
        }
    }
}

impl<S: TimeSource + Clone> ProfilingSession for SectionProfiler<S> {
    fn enable(&mut self) -> TickingResult<()> {
        if self.is_enabled() {
            return Err(TickingError::Profiling("profiler already enabled".into()));
        }
        self.window.begin();
        debug!("Section profiler enabled");
        Ok(())
    }

    fn disable(&mut self) -> TickingResult<()> {
        self.window
            .finish()
            .map_err(|_| TickingError::Profiling("profiler not enabled".into()))?;
        self.profiled += self.window.total();
        debug!(
            profiled_us = self.profiled.as_micros() as u64,
            sections = self.sections.len(),
            "Section profiler disabled"
        );
        Ok(())
    }

    fn dump(&self, path: &Path) -> TickingResult<()> {
        let json = serde_json::to_string_pretty(&self.report())
            .map_err(|e| TickingError::Profiling(format!("failed to encode report: {e}")))?;
        std::fs::write(path, json).map_err(|e| {
            TickingError::Profiling(format!("failed to write {}: {e}", path.display()))
        })?;
        info!(path = %path.display(), "Profile written");
        Ok(())
    }
}
