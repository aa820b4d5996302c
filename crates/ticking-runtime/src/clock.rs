//! Fixed-interval tick clock.
//!
//! Tick boundaries sit at `started_at + n * tick_len` for `n >= 1`. Waiting
//! for the next tick:
//! 1. Sample (or accept) the current instant
//! 2. Find the tick the instant falls into
//! 3. Sleep until the following boundary
//! 4. Return that boundary's 1-based number
//!
//! Boundaries that passed while the caller was busy are skipped, never
//! queued: a late caller sees the tick number jump and only sleeps until the
//! next future boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use ticking_common::config::ClockConfig;
use ticking_common::error::{TickingError, TickingResult};
use ticking_common::time::{MonotonicInstant, SystemClock, TimeSource};
use tracing::{debug, error, trace, warn};

/// Longest uninterrupted sleep while waiting on a [`CancelToken`].
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(10);

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Where the next tick boundary is relative to a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSchedule {
    /// 1-based number of the next boundary.
    pub tick: u64,
    /// Instant of the next boundary.
    pub next_tick_at: MonotonicInstant,
    /// Time from the given instant to the next boundary (never zero).
    pub sleep: Duration,
}

/// Heartbeat aligned to a fixed epoch.
///
/// The clock is a pure function of `(epoch, tick_len, now)`; it keeps no
/// tick counter of its own.
#[derive(Debug, Clone)]
pub struct TickClock<S: TimeSource = SystemClock> {
    tick_len: Duration,
    started_at: MonotonicInstant,
    source: S,
}

impl TickClock<SystemClock> {
    /// Create a clock on the system monotonic clock, starting now.
    ///
    /// # Errors
    ///
    /// Returns [`TickingError::InvalidConfiguration`] if `tick_len` is zero.
    pub fn new(tick_len: Duration) -> TickingResult<Self> {
        Self::with_source(tick_len, SystemClock::default(), None)
    }

    /// Create a clock with a tick length in fractional seconds.
    ///
    /// # Errors
    ///
    /// Returns [`TickingError::InvalidConfiguration`] unless `tick_len` is
    /// finite and greater than zero.
    pub fn from_secs_f64(tick_len: f64) -> TickingResult<Self> {
        if !tick_len.is_finite() || tick_len <= 0.0 {
            return Err(TickingError::InvalidConfiguration(format!(
                "tick length must be a positive number of seconds, got {tick_len}"
            )));
        }
        let tick_len = Duration::try_from_secs_f64(tick_len)
            .map_err(|e| TickingError::InvalidConfiguration(e.to_string()))?;
        Self::new(tick_len)
    }

    /// Create a clock from configuration, starting now.
    ///
    /// # Errors
    ///
    /// Returns [`TickingError::InvalidConfiguration`] if the configuration is
    /// invalid.
    pub fn from_config(config: &ClockConfig) -> TickingResult<Self> {
        config.validate()?;
        Self::with_source(config.tick_len, SystemClock::new(config.source), None)
    }
}

impl<S: TimeSource> TickClock<S> {
    /// Create a clock on an explicit time source.
    ///
    /// `start` is the epoch; pass the same value to several clocks to keep
    /// their boundaries aligned. `None` captures the source's current time.
    ///
    /// # Errors
    ///
    /// Returns [`TickingError::InvalidConfiguration`] if `tick_len` is zero.
    pub fn with_source(
        tick_len: Duration,
        source: S,
        start: Option<MonotonicInstant>,
    ) -> TickingResult<Self> {
        if tick_len.is_zero() {
            return Err(TickingError::InvalidConfiguration(
                "tick length must be greater than zero".into(),
            ));
        }

        let started_at = start.unwrap_or_else(|| source.now());
        debug!(
            tick_len_us = tick_len.as_micros() as u64,
            %started_at,
            "Tick clock created"
        );

        Ok(Self {
            tick_len,
            started_at,
            source,
        })
    }

    /// Move the epoch to `start`, or to the source's current time.
    pub fn reset(&mut self, start: Option<MonotonicInstant>) {
        self.started_at = start.unwrap_or_else(|| self.source.now());
        debug!(started_at = %self.started_at, "Tick clock epoch reset");
    }

    /// Length of one tick.
    #[must_use]
    pub fn tick_len(&self) -> Duration {
        self.tick_len
    }

    /// Epoch the boundaries are measured from.
    #[must_use]
    pub fn started_at(&self) -> MonotonicInstant {
        self.started_at
    }

    /// The time source in use.
    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Offset of boundary `tick` from the epoch.
    #[must_use]
    pub fn elapsed_for(&self, tick: u64) -> Duration {
        nanos_to_duration(self.tick_len.as_nanos().saturating_mul(u128::from(tick)))
    }

    /// Compute the next boundary after `now` without sleeping.
    ///
    /// # Errors
    ///
    /// Returns [`TickingError::TimeTravel`] if `now` is before the epoch.
    pub fn schedule(&self, now: MonotonicInstant) -> TickingResult<TickSchedule> {
        let since_epoch = now
            .checked_duration_since(self.started_at)
            .ok_or(TickingError::TimeTravel {
                now,
                epoch: self.started_at,
            })?
            .as_nanos();

        let tick_ns = self.tick_len.as_nanos();
        let current_tick = since_epoch / tick_ns;
        let next_offset = (current_tick + 1) * tick_ns;
        let sleep = nanos_to_duration(next_offset - since_epoch);

        Ok(TickSchedule {
            tick: u64::try_from(current_tick + 1).unwrap_or(u64::MAX),
            next_tick_at: now + sleep,
            sleep,
        })
    }

    /// Block until the next tick boundary and return its number.
    ///
    /// `now` overrides the sampled current time.
    ///
    /// # Errors
    ///
    /// Returns [`TickingError::TimeTravel`] if the current time is before
    /// the epoch. This means the time source is broken and is not worth
    /// retrying.
    pub fn wait_until_next_tick(&self, now: Option<MonotonicInstant>) -> TickingResult<u64> {
        let schedule = self.resolve_schedule(now)?;

        trace!(
            tick = schedule.tick,
            sleep_us = schedule.sleep.as_micros() as u64,
            "Waiting for next tick"
        );
        self.source.sleep(schedule.sleep);

        Ok(schedule.tick)
    }

    /// Like [`wait_until_next_tick`](Self::wait_until_next_tick), but gives
    /// up when `cancel` fires.
    ///
    /// The token is checked at least every 10ms of sleep.
    ///
    /// # Errors
    ///
    /// Returns [`TickingError::Cancelled`] if the token fires before the
    /// boundary, or [`TickingError::TimeTravel`] as for the blocking wait.
    pub fn wait_until_next_tick_cancellable(
        &self,
        now: Option<MonotonicInstant>,
        cancel: &CancelToken,
    ) -> TickingResult<u64> {
        let schedule = self.resolve_schedule(now)?;

        let mut remaining = schedule.sleep;
        while !remaining.is_zero() {
            if cancel.is_cancelled() {
                debug!(tick = schedule.tick, "Tick wait cancelled");
                return Err(TickingError::Cancelled);
            }
            let slice = remaining.min(CANCEL_POLL_INTERVAL);
            self.source.sleep(slice);
            remaining -= slice;
        }

        Ok(schedule.tick)
    }

    /// Iterate over ticks, blocking on every step.
    ///
    /// Each call starts from wherever the clock currently is; the epoch is
    /// not touched.
    pub fn ticks(&self) -> Ticks<'_, S> {
        Ticks {
            clock: self,
            cancel: None,
            last_tick: None,
            missed: 0,
            done: false,
        }
    }

    fn resolve_schedule(&self, now: Option<MonotonicInstant>) -> TickingResult<TickSchedule> {
        let now = now.unwrap_or_else(|| self.source.now());
        self.schedule(now).map_err(|e| {
            error!(error = %e, "Time source reported an instant before the clock epoch");
            e
        })
    }
}

impl<'a, S: TimeSource> IntoIterator for &'a TickClock<S> {
    type Item = TickingResult<(u64, Duration)>;
    type IntoIter = Ticks<'a, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.ticks()
    }
}

/// Infinite iterator of `(tick, elapsed)` pairs, where `elapsed` is the
/// boundary's offset from the epoch.
///
/// Yields at most one error, then ends.
#[derive(Debug)]
pub struct Ticks<'a, S: TimeSource> {
    clock: &'a TickClock<S>,
    cancel: Option<CancelToken>,
    last_tick: Option<u64>,
    missed: u64,
    done: bool,
}

impl<S: TimeSource> Ticks<'_, S> {
    /// End the iteration with [`TickingError::Cancelled`] once `token` fires.
    #[must_use]
    pub fn cancel_on(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Boundaries skipped between consecutive items of this iterator.
    #[must_use]
    pub fn missed(&self) -> u64 {
        self.missed
    }
}

impl<S: TimeSource> Iterator for Ticks<'_, S> {
    type Item = TickingResult<(u64, Duration)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let waited = match &self.cancel {
            Some(token) => self.clock.wait_until_next_tick_cancellable(None, token),
            None => self.clock.wait_until_next_tick(None),
        };
        let tick = match waited {
            Ok(tick) => tick,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };

        if let Some(last) = self.last_tick {
            let skipped = tick.saturating_sub(last).saturating_sub(1);
            if skipped > 0 {
                self.missed += skipped;
                warn!(tick, skipped, "Missed tick boundaries");
            }
        }
        self.last_tick = Some(tick);

        Some(Ok((tick, self.clock.elapsed_for(tick))))
    }
}

/// Shared flag for interrupting cancellable waits from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that has not fired.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the token. Every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check if the token has fired.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

fn nanos_to_duration(nanos: u128) -> Duration {
    let secs = u64::try_from(nanos / NANOS_PER_SEC).unwrap_or(u64::MAX);
    // remainder is always below one second
    Duration::new(secs, (nanos % NANOS_PER_SEC) as u32)
}
