//! Monotonic instants and the time sources that produce them.
//!
//! Clocks and stopwatches never read a global clock. They are handed a
//! [`TimeSource`] at construction: [`SystemClock`] in production, or
//! [`ManualClock`] when time has to be driven by a test.
//!
//! Instants are only comparable with instants taken from the same kind of
//! source; each kind has its own origin.

use crate::error::TickingError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
#[cfg(target_os = "linux")]
use tracing::warn;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// A point in time reported by a [`TimeSource`], in nanoseconds since the
/// source's origin.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct MonotonicInstant {
    nanos: u64,
}

impl MonotonicInstant {
    /// The source origin.
    pub const ZERO: Self = Self { nanos: 0 };

    /// Create an instant from nanoseconds since the source origin.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self { nanos }
    }

    /// Create an instant from fractional seconds.
    ///
    /// Negative and NaN values clamp to [`MonotonicInstant::ZERO`].
    #[must_use]
    pub fn from_secs_f64(secs: f64) -> Self {
        // `as` saturates and maps NaN to zero.
        Self::from_nanos((secs * NANOS_PER_SEC as f64).round() as u64)
    }

    /// Nanoseconds since the source origin.
    #[must_use]
    pub const fn as_nanos(&self) -> u64 {
        self.nanos
    }

    /// Seconds since the source origin.
    #[must_use]
    pub fn as_secs_f64(&self) -> f64 {
        self.nanos as f64 / NANOS_PER_SEC as f64
    }

    /// Time elapsed from `earlier` to `self`, or `None` if `earlier` is later.
    #[must_use]
    pub fn checked_duration_since(&self, earlier: MonotonicInstant) -> Option<Duration> {
        self.nanos.checked_sub(earlier.nanos).map(Duration::from_nanos)
    }

    /// Time elapsed from `earlier` to `self`, or zero if `earlier` is later.
    #[must_use]
    pub fn saturating_duration_since(&self, earlier: MonotonicInstant) -> Duration {
        self.checked_duration_since(earlier).unwrap_or_default()
    }
}

impl Add<Duration> for MonotonicInstant {
    type Output = MonotonicInstant;

    fn add(self, rhs: Duration) -> Self::Output {
        Self::from_nanos(self.nanos.saturating_add(duration_nanos(rhs)))
    }
}

impl fmt::Display for MonotonicInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:09}s",
            self.nanos / NANOS_PER_SEC,
            self.nanos % NANOS_PER_SEC
        )
    }
}

/// Nanoseconds in `duration`, saturating at `u64::MAX` (about 584 years).
#[must_use]
pub fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// A zero-argument source of instants that can also block the caller.
///
/// Implementations must return non-decreasing instants for the lifetime of
/// the process, except [`ClockSource::Wall`], which is allowed to step.
pub trait TimeSource {
    /// Sample the current instant.
    fn now(&self) -> MonotonicInstant;

    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

impl<T: TimeSource + ?Sized> TimeSource for &T {
    fn now(&self) -> MonotonicInstant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

impl<T: TimeSource + ?Sized> TimeSource for Arc<T> {
    fn now(&self) -> MonotonicInstant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Platform clock backing a [`SystemClock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClockSource {
    /// `CLOCK_MONOTONIC` via `clock_gettime` on Linux, `std::time::Instant`
    /// elsewhere.
    #[default]
    Monotonic,
    /// `CLOCK_MONOTONIC_RAW` on Linux, not slewed by NTP. Same as
    /// `Monotonic` on other targets.
    MonotonicRaw,
    /// Wall-clock time since the Unix epoch.
    ///
    /// Not monotonic: a clock step backwards surfaces as
    /// [`TickingError::TimeTravel`]. Only for targets without a monotonic
    /// clock.
    Wall,
}

impl fmt::Display for ClockSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Monotonic => write!(f, "monotonic"),
            Self::MonotonicRaw => write!(f, "monotonic_raw"),
            Self::Wall => write!(f, "wall"),
        }
    }
}

impl FromStr for ClockSource {
    type Err = TickingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "monotonic" => Ok(Self::Monotonic),
            "monotonic_raw" | "monotonic-raw" | "raw" => Ok(Self::MonotonicRaw),
            "wall" => Ok(Self::Wall),
            other => Err(TickingError::InvalidConfiguration(format!(
                "unknown clock source '{other}' (expected monotonic, monotonic_raw, or wall)"
            ))),
        }
    }
}

/// The platform's clock, selected by [`ClockSource`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemClock {
    kind: ClockSource,
}

impl SystemClock {
    /// Create a system clock reading the given platform clock.
    #[must_use]
    pub const fn new(kind: ClockSource) -> Self {
        Self { kind }
    }

    /// The platform clock in use.
    #[must_use]
    pub const fn kind(&self) -> ClockSource {
        self.kind
    }
}

impl TimeSource for SystemClock {
    fn now(&self) -> MonotonicInstant {
        match self.kind {
            ClockSource::Monotonic => monotonic_now(),
            ClockSource::MonotonicRaw => monotonic_raw_now(),
            ClockSource::Wall => wall_now(),
        }
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            sleep_for(duration);
        }
    }
}

#[cfg(target_os = "linux")]
fn monotonic_now() -> MonotonicInstant {
    read_clock(libc::CLOCK_MONOTONIC).unwrap_or_else(instant_now)
}

#[cfg(not(target_os = "linux"))]
fn monotonic_now() -> MonotonicInstant {
    instant_now()
}

#[cfg(target_os = "linux")]
fn monotonic_raw_now() -> MonotonicInstant {
    read_clock(libc::CLOCK_MONOTONIC_RAW).unwrap_or_else(monotonic_now)
}

#[cfg(not(target_os = "linux"))]
fn monotonic_raw_now() -> MonotonicInstant {
    monotonic_now()
}

/// Read a kernel clock as nanoseconds since its (boot-time) origin.
#[cfg(target_os = "linux")]
fn read_clock(clock: libc::clockid_t) -> Option<MonotonicInstant> {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };

    // SAFETY: `ts` is a valid, writable timespec.
    let rc = unsafe { libc::clock_gettime(clock, &mut ts) };
    if rc != 0 {
        warn!(
            clock,
            error = %std::io::Error::last_os_error(),
            "clock_gettime failed, falling back"
        );
        return None;
    }

    let secs = u64::try_from(ts.tv_sec).unwrap_or(0);
    let nanos = u64::try_from(ts.tv_nsec).unwrap_or(0);
    Some(MonotonicInstant::from_nanos(
        secs.saturating_mul(NANOS_PER_SEC).saturating_add(nanos),
    ))
}

/// `Instant` measured from the first reading in this process.
fn instant_now() -> MonotonicInstant {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    let origin = *ORIGIN.get_or_init(Instant::now);
    MonotonicInstant::from_nanos(duration_nanos(origin.elapsed()))
}

fn wall_now() -> MonotonicInstant {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    MonotonicInstant::from_nanos(duration_nanos(since_epoch))
}

/// Relative sleep on `CLOCK_MONOTONIC`, resumed after signal interruptions.
#[cfg(target_os = "linux")]
fn sleep_for(duration: Duration) {
    let mut request = libc::timespec {
        tv_sec: duration.as_secs() as libc::time_t,
        tv_nsec: duration.subsec_nanos() as libc::c_long,
    };
    let mut remaining = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };

    loop {
        // SAFETY: both timespecs are valid for the duration of the call.
        let rc = unsafe {
            libc::clock_nanosleep(libc::CLOCK_MONOTONIC, 0, &request, &mut remaining)
        };
        match rc {
            0 => return,
            libc::EINTR => request = remaining,
            _ => {
                warn!(
                    error = %std::io::Error::from_raw_os_error(rc),
                    "clock_nanosleep failed, falling back to thread::sleep"
                );
                std::thread::sleep(duration);
                return;
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn sleep_for(duration: Duration) {
    std::thread::sleep(duration);
}

/// A time source that only moves when told to.
///
/// `sleep` advances the clock by the requested duration instead of
/// blocking, and records it so tests can assert on computed sleeps.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    /// Create a manual clock reading `start`.
    #[must_use]
    pub fn new(start: MonotonicInstant) -> Self {
        Self {
            now: AtomicU64::new(start.as_nanos()),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Jump to `instant`, backwards included.
    pub fn set(&self, instant: MonotonicInstant) {
        self.now.store(instant.as_nanos(), Ordering::Release);
    }

    /// Move the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        let delta = duration_nanos(duration);
        // fetch_update never fails with a closure that always returns Some.
        let _ = self
            .now
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |ns| {
                Some(ns.saturating_add(delta))
            });
    }

    /// Every duration passed to `sleep`, oldest first.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sum of all recorded sleeps.
    #[must_use]
    pub fn total_slept(&self) -> Duration {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .sum()
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> MonotonicInstant {
        MonotonicInstant::from_nanos(self.now.load(Ordering::Acquire))
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instant_display() {
        assert_eq!(MonotonicInstant::ZERO.to_string(), "0.000000000s");
        assert_eq!(
            MonotonicInstant::from_nanos(12_000_000_250).to_string(),
            "12.000000250s"
        );
    }

    #[test]
    fn test_instant_from_secs() {
        assert_eq!(
            MonotonicInstant::from_secs_f64(1.25),
            MonotonicInstant::from_nanos(1_250_000_000)
        );
        assert_eq!(MonotonicInstant::from_secs_f64(-3.0), MonotonicInstant::ZERO);
        assert_eq!(MonotonicInstant::from_secs_f64(f64::NAN), MonotonicInstant::ZERO);
    }

    #[test]
    fn test_checked_duration_since() {
        let a = MonotonicInstant::from_nanos(100);
        let b = MonotonicInstant::from_nanos(350);

        assert_eq!(b.checked_duration_since(a), Some(Duration::from_nanos(250)));
        assert_eq!(a.checked_duration_since(b), None);
        assert_eq!(a.saturating_duration_since(b), Duration::ZERO);
    }

    #[test]
    fn test_add_saturates() {
        let near_end = MonotonicInstant::from_nanos(u64::MAX - 1);
        assert_eq!(
            near_end + Duration::from_secs(1),
            MonotonicInstant::from_nanos(u64::MAX)
        );
    }

    #[test]
    fn test_clock_source_parsing() {
        assert_eq!("monotonic".parse::<ClockSource>().unwrap(), ClockSource::Monotonic);
        assert_eq!(
            "monotonic-raw".parse::<ClockSource>().unwrap(),
            ClockSource::MonotonicRaw
        );
        assert_eq!("WALL".parse::<ClockSource>().unwrap(), ClockSource::Wall);
        assert!(matches!(
            "sundial".parse::<ClockSource>(),
            Err(TickingError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_system_clock_is_non_decreasing() {
        for kind in [ClockSource::Monotonic, ClockSource::MonotonicRaw] {
            let clock = SystemClock::new(kind);
            let mut last = clock.now();
            for _ in 0..1000 {
                let now = clock.now();
                assert!(now >= last, "{kind} went backwards");
                last = now;
            }
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_monotonic_reads_kernel_clock() {
        let before = read_clock(libc::CLOCK_MONOTONIC).unwrap();
        let now = SystemClock::new(ClockSource::Monotonic).now();
        let after = read_clock(libc::CLOCK_MONOTONIC).unwrap();

        assert!(before <= now && now <= after, "{before} <= {now} <= {after}");
    }

    #[test]
    fn test_system_clock_sleep() {
        let clock = SystemClock::default();
        let before = clock.now();
        clock.sleep(Duration::from_millis(20));
        let slept = clock.now().saturating_duration_since(before);
        assert!(slept >= Duration::from_millis(20), "slept only {slept:?}");
    }

    #[test]
    fn test_manual_clock_sleep_advances() {
        let clock = ManualClock::new(MonotonicInstant::from_nanos(1_000));

        clock.sleep(Duration::from_nanos(500));
        clock.advance(Duration::from_nanos(250));
        clock.sleep(Duration::from_nanos(250));

        assert_eq!(clock.now(), MonotonicInstant::from_nanos(2_000));
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_nanos(500), Duration::from_nanos(250)]
        );
        assert_eq!(clock.total_slept(), Duration::from_nanos(750));
    }

    #[test]
    fn test_shared_manual_clock() {
        let clock = Arc::new(ManualClock::default());
        let handle: Arc<ManualClock> = Arc::clone(&clock);

        handle.sleep(Duration::from_secs(2));
        assert_eq!(clock.now(), MonotonicInstant::from_nanos(2_000_000_000));

        clock.set(MonotonicInstant::ZERO);
        assert_eq!((&*handle).now(), MonotonicInstant::ZERO);
    }
}
