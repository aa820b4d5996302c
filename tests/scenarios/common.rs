//! Helpers shared by the scenario tests.

use std::time::{Duration, Instant};

/// Run `f` and return its result with the wall time it took.
pub fn timed<R>(f: impl FnOnce() -> R) -> (R, Duration) {
    let start = Instant::now();
    let result = f();
    (result, start.elapsed())
}

/// Assert that `actual` lies strictly between `low` and `high` seconds.
#[track_caller]
pub fn assert_between(actual: Duration, low: f64, high: f64) {
    let secs = actual.as_secs_f64();
    assert!(
        low < secs && secs < high,
        "expected {low}s < {secs:.4}s < {high}s"
    );
}
