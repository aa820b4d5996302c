//! Tick clock scenarios on the system monotonic clock.

use super::common::{assert_between, timed};
use std::thread;
use std::time::Duration;
use ticking_common::error::TickingError;
use ticking_common::time::{ClockSource, SystemClock, TimeSource};
use ticking_runtime::{CancelToken, TickClock};

#[test]
fn test_first_tick_takes_one_tick_len() {
    let clock = TickClock::from_secs_f64(0.25).unwrap();

    let (first, elapsed) = timed(|| clock.ticks().next());
    let (tick, offset) = first.unwrap().unwrap();

    assert_between(elapsed, 0.2, 0.3);
    assert_eq!(tick, 1);
    assert_eq!(offset, Duration::from_millis(250));
}

#[test]
fn test_dropped_tick() {
    let clock = TickClock::from_secs_f64(0.25).unwrap();

    let (start, _) = clock.ticks().next().unwrap().unwrap();
    thread::sleep(Duration::from_millis(300));
    let (end, _) = clock.ticks().next().unwrap().unwrap();

    assert_eq!(end - start, 2);
}

#[test]
fn test_wait_aligns_to_boundary() {
    let clock = TickClock::new(Duration::from_millis(100)).unwrap();
    let source = *clock.source();

    thread::sleep(Duration::from_millis(30));
    let tick = clock.wait_until_next_tick(None).unwrap();
    let after = source.now().saturating_duration_since(clock.started_at());

    assert_eq!(tick, 1);
    assert_between(after, 0.095, 0.15);
}

#[test]
fn test_raw_clock_ticks() {
    let clock = TickClock::with_source(
        Duration::from_millis(50),
        SystemClock::new(ClockSource::MonotonicRaw),
        None,
    )
    .unwrap();

    let ticks: Vec<u64> = clock
        .ticks()
        .take(3)
        .map(|t| t.map(|(n, _)| n))
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(ticks, vec![1, 2, 3]);
}

#[test]
fn test_future_epoch_is_time_travel() {
    let source = SystemClock::default();
    let epoch = source.now() + Duration::from_secs(60);
    let clock = TickClock::with_source(Duration::from_millis(10), source, Some(epoch)).unwrap();

    assert!(matches!(
        clock.wait_until_next_tick(None),
        Err(TickingError::TimeTravel { .. })
    ));
}

#[test]
fn test_cancel_from_another_thread() {
    let clock = TickClock::new(Duration::from_secs(10)).unwrap();
    let token = CancelToken::new();

    let canceller = {
        let token = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            token.cancel();
        })
    };

    let (result, elapsed) = timed(|| clock.wait_until_next_tick_cancellable(None, &token));
    canceller.join().unwrap();

    assert_eq!(result, Err(TickingError::Cancelled));
    assert_between(elapsed, 0.04, 1.0);
}
