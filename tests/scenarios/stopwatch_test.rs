//! Stopwatch scenarios on the system monotonic clock.

use super::common::assert_between;
use std::thread;
use std::time::Duration;
use ticking_common::state::StopwatchState;
use ticking_runtime::Stopwatch;

#[test]
fn test_begin_sleep_finish() {
    let mut sw = Stopwatch::new(Some("sleep"));

    sw.begin();
    thread::sleep(Duration::from_millis(250));
    sw.finish().unwrap();

    assert_between(sw.total(), 0.2, 0.5);
    assert!(sw.to_string().starts_with("sleep: took 0."));
}

#[test]
fn test_running_reads_increase() {
    let mut sw = Stopwatch::new(None);
    sw.begin();

    let first = sw.total();
    thread::sleep(Duration::from_millis(5));
    let second = sw.total();

    assert!(second >= first);
    assert_eq!(sw.state(), StopwatchState::Running);
}

#[test]
fn test_scoped_one_second_block() {
    let mut sw = Stopwatch::new(Some("block"));

    sw.measure(|_| thread::sleep(Duration::from_secs(1)));

    assert_eq!(sw.state(), StopwatchState::Finished);
    assert_between(sw.total(), 0.9, 1.1);
}
