//! Profiling and configuration scenarios.

use std::time::Duration;
use ticking_common::config::TickingConfig;
use ticking_runtime::{profiled, SectionProfiler, TickClock};

#[test]
fn test_profiled_tick_loop_dump() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profile.json");
    let clock = TickClock::new(Duration::from_millis(20)).unwrap();
    let mut profiler = SectionProfiler::new();

    let last = profiled(&mut profiler, Some(path.as_path()), |p| {
        let mut last = 0;
        for _ in 0..3 {
            last = p.section("wait", || clock.wait_until_next_tick(None).unwrap());
        }
        last
    })
    .unwrap();

    assert!(last >= 3);

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(report["sections"]["wait"]["count"], 3);
    assert!(report["profiled_ns"].as_u64().unwrap() >= 40_000_000);
}

#[test]
fn test_clock_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ticking.toml");
    std::fs::write(
        &path,
        "[clock]\ntick_len = \"30ms\"\nsource = \"monotonic\"\n\n[run]\nmax_ticks = 2\n",
    )
    .unwrap();

    let config = TickingConfig::from_file(&path).unwrap();
    let clock = TickClock::from_config(&config.clock).unwrap();

    let ticks: Vec<_> = clock
        .ticks()
        .take(config.run.max_ticks as usize)
        .map(Result::unwrap)
        .collect();
    assert_eq!(ticks.len(), 2);
    assert_eq!(ticks[1].1, Duration::from_millis(60));
}
