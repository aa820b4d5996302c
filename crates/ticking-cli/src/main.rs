//! Command-line tick clock.
//!
//! Runs a fixed-interval heartbeat, logging every tick and any skipped
//! boundaries, until a tick limit is reached or SIGINT/SIGTERM arrives.
//! The loop is timed with a stopwatch and can be profiled to a JSON file.

mod signals;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use ticking_common::config::TickingConfig;
use ticking_common::error::TickingError;
use ticking_common::time::{ClockSource, TimeSource};
use ticking_runtime::{profiled, CancelToken, SectionProfiler, Stopwatch, TickClock};
use tracing::{info, warn};

use crate::signals::SignalHandler;

/// Tick clock command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "ticking",
    about = "Fixed-interval tick clock with stopwatch timing and profiling",
    version,
    long_about = None
)]
struct Args {
    /// Path to a configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Tick length, e.g. "250ms" (overrides config file).
    #[arg(long, short = 't', value_name = "DURATION", value_parser = humantime::parse_duration)]
    tick_len: Option<Duration>,

    /// Stop after this many ticks (0 = run until interrupted).
    #[arg(long, short = 'n', value_name = "COUNT")]
    ticks: Option<u64>,

    /// Platform clock: monotonic, monotonic-raw, or wall.
    #[arg(long, value_name = "SOURCE")]
    source: Option<ClockSource>,

    /// Write a JSON profile of the tick loop to this file.
    #[arg(long, short = 'p', value_name = "FILE")]
    profile_output: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

/// Outcome of a tick loop.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RunSummary {
    /// Ticks yielded by the loop.
    yielded: u64,
    /// Number of the last tick reached.
    last_tick: u64,
    /// Boundaries skipped because the loop fell behind.
    missed: u64,
    /// Stopwatch rendering of the loop duration.
    timing: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting ticking");

    let mut config = load_config(&args)?;
    apply_overrides(&mut config, &args);
    config.validate().context("Invalid configuration")?;

    info!(
        tick_len = %humantime::format_duration(config.clock.tick_len),
        source = %config.clock.source,
        max_ticks = config.run.max_ticks,
        "Configuration loaded"
    );

    let signal_handler = SignalHandler::new().context("Failed to set up signal handlers")?;
    let clock = TickClock::from_config(&config.clock).context("Failed to create tick clock")?;
    let cancel = signal_handler.cancel_token();

    let summary = match &config.run.profile_output {
        Some(path) => {
            let mut profiler = SectionProfiler::new();
            profiled(&mut profiler, Some(path.as_path()), |p| {
                run_ticks(&clock, config.run.max_ticks, cancel, Some(p))
            })
            .with_context(|| format!("Failed to profile tick loop to {}", path.display()))??
        }
        None => run_ticks(&clock, config.run.max_ticks, cancel, None)?,
    };

    info!(
        ticks = summary.yielded,
        last_tick = summary.last_tick,
        missed = summary.missed,
        signals = signal_handler.state().signal_count(),
        "{}",
        summary.timing
    );

    Ok(())
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = format!(
        "ticking={},ticking_runtime={},ticking_common={}",
        level, level, level
    );

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `TICKING_CONFIG_PATH` environment variable
/// 3. `ticking.toml` in the working directory
/// 4. Built-in defaults
fn load_config(args: &Args) -> Result<TickingConfig> {
    if let Some(config_path) = &args.config {
        info!(?config_path, "Loading config from command-line argument");
        return TickingConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path));
    }

    if let Ok(env_path) = std::env::var("TICKING_CONFIG_PATH") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from TICKING_CONFIG_PATH");
            return TickingConfig::from_file(&config_path).with_context(|| {
                format!("Failed to load config from TICKING_CONFIG_PATH={:?}", env_path)
            });
        }
        warn!(
            path = %env_path,
            "TICKING_CONFIG_PATH set but file does not exist, checking other locations"
        );
    }

    let local_path = PathBuf::from("ticking.toml");
    if local_path.exists() {
        info!(?local_path, "Loading config from local path");
        return TickingConfig::from_file(&local_path)
            .with_context(|| format!("Failed to load config from {:?}", local_path));
    }

    info!("No config file found, using built-in defaults");
    Ok(TickingConfig::default())
}

/// Apply command-line overrides on top of the loaded configuration.
fn apply_overrides(config: &mut TickingConfig, args: &Args) {
    if let Some(tick_len) = args.tick_len {
        config.clock.tick_len = tick_len;
    }
    if let Some(source) = args.source {
        config.clock.source = source;
    }
    if let Some(ticks) = args.ticks {
        config.run.max_ticks = ticks;
    }
    if let Some(path) = &args.profile_output {
        config.run.profile_output = Some(path.clone());
    }
}

/// Run the tick loop until `max_ticks` (0 = unbounded) or cancellation.
///
/// Each wait is recorded as a `wait` section when a profiler is given.
fn run_ticks<S: TimeSource + Clone>(
    clock: &TickClock<S>,
    max_ticks: u64,
    cancel: CancelToken,
    mut profiler: Option<&mut SectionProfiler<S>>,
) -> Result<RunSummary> {
    let mut stopwatch = Stopwatch::with_source(Some("tick loop"), clock.source().clone());
    let mut ticks = clock.ticks().cancel_on(cancel);
    let mut yielded = 0u64;
    let mut last_tick = 0u64;

    stopwatch.measure(|_| -> Result<()> {
        loop {
            let next = match profiler.as_deref_mut() {
                Some(p) => p.section("wait", || ticks.next()),
                None => ticks.next(),
            };

            match next {
                Some(Ok((tick, elapsed))) => {
                    yielded += 1;
                    last_tick = tick;
                    info!(tick, elapsed_ms = elapsed.as_millis() as u64, "Tick");
                }
                Some(Err(TickingError::Cancelled)) => {
                    info!(ticks = yielded, "Tick loop cancelled");
                    return Ok(());
                }
                Some(Err(e)) => return Err(e).context("Tick loop aborted"),
                None => return Ok(()),
            }

            if max_ticks > 0 && yielded >= max_ticks {
                info!(ticks = yielded, "Maximum tick count reached");
                return Ok(());
            }
        }
    })?;

    Ok(RunSummary {
        yielded,
        last_tick,
        missed: ticks.missed(),
        timing: stopwatch.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticking_common::time::{ManualClock, MonotonicInstant};
    use ticking_runtime::ProfilingSession;

    fn args(extra: &[&str]) -> Args {
        Args::parse_from(std::iter::once("ticking").chain(extra.iter().copied()))
    }

    #[test]
    fn test_overrides_replace_config() {
        let mut config = TickingConfig::default();
        apply_overrides(
            &mut config,
            &args(&["--tick-len", "40ms", "-n", "12", "--source", "wall", "-p", "out.json"]),
        );

        assert_eq!(config.clock.tick_len, Duration::from_millis(40));
        assert_eq!(config.clock.source, ClockSource::Wall);
        assert_eq!(config.run.max_ticks, 12);
        assert_eq!(config.run.profile_output, Some(PathBuf::from("out.json")));
    }

    #[test]
    fn test_no_overrides_keep_config() {
        let mut config = TickingConfig::from_toml("[clock]\ntick_len = \"2s\"\n").unwrap();
        apply_overrides(&mut config, &args(&[]));
        assert_eq!(config.clock.tick_len, Duration::from_secs(2));
        assert_eq!(config.run.max_ticks, 0);
    }

    #[test]
    fn test_bad_tick_len_rejected_by_parser() {
        let result =
            Args::try_parse_from(["ticking", "--tick-len", "whenever"].iter().copied());
        assert!(result.is_err());
    }

    #[test]
    fn test_run_ticks_stops_at_limit() {
        let source = ManualClock::default();
        let clock = TickClock::with_source(Duration::from_millis(250), &source, None).unwrap();

        let summary = run_ticks(&clock, 4, CancelToken::new(), None).unwrap();

        assert_eq!(summary.yielded, 4);
        assert_eq!(summary.last_tick, 4);
        assert_eq!(summary.missed, 0);
        assert_eq!(summary.timing, "tick loop: took 1.00s");
    }

    #[test]
    fn test_run_ticks_cancelled() {
        let source = ManualClock::default();
        let clock = TickClock::with_source(Duration::from_millis(250), &source, None).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let summary = run_ticks(&clock, 0, cancel, None).unwrap();
        assert_eq!(summary.yielded, 0);
        assert_eq!(summary.last_tick, 0);
    }

    #[test]
    fn test_run_ticks_time_travel_aborts() {
        let source = ManualClock::default();
        let clock = TickClock::with_source(
            Duration::from_millis(250),
            &source,
            Some(MonotonicInstant::from_nanos(5_000_000_000)),
        )
        .unwrap();

        let err = run_ticks(&clock, 3, CancelToken::new(), None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TickingError>(),
            Some(TickingError::TimeTravel { .. })
        ));
    }

    #[test]
    fn test_run_ticks_profiles_waits() {
        let source = ManualClock::default();
        let clock = TickClock::with_source(Duration::from_millis(100), &source, None).unwrap();
        let mut profiler = SectionProfiler::with_source(&source, 16);

        profiler.enable().unwrap();
        run_ticks(&clock, 3, CancelToken::new(), Some(&mut profiler)).unwrap();
        profiler.disable().unwrap();

        let wait = profiler.section_stats("wait").unwrap();
        assert_eq!(wait.count(), 3);
        assert_eq!(wait.total(), Duration::from_millis(300));
    }
}
