//! Tick clock, stopwatch, and profiling scopes.
//!
//! - **Clock** ([`clock`]): fixed-interval ticks aligned to an epoch
//! - **Stopwatch** ([`stopwatch`]): elapsed-time measurement with scoped finish
//! - **Profiling** ([`profiling`]): enable/disable/dump around a block
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use ticking_runtime::{Stopwatch, TickClock};
//!
//! let clock = TickClock::new(Duration::from_millis(250)).unwrap();
//! let mut stopwatch = Stopwatch::new(Some("frames"));
//!
//! stopwatch.measure(|_| {
//!     for tick in clock.ticks().take(4) {
//!         let (n, elapsed) = tick.unwrap();
//!         println!("tick {n} at {elapsed:?}");
//!     }
//! });
//! println!("{stopwatch}");
//! ```

pub mod clock;
pub mod profiling;
pub mod stopwatch;

pub use clock::{CancelToken, TickClock, TickSchedule, Ticks};
pub use profiling::{profiled, ProfileReport, ProfilingSession, SectionProfiler};
pub use stopwatch::{Stopwatch, StopwatchScope};
