//! Real-clock scenarios:
//! - Tick alignment and dropped ticks
//! - Stopwatch measurement and scoped finish
//! - Profiling dumps and configuration-driven clocks

mod clock_test;
mod common;
mod profiling_test;
mod stopwatch_test;
