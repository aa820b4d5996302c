//! Scenario tests for ticking against the real system clock.
//!
//! These tests sleep for real and assert on wall-clock windows, so they
//! take a few seconds and assume a lightly loaded machine.

mod scenarios;
