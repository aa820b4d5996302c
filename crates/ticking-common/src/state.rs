//! Stopwatch lifecycle states.
//!
//! NOT_STARTED → RUNNING → FINISHED, with FINISHED → RUNNING and
//! RUNNING → RUNNING allowed when a stopwatch is restarted.

use crate::error::{TickingError, TickingResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// States of a stopwatch measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopwatchState {
    /// No start instant recorded.
    #[default]
    NotStarted,
    /// Started, no end instant yet; elapsed time is live.
    Running,
    /// Start and end recorded; elapsed time is fixed.
    Finished,
}

impl fmt::Display for StopwatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "NOT_STARTED"),
            Self::Running => write!(f, "RUNNING"),
            Self::Finished => write!(f, "FINISHED"),
        }
    }
}

impl StopwatchState {
    /// Check if a transition to `target` is valid from the current state.
    #[must_use]
    pub fn can_transition_to(&self, target: StopwatchState) -> bool {
        use StopwatchState::{Finished, NotStarted, Running};

        matches!(
            (self, target),
            (NotStarted, Running)
                | (Running, Finished)
                // begin() restarts the measurement
                | (Running, Running)
                | (Finished, Running)
        )
    }

    /// Return `target` if reachable from the current state.
    pub fn transition_to(&self, target: StopwatchState) -> TickingResult<StopwatchState> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(TickingError::InvalidState(format!(
                "stopwatch cannot go from {self} to {target}"
            )))
        }
    }

    /// Returns true while elapsed time is still growing.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}
