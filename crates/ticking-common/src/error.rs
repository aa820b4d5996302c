use crate::time::MonotonicInstant;
use thiserror::Error;

/// Error types for clocks, stopwatches, and profiling scopes.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TickingError {
    /// Rejected configuration, such as a zero or negative tick length.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The time source reported an instant before the clock's epoch.
    ///
    /// Only a broken or non-monotonic time source produces this; it is never
    /// retried.
    #[error("time travel detected: current time {now} is before start time {epoch}")]
    TimeTravel {
        /// Instant observed from the time source.
        now: MonotonicInstant,
        /// Epoch of the clock.
        epoch: MonotonicInstant,
    },

    /// Operation not valid in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A cancellable wait was interrupted before its tick boundary.
    #[error("wait cancelled")]
    Cancelled,

    /// Failure reported by a profiling session.
    #[error("profiling error: {0}")]
    Profiling(String),
}

/// Convenience type alias for ticking operations.
pub type TickingResult<T> = Result<T, TickingError>;
