//! Signal handling for interrupting the tick loop.
//!
//! SIGINT and SIGTERM set async-signal-safe flags; a poll thread turns them
//! into a fired [`CancelToken`], which the cancellable tick wait observes
//! within one poll slice. Each handler restores the default disposition
//! once it has run, so a second signal terminates the process.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use ticking_runtime::CancelToken;
use tracing::{debug, info};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Signals that stop the tick loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// SIGTERM - Graceful termination request.
    Terminate,
    /// SIGINT - Interrupt (Ctrl+C).
    Interrupt,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::Terminate => write!(f, "SIGTERM"),
            SignalKind::Interrupt => write!(f, "SIGINT"),
        }
    }
}

/// Shared state between the poll thread and the main loop.
#[derive(Debug, Default)]
pub struct SignalState {
    /// Count of signals received (for diagnostics).
    signal_count: AtomicU32,
}

impl SignalState {
    /// Create a new signal state.
    pub fn new() -> Self {
        Self::default()
    }

    fn record_signal(&self, kind: SignalKind) {
        self.signal_count.fetch_add(1, Ordering::Relaxed);
        info!(signal = %kind, "Signal received, stopping tick loop");
    }

    /// Get the total number of signals received.
    pub fn signal_count(&self) -> u32 {
        self.signal_count.load(Ordering::Relaxed)
    }
}

/// Installs signal handlers and exposes them as a [`CancelToken`].
#[derive(Clone)]
pub struct SignalHandler {
    state: Arc<SignalState>,
    token: CancelToken,
}

impl SignalHandler {
    /// Create a new signal handler and register signal handlers.
    ///
    /// On Unix systems this registers handlers for SIGTERM and SIGINT. On
    /// other platforms the token never fires.
    pub fn new() -> std::io::Result<Self> {
        let handler = Self {
            state: Arc::new(SignalState::new()),
            token: CancelToken::new(),
        };

        #[cfg(unix)]
        handler.register_unix_handlers()?;

        Ok(handler)
    }

    #[cfg(unix)]
    fn register_unix_handlers(&self) -> std::io::Result<()> {
        use std::os::raw::c_int;

        static TERM_FLAG: AtomicBool = AtomicBool::new(false);
        static INT_FLAG: AtomicBool = AtomicBool::new(false);

        extern "C" fn sigterm_handler(sig: c_int) {
            TERM_FLAG.store(true, Ordering::Relaxed);
            restore_default(sig);
        }

        extern "C" fn sigint_handler(sig: c_int) {
            INT_FLAG.store(true, Ordering::Relaxed);
            restore_default(sig);
        }

        fn restore_default(sig: c_int) {
            // SAFETY: signal(2) is async-signal-safe.
            unsafe {
                libc::signal(sig, libc::SIG_DFL);
            }
        }

        let state = Arc::clone(&self.state);
        let token = self.token.clone();

        std::thread::Builder::new()
            .name("ticking-signals".into())
            .spawn(move || {
                while !token.is_cancelled() {
                    if TERM_FLAG.swap(false, Ordering::Relaxed) {
                        state.record_signal(SignalKind::Terminate);
                        token.cancel();
                    }
                    if INT_FLAG.swap(false, Ordering::Relaxed) {
                        state.record_signal(SignalKind::Interrupt);
                        token.cancel();
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
            })?;

        // SAFETY: the handlers only store to static atomics and call
        // signal(2), both async-signal-safe.
        unsafe {
            if libc::signal(libc::SIGTERM, sigterm_handler as libc::sighandler_t)
                == libc::SIG_ERR
            {
                return Err(std::io::Error::last_os_error());
            }
            if libc::signal(libc::SIGINT, sigint_handler as libc::sighandler_t) == libc::SIG_ERR
            {
                return Err(std::io::Error::last_os_error());
            }
        }

        debug!("Unix signal handlers registered");
        Ok(())
    }

    /// Token fired by the first SIGINT or SIGTERM.
    pub fn cancel_token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Get the signal state for inspection.
    pub fn state(&self) -> &SignalState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_state_default() {
        let state = SignalState::new();
        assert_eq!(state.signal_count(), 0);
    }

    #[test]
    fn test_record_signal_counts() {
        let state = SignalState::new();
        state.record_signal(SignalKind::Interrupt);
        state.record_signal(SignalKind::Terminate);
        assert_eq!(state.signal_count(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_first_signal_cancels_and_restores_default() {
        let handler = SignalHandler::new().unwrap();
        let token = handler.cancel_token();

        // SAFETY: the registered handler runs synchronously and only
        // touches atomics and the signal disposition.
        unsafe {
            libc::raise(libc::SIGTERM);
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while !token.is_cancelled() && std::time::Instant::now() < deadline {
            std::thread::sleep(POLL_INTERVAL);
        }
        assert!(token.is_cancelled());
        assert_eq!(handler.state().signal_count(), 1);

        // SAFETY: swaps SIG_DFL back in and reports the previous disposition.
        let previous = unsafe { libc::signal(libc::SIGTERM, libc::SIG_DFL) };
        assert_eq!(previous, libc::SIG_DFL);
    }

    #[test]
    fn test_signal_kind_display() {
        assert_eq!(SignalKind::Interrupt.to_string(), "SIGINT");
        assert_eq!(SignalKind::Terminate.to_string(), "SIGTERM");
    }
}
