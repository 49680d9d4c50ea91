//! Shutdown coordination.
//!
//! One flag ends the daemon, raised from two directions: termination
//! signals registered here, and the wire shutdown command raised by the
//! dispatch router. The serving loop parks on [`ShutdownFlag::wait`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::flag;
use tracing::info;

use super::PROCESS_TARGET;
use super::errors::LaunchError;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Process-wide shutdown flag.
#[derive(Debug, Clone)]
pub(crate) struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Registers the termination signals to raise this flag.
    pub(crate) fn install_signal_handlers(&self) -> Result<(), LaunchError> {
        for signal in [SIGTERM, SIGINT, SIGQUIT, SIGHUP] {
            flag::register(signal, Arc::clone(&self.0))
                .map_err(|source| LaunchError::Signals { source })?;
        }
        Ok(())
    }

    /// Raises the flag; idempotent.
    pub(crate) fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Parks the calling thread until the flag is raised.
    pub(crate) fn wait(&self) {
        while !self.is_raised() {
            thread::sleep(POLL_INTERVAL);
        }
        info!(target: PROCESS_TARGET, "shutdown flag raised");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raise_is_visible_across_clones() {
        let flag_handle = ShutdownFlag::new();
        let clone = flag_handle.clone();
        assert!(!clone.is_raised());
        flag_handle.raise();
        assert!(clone.is_raised());
    }

    #[test]
    fn wait_returns_once_raised() {
        let flag_handle = ShutdownFlag::new();
        let waiter = flag_handle.clone();
        let handle = thread::spawn(move || waiter.wait());
        flag_handle.raise();
        handle.join().expect("wait returns");
    }
}
