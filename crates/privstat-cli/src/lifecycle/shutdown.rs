//! Daemon shutdown helpers.

use std::io;
use std::thread;
use std::time::{Duration, Instant};

use privstat_config::{RuntimePaths, SocketEndpoint};

use super::error::LifecycleError;
use super::socket::socket_is_reachable;

#[cfg(unix)]
use libc::{SIGTERM, kill};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Sends SIGTERM to the daemon process.
///
/// # Errors
///
/// Returns `SignalFailed` when the signal cannot be delivered (the process
/// is gone, or the caller lacks permission to signal it).
pub(super) fn signal_daemon(pid: u32) -> Result<(), LifecycleError> {
    #[cfg(unix)]
    {
        // SAFETY: kill(2) is memory-safe for any pid value; the kernel
        // reports invalid targets through the return value.
        let result = unsafe { kill(pid as libc::pid_t, SIGTERM) };
        if result == 0 {
            Ok(())
        } else {
            Err(LifecycleError::SignalFailed {
                pid,
                source: io::Error::last_os_error(),
            })
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        Err(LifecycleError::UnsupportedPlatform)
    }
}

/// Waits until the pid file is gone and the socket stopped listening.
pub(super) fn wait_for_shutdown(
    paths: &RuntimePaths,
    endpoint: &SocketEndpoint,
) -> Result<(), LifecycleError> {
    let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
    while Instant::now() < deadline {
        let pid_exists = paths.pid_path().exists();
        let socket_busy = socket_is_reachable(endpoint)?;
        if !pid_exists && !socket_busy {
            return Ok(());
        }
        thread::sleep(POLL_INTERVAL);
    }
    Err(LifecycleError::ShutdownTimeout {
        pid_path: paths.pid_path().to_path_buf(),
        timeout_ms: u64::try_from(SHUTDOWN_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
    })
}
