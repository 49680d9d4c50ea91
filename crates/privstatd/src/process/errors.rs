//! Error types for daemon launch and shutdown.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use nix::errno::Errno;
use ortho_config::OrthoError;
use thiserror::Error;

use privstat_config::{RuntimePathsError, SocketPreparationError};

use crate::telemetry::TelemetryError;
use crate::transport::ListenerError;

use super::daemonizer::DaemonizeError;

/// Errors surfaced while launching or stopping the daemon.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {0}")]
    Configuration(Arc<OrthoError>),
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {0}")]
    Telemetry(#[from] TelemetryError),
    /// Socket directory preparation failed.
    #[error("failed to prepare daemon socket: {0}")]
    Socket(#[from] SocketPreparationError),
    /// Runtime path derivation failed.
    #[error(transparent)]
    Paths(#[from] RuntimePathsError),
    /// Another daemon already owns the runtime directory.
    #[error("daemon already running with pid {pid}")]
    AlreadyRunning {
        /// Pid recorded by the running daemon.
        pid: u32,
    },
    /// Creating the lock file failed.
    #[error("failed to create lock file {path}: {source}")]
    LockCreate {
        /// Lock file location.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
    /// Probing a recorded pid failed.
    #[error("failed to probe process {pid}: {source}")]
    CheckProcess {
        /// Pid being probed.
        pid: u32,
        /// Underlying errno.
        source: Errno,
    },
    /// Removing a stale runtime file failed.
    #[error("failed to remove stale file {path}: {source}")]
    Cleanup {
        /// File being removed.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
    /// Writing the pid file failed.
    #[error("failed to write pid file {path}: {source}")]
    PidWrite {
        /// Pid file location.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
    /// Writing the health snapshot failed.
    #[error("failed to write health snapshot {path}: {source}")]
    HealthWrite {
        /// Health file location.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
    /// A health snapshot was requested before the pid was recorded.
    #[error("health snapshot requested before pid was recorded")]
    MissingPid,
    /// Daemonisation failed.
    #[error(transparent)]
    Daemonize(#[from] DaemonizeError),
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Signals {
        /// Underlying registration error.
        #[source]
        source: io::Error,
    },
    /// The socket listener failed.
    #[error("listener failed: {0}")]
    Listener(#[from] ListenerError),
}
