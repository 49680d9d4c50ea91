//! Daemon launch sequencing.
//!
//! Ordering matters here: the singleton lock is taken before daemonising so
//! a second start fails fast in the foreground; the pid is written after
//! daemonising because forking changes it; the health snapshot flips to
//! ready only once the listener is accepting.

use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use nix::unistd::geteuid;
use tracing::{info, warn};

use privstat_config::{Config, RuntimePaths};

use crate::dispatch::{Router, SessionConnectionHandler};
use crate::health::DaemonStatus;
use crate::heap::HeapDumper;
use crate::ops::OpTable;
use crate::policy::{PolicyStore, StatusProvider};
use crate::telemetry;
use crate::transport::SocketListener;

use super::daemonizer::{Daemonizer, SystemDaemonizer};
use super::errors::LaunchError;
use super::guard::ProcessGuard;
use super::signals::ShutdownFlag;
use super::{FOREGROUND_ENV_VAR, PROCESS_TARGET};

const POLICY_FILE: &str = "policy.json";

/// Launch mode for the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LaunchMode {
    /// Fork into the background and detach from the controlling terminal.
    Background,
    /// Stay attached to the terminal; used for debugging and tests.
    Foreground,
}

impl LaunchMode {
    fn detect() -> Self {
        if env::var_os(FOREGROUND_ENV_VAR).is_some() {
            Self::Foreground
        } else {
            Self::Background
        }
    }
}

/// Runs the daemon using the process environment and arguments.
///
/// # Errors
///
/// Returns [`LaunchError`] when any stage of the launch sequence fails.
pub fn run_daemon() -> Result<(), LaunchError> {
    run_daemon_from(env::args_os())
}

/// Runs the daemon with an explicit argument list.
///
/// # Errors
///
/// Returns [`LaunchError`] when any stage of the launch sequence fails.
pub fn run_daemon_from<I>(args: I) -> Result<(), LaunchError>
where
    I: IntoIterator<Item = OsString>,
{
    let config = Config::load_from_iter(args).map_err(LaunchError::Configuration)?;
    let _telemetry = telemetry::initialise(&config)?;
    let mode = LaunchMode::detect();
    info!(target: PROCESS_TARGET, ?mode, "starting daemon runtime");

    config.daemon_socket().prepare_filesystem()?;
    let paths = RuntimePaths::from_config(&config)?;
    let mut guard = ProcessGuard::acquire(paths)?;

    if mode == LaunchMode::Background {
        SystemDaemonizer.daemonize(guard.paths())?;
    }
    guard.write_pid(std::process::id())?;
    guard.write_health(DaemonStatus::Starting)?;

    let shutdown = ShutdownFlag::new();
    shutdown.install_signal_handlers()?;

    let euid = geteuid().as_raw();
    if euid != 0 {
        warn!(
            target: PROCESS_TARGET,
            euid,
            "running without elevated privilege; privileged data may be incomplete"
        );
    }

    let provider: Arc<dyn StatusProvider> =
        Arc::new(PolicyStore::new(policy_path(&config, guard.paths())));
    let router = Router::new(
        provider,
        OpTable::builtin(),
        HeapDumper::new(guard.paths().dump_dir()),
        shutdown.clone(),
    );
    let handler = Arc::new(SessionConnectionHandler::new(router, euid));

    let listener = SocketListener::bind(config.daemon_socket())?;
    let listener_handle = listener.start(handler)?;
    guard.write_health(DaemonStatus::Ready)?;
    info!(
        target: PROCESS_TARGET,
        endpoint = %config.daemon_socket(),
        euid,
        "daemon ready"
    );

    shutdown.wait();

    guard.write_health(DaemonStatus::Stopping)?;
    listener_handle.shutdown();
    listener_handle.join()?;
    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    Ok(())
}

fn policy_path(config: &Config, paths: &RuntimePaths) -> PathBuf {
    config.policy_path().map_or_else(
        || paths.runtime_dir().join(POLICY_FILE),
        |path| path.as_std_path().to_path_buf(),
    )
}
