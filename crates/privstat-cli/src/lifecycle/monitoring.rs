//! Daemon health monitoring.
//!
//! The daemon communicates its lifecycle through a JSON health snapshot and
//! a pid file in the runtime directory. These helpers read both and poll
//! for readiness during `daemon start`.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::process::Child;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use privstat_config::RuntimePaths;

use super::error::LifecycleError;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Daemon state as reported through the health snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum DaemonStatus {
    /// Initialising; not yet accepting connections.
    Starting,
    /// Fully operational.
    Ready,
    /// Shutting down gracefully.
    Stopping,
}

impl fmt::Display for DaemonStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => formatter.write_str("starting"),
            Self::Ready => formatter.write_str("ready"),
            Self::Stopping => formatter.write_str("stopping"),
        }
    }
}

/// Health snapshot the daemon writes to its runtime directory.
#[derive(Debug, PartialEq, Eq, serde::Deserialize)]
pub(crate) struct HealthSnapshot {
    /// Current daemon state.
    pub status: DaemonStatus,
    /// Process id of the running daemon.
    pub pid: u32,
    /// Seconds since the epoch when the snapshot was written.
    pub timestamp: u64,
}

pub(super) fn read_health(path: &Path) -> Result<Option<HealthSnapshot>, LifecycleError> {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).map(Some).map_err(|source| {
            LifecycleError::ParseHealth {
                path: path.to_path_buf(),
                source,
            }
        }),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(LifecycleError::ReadHealth {
            path: path.to_path_buf(),
            source,
        }),
    }
}

pub(super) fn read_pid(path: &Path) -> Result<Option<u32>, LifecycleError> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let trimmed = content.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<u32>()
                .map(Some)
                .map_err(|source| LifecycleError::ParsePid {
                    path: path.to_path_buf(),
                    source,
                })
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(LifecycleError::ReadPid {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Waits for the daemon to report ready within the timeout.
///
/// The snapshot only counts when it is fresh (written after the spawn) and
/// belongs to the spawned process. A child that exits cleanly has forked
/// into the background, after which the pid check is skipped and freshness
/// alone identifies the snapshot.
pub(super) fn wait_for_ready(
    paths: &RuntimePaths,
    child: &mut Child,
    started_at: SystemTime,
    timeout: Duration,
) -> Result<HealthSnapshot, LifecycleError> {
    let deadline = Instant::now() + timeout;
    let expected_pid = child.id();
    let mut daemonized = false;
    while Instant::now() < deadline {
        if let Some(status) = child
            .try_wait()
            .map_err(|source| LifecycleError::MonitorChild { source })?
        {
            if !status.success() {
                return Err(LifecycleError::StartupFailed {
                    exit_status: status.code(),
                });
            }
            daemonized = true;
        }

        if let Some(snapshot) = read_health(paths.health_path())? {
            let pid_ok = daemonized || snapshot.pid == expected_pid;
            if pid_ok && snapshot_is_recent(&snapshot, started_at) {
                match snapshot.status {
                    DaemonStatus::Ready => return Ok(snapshot),
                    DaemonStatus::Stopping => {
                        return Err(LifecycleError::StartupAborted {
                            path: paths.health_path().to_path_buf(),
                        });
                    }
                    DaemonStatus::Starting => {}
                }
            }
        }
        thread::sleep(POLL_INTERVAL);
    }
    Err(LifecycleError::StartupTimeout {
        health_path: paths.health_path().to_path_buf(),
        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
    })
}

fn snapshot_is_recent(snapshot: &HealthSnapshot, started_at: SystemTime) -> bool {
    // The snapshot has whole-second precision, so truncate the start time the
    // same way; otherwise a snapshot written in the spawn second reads stale.
    let started_secs = started_at
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(u64::MAX);
    snapshot.timestamp >= started_secs
}
