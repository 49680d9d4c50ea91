//! Singleton lock and runtime artefact writing.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::{info, warn};

use privstat_config::RuntimePaths;

use crate::health::{DaemonStatus, HealthSnapshot};

use super::PROCESS_TARGET;
use super::errors::LaunchError;

/// Owns the daemon's lock, pid, and health files.
///
/// Dropping the guard removes the artefacts, so the client's `daemon stop`
/// observes a clean runtime directory once the process exits.
#[derive(Debug)]
pub(crate) struct ProcessGuard {
    paths: RuntimePaths,
    _lock: File,
    pid: Option<u32>,
}

impl ProcessGuard {
    /// Acquires the singleton lock, reclaiming stale files from a dead
    /// daemon.
    pub(crate) fn acquire(paths: RuntimePaths) -> Result<Self, LaunchError> {
        let lock = acquire_lock(&paths)?;
        Ok(Self {
            paths,
            _lock: lock,
            pid: None,
        })
    }

    pub(crate) fn write_pid(&mut self, pid: u32) -> Result<(), LaunchError> {
        let path = self.paths.pid_path();
        let mut file = open_private(path).map_err(|source| LaunchError::PidWrite {
            path: path.to_path_buf(),
            source,
        })?;
        writeln!(file, "{pid}").map_err(|source| LaunchError::PidWrite {
            path: path.to_path_buf(),
            source,
        })?;
        file.sync_all().map_err(|source| LaunchError::PidWrite {
            path: path.to_path_buf(),
            source,
        })?;
        self.pid = Some(pid);
        info!(
            target: PROCESS_TARGET,
            pid,
            file = %path.display(),
            "pid file written"
        );
        Ok(())
    }

    pub(crate) fn write_health(&self, status: DaemonStatus) -> Result<(), LaunchError> {
        let pid = self.pid.ok_or(LaunchError::MissingPid)?;
        let path = self.paths.health_path();
        let mut file = open_private(path).map_err(|source| LaunchError::HealthWrite {
            path: path.to_path_buf(),
            source,
        })?;
        let snapshot = HealthSnapshot::now(status, pid);
        let encoded = serde_json::to_vec(&snapshot).map_err(|source| LaunchError::HealthWrite {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidData, source),
        })?;
        file.write_all(&encoded)
            .and_then(|()| file.write_all(b"\n"))
            .and_then(|()| file.sync_all())
            .map_err(|source| LaunchError::HealthWrite {
                path: path.to_path_buf(),
                source,
            })?;
        info!(
            target: PROCESS_TARGET,
            status = status.as_str(),
            file = %path.display(),
            "health snapshot updated"
        );
        Ok(())
    }

    pub(crate) fn paths(&self) -> &RuntimePaths {
        &self.paths
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        for path in [
            self.paths.lock_path(),
            self.paths.pid_path(),
            self.paths.health_path(),
        ] {
            if let Err(error) = fs::remove_file(path)
                && error.kind() != io::ErrorKind::NotFound
            {
                warn!(
                    target: PROCESS_TARGET,
                    file = %path.display(),
                    %error,
                    "failed to remove runtime file"
                );
            }
        }
    }
}

/// Opens a runtime file for truncating writes, owner-only on Unix.
fn open_private(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

fn acquire_lock(paths: &RuntimePaths) -> Result<File, LaunchError> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    match options.open(paths.lock_path()) {
        Ok(file) => {
            info!(
                target: PROCESS_TARGET,
                file = %paths.lock_path().display(),
                "acquired daemon lock"
            );
            Ok(file)
        }
        Err(error) if error.kind() == io::ErrorKind::AlreadyExists => handle_existing_lock(paths),
        Err(source) => Err(LaunchError::LockCreate {
            path: paths.lock_path().to_path_buf(),
            source,
        }),
    }
}

fn handle_existing_lock(paths: &RuntimePaths) -> Result<File, LaunchError> {
    if let Some(pid) = read_pid(paths.pid_path())
        && pid != 0
    {
        match process_is_alive(pid) {
            Ok(true) => {
                info!(
                    target: PROCESS_TARGET,
                    pid,
                    "refusing to start: existing daemon alive"
                );
                return Err(LaunchError::AlreadyRunning { pid });
            }
            Ok(false) => {
                warn!(
                    target: PROCESS_TARGET,
                    pid,
                    "existing daemon not detected; cleaning stale files"
                );
            }
            Err(error) => return Err(error),
        }
    }
    remove_stale(paths.lock_path())?;
    remove_stale(paths.pid_path())?;
    acquire_lock(paths)
}

fn read_pid(path: &Path) -> Option<u32> {
    let content = fs::read_to_string(path).ok()?;
    content.trim().parse::<u32>().ok()
}

fn remove_stale(path: &Path) -> Result<(), LaunchError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(LaunchError::Cleanup {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Probes a pid with a null signal; EPERM still means the process exists.
fn process_is_alive(pid: u32) -> Result<bool, LaunchError> {
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => Ok(true),
        Err(Errno::EPERM) => Ok(true),
        Err(Errno::ESRCH | Errno::ECHILD) => Ok(false),
        Err(source) => Err(LaunchError::CheckProcess { pid, source }),
    }
}

#[cfg(test)]
mod tests {
    use privstat_config::{Config, SocketEndpoint};

    use super::*;

    fn paths_in(dir: &Path) -> RuntimePaths {
        let socket = dir.join("privstatd.sock");
        let config = Config {
            daemon_socket: SocketEndpoint::unix(socket.to_str().expect("utf8 path")),
            ..Config::default()
        };
        RuntimePaths::from_config(&config).expect("paths")
    }

    #[test]
    fn guard_writes_and_removes_artefacts() {
        let dir = tempfile::tempdir().expect("temp dir");
        let paths = paths_in(dir.path());
        {
            let mut guard = ProcessGuard::acquire(paths.clone()).expect("acquire");
            guard.write_pid(std::process::id()).expect("pid");
            guard.write_health(DaemonStatus::Ready).expect("health");
            assert!(paths.lock_path().exists());
            assert!(paths.pid_path().exists());
            assert!(paths.health_path().exists());
        }
        assert!(!paths.lock_path().exists());
        assert!(!paths.pid_path().exists());
        assert!(!paths.health_path().exists());
    }

    #[test]
    fn second_guard_refuses_while_owner_is_alive() {
        let dir = tempfile::tempdir().expect("temp dir");
        let paths = paths_in(dir.path());
        let mut guard = ProcessGuard::acquire(paths.clone()).expect("acquire");
        guard.write_pid(std::process::id()).expect("pid");

        let error = ProcessGuard::acquire(paths).expect_err("second acquire");
        assert!(matches!(error, LaunchError::AlreadyRunning { .. }));
    }

    #[test]
    fn stale_artefacts_from_a_dead_pid_are_reclaimed() {
        let dir = tempfile::tempdir().expect("temp dir");
        let paths = paths_in(dir.path());
        fs::write(paths.lock_path(), b"").expect("stale lock");
        // The top of the Linux pid space; essentially never a live process.
        fs::write(paths.pid_path(), b"4194303\n").expect("stale pid");

        let guard = ProcessGuard::acquire(paths.clone());
        assert!(guard.is_ok(), "stale artefacts should be reclaimed");
    }

    #[test]
    fn health_before_pid_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let guard = ProcessGuard::acquire(paths_in(dir.path())).expect("acquire");
        assert!(matches!(
            guard.write_health(DaemonStatus::Starting),
            Err(LaunchError::MissingPid)
        ));
    }
}
