//! Runtime artefact paths shared by the client and daemon.
//!
//! The daemon writes its lock, pid, and health snapshot next to the socket;
//! the client's lifecycle commands read the same files. Heap dumps land in a
//! subdirectory so diagnostic output never collides with control artefacts.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::{Config, SocketEndpoint};

const LOCK_FILE: &str = "privstatd.lock";
const PID_FILE: &str = "privstatd.pid";
const HEALTH_FILE: &str = "privstatd.health";
const DUMP_DIR: &str = "dumps";

/// Canonical paths for runtime artefacts written by the daemon.
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    runtime_dir: PathBuf,
    lock_path: PathBuf,
    pid_path: PathBuf,
    health_path: PathBuf,
    dump_dir: PathBuf,
}

impl RuntimePaths {
    /// Derives runtime paths from the configuration, creating the directory.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimePathsError`] when the socket path has no parent or
    /// the runtime directory cannot be created.
    pub fn from_config(config: &Config) -> Result<Self, RuntimePathsError> {
        let paths = Self::from_config_readonly(config)?;
        fs::create_dir_all(&paths.runtime_dir).map_err(|source| {
            RuntimePathsError::RuntimeDirectory {
                path: paths.runtime_dir.clone(),
                source,
            }
        })?;
        Ok(paths)
    }

    /// Derives runtime paths without touching the filesystem.
    ///
    /// Used by read-only flows (for example `daemon status`) that must not
    /// create directories as a side effect.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimePathsError::MissingSocketParent`] when the socket
    /// path has no parent directory.
    pub fn from_config_readonly(config: &Config) -> Result<Self, RuntimePathsError> {
        let runtime_dir = runtime_directory(config.daemon_socket())?;
        Ok(Self {
            lock_path: runtime_dir.join(LOCK_FILE),
            pid_path: runtime_dir.join(PID_FILE),
            health_path: runtime_dir.join(HEALTH_FILE),
            dump_dir: runtime_dir.join(DUMP_DIR),
            runtime_dir,
        })
    }

    /// Directory holding runtime artefacts.
    #[must_use]
    pub fn runtime_dir(&self) -> &Path {
        self.runtime_dir.as_path()
    }

    /// Path to the lock file guarding singleton startup.
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        self.lock_path.as_path()
    }

    /// Path to the PID file.
    #[must_use]
    pub fn pid_path(&self) -> &Path {
        self.pid_path.as_path()
    }

    /// Path to the health snapshot.
    #[must_use]
    pub fn health_path(&self) -> &Path {
        self.health_path.as_path()
    }

    /// Directory heap dumps are written to.
    #[must_use]
    pub fn dump_dir(&self) -> &Path {
        self.dump_dir.as_path()
    }
}

fn runtime_directory(endpoint: &SocketEndpoint) -> Result<PathBuf, RuntimePathsError> {
    match endpoint {
        SocketEndpoint::Unix { path } => path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .map(|parent| parent.as_std_path().to_path_buf())
            .ok_or_else(|| RuntimePathsError::MissingSocketParent {
                path: path.to_string(),
            }),
        SocketEndpoint::Tcp { .. } => {
            let mut dir = std::env::temp_dir();
            dir.push("privstat");
            Ok(dir)
        }
    }
}

/// Errors raised while deriving daemon runtime paths.
#[derive(Debug, Error)]
pub enum RuntimePathsError {
    /// The socket path lacked a parent directory.
    #[error("socket path '{path}' has no parent directory")]
    MissingSocketParent {
        /// Offending socket path.
        path: String,
    },
    /// Creating the runtime directory failed.
    #[error("failed to prepare runtime directory '{path}': {source}")]
    RuntimeDirectory {
        /// Directory being created.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_socket(path: &str) -> Config {
        Config {
            daemon_socket: SocketEndpoint::unix(path),
            ..Config::default()
        }
    }

    #[test]
    fn artefacts_live_next_to_the_socket() {
        let dir = tempfile::tempdir().expect("temp dir");
        let socket = dir.path().join("privstatd.sock");
        let config = config_with_socket(socket.to_str().expect("utf8 path"));
        let paths = RuntimePaths::from_config(&config).expect("paths");

        assert_eq!(paths.runtime_dir(), dir.path());
        assert_eq!(paths.pid_path(), dir.path().join(PID_FILE));
        assert_eq!(paths.health_path(), dir.path().join(HEALTH_FILE));
        assert_eq!(paths.dump_dir(), dir.path().join(DUMP_DIR));
    }

    #[test]
    fn readonly_derivation_creates_nothing() {
        let dir = tempfile::tempdir().expect("temp dir");
        let socket = dir.path().join("nested").join("privstatd.sock");
        let config = config_with_socket(socket.to_str().expect("utf8 path"));
        let paths = RuntimePaths::from_config_readonly(&config).expect("paths");

        assert!(!paths.runtime_dir().exists());
    }

    #[test]
    fn socket_without_parent_is_rejected() {
        let config = config_with_socket("privstatd.sock");
        let error = RuntimePaths::from_config_readonly(&config).expect_err("no parent");
        assert!(matches!(
            error,
            RuntimePathsError::MissingSocketParent { .. }
        ));
    }
}
