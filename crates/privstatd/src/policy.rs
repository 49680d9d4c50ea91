//! Policy snapshot backing the permission status query.
//!
//! The daemon does not compute permission state itself; it reports the
//! policy snapshot maintained next to its runtime artefacts (root-owned in
//! production). The [`StatusProvider`] seam keeps the dispatch layer
//! testable with an in-memory provider.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use privstat_protocol::{MAX_RECORDS, PermStatus};
use thiserror::Error;
use tracing::debug;

const POLICY_TARGET: &str = "privstatd::policy";

/// Produces the current per-package permission records.
pub trait StatusProvider: Send + Sync + 'static {
    /// Reads the records backing one status reply.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the snapshot exists but cannot be
    /// read or parsed.
    fn perm_statuses(&self) -> Result<Vec<PermStatus>, ProviderError>;
}

/// Errors raised while reading the policy snapshot.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Reading the snapshot file failed.
    #[error("failed to read policy snapshot {path}: {source}")]
    Read {
        /// Snapshot location.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
    /// The snapshot exists but is not valid.
    #[error("failed to parse policy snapshot {path}: {source}")]
    Parse {
        /// Snapshot location.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
    /// The snapshot holds more records than a reply can carry.
    #[error("policy snapshot {path} holds {count} records, limit {limit}")]
    TooManyRecords {
        /// Snapshot location.
        path: PathBuf,
        /// Records found.
        count: usize,
        /// Reply limit.
        limit: u32,
    },
}

/// File-backed policy snapshot.
#[derive(Debug, Clone)]
pub struct PolicyStore {
    path: PathBuf,
}

impl PolicyStore {
    /// Builds a store reading from the given snapshot path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Snapshot location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StatusProvider for PolicyStore {
    fn perm_statuses(&self) -> Result<Vec<PermStatus>, ProviderError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                // A fresh install has no snapshot yet; that is an empty
                // report, not a failure.
                debug!(
                    target: POLICY_TARGET,
                    path = %self.path.display(),
                    "policy snapshot absent"
                );
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(ProviderError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let records: Vec<PermStatus> =
            serde_json::from_str(&content).map_err(|source| ProviderError::Parse {
                path: self.path.clone(),
                source,
            })?;
        if records.len() > MAX_RECORDS as usize {
            return Err(ProviderError::TooManyRecords {
                path: self.path.clone(),
                count: records.len(),
                limit: MAX_RECORDS,
            });
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use privstat_protocol::PermState;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;

    #[fixture]
    fn snapshot_dir() -> TempDir {
        tempfile::tempdir().expect("temp dir")
    }

    #[rstest]
    fn absent_snapshot_reads_as_empty(snapshot_dir: TempDir) {
        let store = PolicyStore::new(snapshot_dir.path().join("policy.json"));
        assert_eq!(store.perm_statuses().expect("read"), Vec::new());
    }

    #[rstest]
    fn snapshot_round_trips_records(snapshot_dir: TempDir) {
        let path = snapshot_dir.path().join("policy.json");
        let records = vec![PermStatus {
            package: "org.example".into(),
            permission: "net.inet".into(),
            state: PermState::Denied,
            overridden: true,
        }];
        fs::write(&path, serde_json::to_vec(&records).expect("serialise")).expect("write");

        let store = PolicyStore::new(path);
        assert_eq!(store.perm_statuses().expect("read"), records);
    }

    #[rstest]
    fn malformed_snapshot_is_a_parse_error(snapshot_dir: TempDir) {
        let path = snapshot_dir.path().join("policy.json");
        fs::write(&path, b"{ not json").expect("write");

        let store = PolicyStore::new(path);
        assert!(matches!(
            store.perm_statuses(),
            Err(ProviderError::Parse { .. })
        ));
    }
}
