//! Health snapshot artefacts shared with the client.
//!
//! The daemon records its lifecycle state in a small JSON file next to the
//! socket; the client's `daemon start` and `daemon status` commands poll it.
//! The schema is append-only for the same reason the wire protocol is: the
//! two binaries are updated independently.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Daemon lifecycle state as reported through the health snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum DaemonStatus {
    /// Initialising; not yet accepting connections.
    Starting,
    /// Fully operational.
    Ready,
    /// Shutting down gracefully.
    Stopping,
}

impl DaemonStatus {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Stopping => "stopping",
        }
    }
}

/// Serialised form of one health snapshot.
#[derive(Debug, Serialize)]
pub(crate) struct HealthSnapshot {
    status: DaemonStatus,
    pid: u32,
    timestamp: u64,
}

impl HealthSnapshot {
    /// Builds a snapshot stamped with the current wall-clock second.
    pub(crate) fn now(status: DaemonStatus, pid: u32) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);
        Self {
            status,
            pid,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_serialises_the_client_schema() {
        let snapshot = HealthSnapshot {
            status: DaemonStatus::Ready,
            pid: 7,
            timestamp: 12,
        };
        let json = serde_json::to_string(&snapshot).expect("serialise");
        assert_eq!(json, r#"{"status":"ready","pid":7,"timestamp":12}"#);
    }

    #[test]
    fn now_uses_whole_seconds() {
        let snapshot = HealthSnapshot::now(DaemonStatus::Starting, 1);
        let json = serde_json::to_string(&snapshot).expect("serialise");
        assert!(json.contains(r#""status":"starting""#));
    }
}
