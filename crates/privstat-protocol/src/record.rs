//! Record types carried by list replies.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Grant classification for one (package, permission) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermState {
    /// The permission is granted.
    Granted,
    /// The permission is denied.
    Denied,
    /// The permission does not apply to the package.
    NotApplicable,
}

impl PermState {
    /// Wire code for this state. Append-only.
    #[must_use]
    pub(crate) const fn code(self) -> u8 {
        match self {
            Self::Granted => 0,
            Self::Denied => 1,
            Self::NotApplicable => 2,
        }
    }

    /// Looks up the state carried by a wire code.
    #[must_use]
    pub(crate) const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Granted),
            1 => Some(Self::Denied),
            2 => Some(Self::NotApplicable),
            _ => None,
        }
    }

    /// Canonical name used in CLI output.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::NotApplicable => "not-applicable",
        }
    }
}

impl fmt::Display for PermState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

/// One permission status record reported by the daemon.
///
/// Records are produced only daemon-side and are immutable once decoded; the
/// client owns them outright and holds them for the lifetime of a single
/// display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermStatus {
    /// Package the record describes.
    pub package: String,
    /// Permission name within the package.
    pub permission: String,
    /// Grant classification reported by the daemon.
    pub state: PermState,
    /// Set when a policy override pins the state.
    #[serde(default)]
    pub overridden: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_codes_are_stable() {
        assert_eq!(PermState::Granted.code(), 0);
        assert_eq!(PermState::Denied.code(), 1);
        assert_eq!(PermState::NotApplicable.code(), 2);
        for state in [
            PermState::Granted,
            PermState::Denied,
            PermState::NotApplicable,
        ] {
            assert_eq!(PermState::from_code(state.code()), Some(state));
        }
        assert_eq!(PermState::from_code(3), None);
    }

    #[test]
    fn records_deserialise_without_override_marker() {
        let record: PermStatus = serde_json::from_str(
            r#"{"package":"org.example","permission":"net.inet","state":"granted"}"#,
        )
        .expect("parse record");
        assert!(!record.overridden);
        assert_eq!(record.state, PermState::Granted);
    }
}
