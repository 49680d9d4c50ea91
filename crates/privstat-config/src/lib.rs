//! Shared configuration for the privstat binaries.
//!
//! Both the client and the daemon resolve one [`Config`] through the same
//! layered loader: built-in defaults, then a config file, then `PRIVSTAT_*`
//! environment variables, then CLI flags. The crate also owns the types the
//! two binaries must agree on outside the wire protocol: where the daemon
//! socket lives ([`SocketEndpoint`]) and where runtime artefacts are written
//! ([`RuntimePaths`]).

mod defaults;
mod runtime;
mod socket;

pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_REQUEST_TIMEOUT_MS, default_log_filter, default_socket_endpoint,
};
pub use runtime::{RuntimePaths, RuntimePathsError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Supported logging output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// Structured JSON suitable for ingestion by logging stacks.
    #[default]
    Json,
    /// Human-readable single line output.
    Compact,
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;

/// Resolved configuration shared by the client and the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "PRIVSTAT")]
pub struct Config {
    /// Socket endpoint the daemon listens on.
    #[ortho_config(default = defaults::default_socket_endpoint())]
    pub daemon_socket: SocketEndpoint,
    /// Upper bound, in milliseconds, on one daemon round trip.
    #[ortho_config(default = defaults::DEFAULT_REQUEST_TIMEOUT_MS)]
    pub request_timeout_ms: u64,
    /// Tracing filter expression for the binaries.
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Log output format.
    #[ortho_config(default = LogFormat::Json)]
    pub log_format: LogFormat,
    /// Privilege-escalation prefix the client prepends when spawning the
    /// daemon (for example `["sudo", "-n"]`). Empty means a direct spawn.
    #[ortho_config(default = Vec::new())]
    pub launcher: Vec<String>,
    /// Location of the daemon's policy snapshot; defaults to the runtime
    /// directory when unset.
    pub policy_path: Option<Utf8PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon_socket: defaults::default_socket_endpoint(),
            request_timeout_ms: defaults::DEFAULT_REQUEST_TIMEOUT_MS,
            log_filter: defaults::default_log_filter_string(),
            log_format: LogFormat::default(),
            launcher: Vec::new(),
            policy_path: None,
        }
    }
}

impl Config {
    /// Loads configuration from the process environment and arguments.
    ///
    /// # Errors
    ///
    /// Returns the aggregated loader error when any layer fails to parse.
    pub fn load() -> Result<Self, Arc<OrthoError>> {
        Self::load_from_iter(std::env::args_os())
    }

    /// Loads configuration from an explicit argument list.
    ///
    /// # Errors
    ///
    /// Returns the aggregated loader error when any layer fails to parse.
    pub fn load_from_iter<I>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = OsString>,
    {
        <Self as OrthoConfig>::load_from_iter(args).map_err(Into::into)
    }

    /// Socket endpoint the daemon listens on.
    #[must_use]
    pub const fn daemon_socket(&self) -> &SocketEndpoint {
        &self.daemon_socket
    }

    /// Deadline applied to one blocking daemon round trip.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Privilege-escalation prefix for spawning the daemon.
    #[must_use]
    pub fn launcher(&self) -> &[String] {
        &self.launcher
    }

    /// Configured policy snapshot location, if any.
    #[must_use]
    pub fn policy_path(&self) -> Option<&Utf8Path> {
        self.policy_path.as_deref()
    }
}
