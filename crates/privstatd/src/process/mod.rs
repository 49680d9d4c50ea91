//! Daemon process management.
//!
//! Owns everything between `main` and the serving loop: configuration and
//! telemetry bootstrap, the singleton lock and pid/health artefacts,
//! daemonisation, signal wiring, and the shutdown sequence.

mod daemonizer;
mod errors;
mod guard;
mod launch;
mod signals;

pub use daemonizer::DaemonizeError;
pub use errors::LaunchError;
pub use launch::{run_daemon, run_daemon_from};
pub(crate) use signals::ShutdownFlag;

/// Tracing target for process lifecycle events.
pub(crate) const PROCESS_TARGET: &str = "privstatd::process";

/// Environment variable keeping the daemon attached to the terminal.
pub(crate) const FOREGROUND_ENV_VAR: &str = "PRIVSTATD_FOREGROUND";
