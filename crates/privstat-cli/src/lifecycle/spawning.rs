//! Daemon process spawning.
//!
//! The daemon needs elevated privilege the client usually lacks, so the
//! spawn supports a configurable launcher prefix (for example `sudo -n`)
//! ahead of the binary. Configuration flags given to the client are
//! forwarded verbatim so both processes resolve the same socket.

use std::env;
use std::ffi::{OsStr, OsString};
use std::process::{Child, Command, Stdio};

use super::error::LifecycleError;

/// Environment variable overriding the daemon binary location.
const DAEMON_BINARY_ENV: &str = "PRIVSTATD_BIN";
const DEFAULT_DAEMON_BINARY: &str = "privstatd";

pub(super) fn spawn_daemon(
    config_arguments: &[OsString],
    launcher: &[String],
) -> Result<Child, LifecycleError> {
    let binary = resolve_daemon_binary();
    let mut command = build_command(&binary, launcher);
    if config_arguments.len() > 1 {
        // Skip argv[0] and forward the configuration flags verbatim.
        for argument in &config_arguments[1..] {
            command.arg(argument);
        }
    }
    command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
    command
        .spawn()
        .map_err(|source| LifecycleError::LaunchDaemon { binary, source })
}

fn build_command(binary: &OsStr, launcher: &[String]) -> Command {
    match launcher.split_first() {
        Some((head, rest)) => {
            let mut command = Command::new(head);
            command.args(rest);
            command.arg(binary);
            command
        }
        None => Command::new(binary),
    }
}

fn resolve_daemon_binary() -> OsString {
    env::var_os(DAEMON_BINARY_ENV).unwrap_or_else(|| OsString::from(DEFAULT_DAEMON_BINARY))
}
