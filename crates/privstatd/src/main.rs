//! Daemon entrypoint.
//!
//! `privstatd` runs with elevated privilege and answers the `privstat`
//! client's status, app-ops, and heap-dump requests over a socket protocol.

use std::process::ExitCode;

fn main() -> ExitCode {
    match privstatd::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            // Telemetry may not be installed yet when bootstrap fails, so the
            // error also goes to plain stderr.
            eprintln!("privstatd: {error}");
            ExitCode::FAILURE
        }
    }
}
