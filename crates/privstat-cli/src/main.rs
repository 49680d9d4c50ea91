//! CLI entrypoint for the privstat client.
//!
//! The binary delegates to [`privstat_cli::run`], which loads configuration,
//! parses arguments, and drives daemon queries and lifecycle commands.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    privstat_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
