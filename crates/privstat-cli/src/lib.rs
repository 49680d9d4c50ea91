//! Client runtime for the privstat toolchain.
//!
//! The binary obtains privileged information — per-package permission
//! status, app-ops capability flags, diagnostic heap dumps — from the
//! `privstatd` daemon over its socket protocol. This crate owns argument
//! parsing, configuration bootstrapping, the daemon session and dispatcher,
//! and the lifecycle commands that manage the daemon process itself.

use std::ffi::OsString;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use privstat_protocol::{AppOpsMask, Command};
use thiserror::Error;

mod bridge;
mod config;
mod dispatcher;
#[cfg(test)]
pub(crate) mod fake_daemon;
mod lifecycle;
mod render;
mod session;

pub use bridge::{Job, ThreadBridge, WorkerBridge};
pub use dispatcher::{Dispatcher, FailureKind, PendingReply, Response};
pub use session::{DaemonIdentity, DaemonSession, SessionError, SessionState};

use config::{ConfigLoader, OrthoConfigLoader, split_config_arguments};
use lifecycle::{LifecycleCommand, LifecycleContext, LifecycleError, LifecycleOutput, SystemLifecycle};

#[derive(Parser, Debug)]
#[command(name = "privstat", disable_help_subcommand = true)]
struct Cli {
    /// Structured subcommands.
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug, Clone)]
enum CliCommand {
    /// Prints the per-package permission status reported by the daemon.
    Status {
        /// Emits the records as JSON instead of text lines.
        #[arg(long)]
        json: bool,
    },
    /// Prints the daemon's app-ops capability flags.
    AppOps,
    /// Asks the daemon to write a diagnostic heap dump.
    DumpHeap {
        /// Numeric tag included in the dump file name.
        #[arg(long)]
        tag: Option<i64>,
    },
    /// Runs daemon lifecycle commands.
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum DaemonAction {
    /// Starts the daemon and waits for readiness.
    Start,
    /// Stops the daemon gracefully.
    Stop,
    /// Prints daemon health information.
    Status,
}

impl From<DaemonAction> for LifecycleCommand {
    fn from(action: DaemonAction) -> Self {
        match action {
            DaemonAction::Start => Self::Start,
            DaemonAction::Stop => Self::Stop,
            DaemonAction::Status => Self::Status,
        }
    }
}

#[derive(Debug, Error)]
enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("failed to write output: {0}")]
    WriteOutput(io::Error),
    #[error("failed to serialise records: {0}")]
    SerialiseRecords(serde_json::Error),
    #[error("daemon lifecycle command failed: {0}")]
    Lifecycle(#[from] LifecycleError),
}

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_loader(args, stdout, stderr, &OrthoConfigLoader)
}

fn run_with_loader<I, W, E, L>(args: I, stdout: &mut W, stderr: &mut E, loader: &L) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let split = split_config_arguments(&args);
    let mut cli_arguments: Vec<OsString> = Vec::new();
    if let Some(first) = args.first() {
        cli_arguments.push(first.clone());
    }
    if split.command_start < args.len() {
        cli_arguments.extend(args[split.command_start..].iter().cloned());
    }

    let result = Cli::try_parse_from(cli_arguments)
        .map_err(AppError::CliUsage)
        .and_then(|cli| {
            loader
                .load(&split.config_arguments)
                .map(|loaded| (cli, loaded))
        })
        .and_then(|(cli, loaded)| match cli.command {
            CliCommand::Daemon { action } => {
                let context = LifecycleContext {
                    config: &loaded,
                    config_arguments: &split.config_arguments,
                };
                let mut output = LifecycleOutput::new(&mut *stdout, &mut *stderr);
                SystemLifecycle
                    .handle(action.into(), context, &mut output)
                    .map_err(AppError::from)
            }
            command => {
                let dispatcher = Dispatcher::from_config(&loaded);
                execute_query(&command, &dispatcher, stdout, stderr)
            }
        });

    match result {
        Ok(exit_code) => exit_code,
        Err(AppError::CliUsage(error)) => {
            let _ = write!(stderr, "{error}");
            ExitCode::FAILURE
        }
        Err(error) => {
            let _ = writeln!(stderr, "{error}");
            ExitCode::FAILURE
        }
    }
}

/// Runs one query command through the dispatcher.
///
/// The blocking exchange is hosted on the caller bridge's worker; this
/// (interactive) thread only awaits the pending reply and renders it.
fn execute_query<W, E>(
    command: &CliCommand,
    dispatcher: &Dispatcher,
    stdout: &mut W,
    stderr: &mut E,
) -> Result<ExitCode, AppError>
where
    W: Write,
    E: Write,
{
    match command {
        CliCommand::Status { json } => {
            let response = dispatcher.submit(Command::GetPermStatus, None).wait();
            match response {
                Response::Records(records) => {
                    if *json {
                        render::write_records_json(stdout, &records)
                            .map_err(AppError::SerialiseRecords)?;
                        writeln!(stdout).map_err(AppError::WriteOutput)?;
                    } else {
                        render::write_records(stdout, dispatcher.identity(), &records)
                            .map_err(AppError::WriteOutput)?;
                    }
                    Ok(ExitCode::SUCCESS)
                }
                other => fail_query(other, stderr),
            }
        }
        CliCommand::AppOps => {
            let response = dispatcher.submit(Command::GetAppOpStatus, None).wait();
            match response {
                Response::Integer(value) => match AppOpsMask::from_reply(value) {
                    Ok(mask) => {
                        render::write_mask(stdout, mask).map_err(AppError::WriteOutput)?;
                        Ok(ExitCode::SUCCESS)
                    }
                    Err(_) => fail_query(Response::Failure(FailureKind::Protocol), stderr),
                },
                other => fail_query(other, stderr),
            }
        }
        CliCommand::DumpHeap { tag } => {
            let response = dispatcher.submit(Command::DumpHeap, *tag).wait();
            match response {
                Response::Empty => {
                    writeln!(stdout, "heap dump written to the daemon runtime directory")
                        .map_err(AppError::WriteOutput)?;
                    Ok(ExitCode::SUCCESS)
                }
                other => fail_query(other, stderr),
            }
        }
        CliCommand::Daemon { .. } => {
            // Lifecycle commands never reach this path.
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Renders a failed or mis-shaped response and maps it to an exit code.
fn fail_query<E: Write>(response: Response, stderr: &mut E) -> Result<ExitCode, AppError> {
    let kind = match response {
        Response::Failure(kind) => kind,
        // A success of the wrong shape counts as "did not succeed".
        _ => FailureKind::Protocol,
    };
    writeln!(stderr, "{}", render::failure_message(kind)).map_err(AppError::WriteOutput)?;
    Ok(ExitCode::FAILURE)
}

#[cfg(test)]
mod tests {
    use privstat_config::Config;

    use crate::fake_daemon::FakeDaemon;

    use super::*;

    /// `ExitCode` has no `PartialEq`; compare through its debug rendering.
    fn assert_code(actual: ExitCode, expected: ExitCode) {
        assert_eq!(format!("{actual:?}"), format!("{expected:?}"));
    }

    struct StaticConfigLoader(Config);

    impl ConfigLoader for StaticConfigLoader {
        fn load(&self, _args: &[OsString]) -> Result<Config, AppError> {
            Ok(self.0.clone())
        }
    }

    fn run_cli(daemon: &FakeDaemon, tokens: &[&str]) -> (ExitCode, String, String) {
        let config = Config {
            daemon_socket: daemon.endpoint(),
            request_timeout_ms: 500,
            ..Config::default()
        };
        let args: Vec<OsString> = tokens.iter().map(OsString::from).collect();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = run_with_loader(args, &mut stdout, &mut stderr, &StaticConfigLoader(config));
        (
            code,
            String::from_utf8(stdout).expect("utf8 stdout"),
            String::from_utf8(stderr).expect("utf8 stderr"),
        )
    }

    #[test]
    fn status_command_renders_records_with_identity() {
        let daemon = FakeDaemon::spawn().euid(0).start();
        let (code, stdout, _stderr) = run_cli(&daemon, &["privstat", "status"]);
        assert_code(code, ExitCode::SUCCESS);
        assert!(stdout.contains("daemon uid: 0"));
        assert!(stdout.contains("org.example.mail"));
    }

    #[test]
    fn app_ops_command_tests_flags_by_name() {
        let daemon = FakeDaemon::spawn().mask(0b1011).start();
        let (code, stdout, _stderr) = run_cli(&daemon, &["privstat", "app-ops"]);
        assert_code(code, ExitCode::SUCCESS);
        assert!(stdout.contains("op-to-switch\tyes"));
        assert!(stdout.contains("op-to-name\tno"));
    }

    #[test]
    fn dump_heap_command_acknowledges() {
        let daemon = FakeDaemon::spawn().start();
        let (code, stdout, _stderr) =
            run_cli(&daemon, &["privstat", "dump-heap", "--tag", "9"]);
        assert_code(code, ExitCode::SUCCESS);
        assert!(stdout.contains("heap dump"));
        assert_eq!(
            daemon.received_opcodes(),
            vec![Command::DumpHeap.opcode()]
        );
    }

    #[test]
    fn failure_renders_unavailable_message() {
        let daemon = FakeDaemon::spawn().drop_after_handshake().start();
        let (code, _stdout, stderr) = run_cli(&daemon, &["privstat", "status"]);
        assert_code(code, ExitCode::FAILURE);
        assert!(stderr.contains("daemon"));
        assert!(!stderr.contains("opcode"));
    }

    #[test]
    fn wrong_shape_is_treated_as_not_succeeded() {
        let daemon = FakeDaemon::spawn().always_integer().start();
        let (code, _stdout, stderr) = run_cli(&daemon, &["privstat", "status"]);
        assert_code(code, ExitCode::FAILURE);
        assert!(stderr.contains("failed"));
    }
}
