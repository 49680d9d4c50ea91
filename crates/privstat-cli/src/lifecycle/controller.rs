//! High-level orchestration for daemon lifecycle commands.
//!
//! Wires the start/stop/status flows together so the CLI runtime drives a
//! single entrypoint when managing `privstatd`.

use std::io::Write;
use std::process::ExitCode;
use std::time::{Duration, SystemTime};

use privstat_config::RuntimePaths;

use super::error::LifecycleError;
use super::monitoring::{read_health, read_pid, wait_for_ready};
use super::shutdown::{signal_daemon, wait_for_shutdown};
use super::socket::{ensure_socket_available, socket_is_reachable};
use super::spawning::spawn_daemon;
use super::{LifecycleCommand, LifecycleContext, LifecycleOutput};

const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Production lifecycle controller.
#[derive(Debug, Default)]
pub(crate) struct SystemLifecycle;

impl SystemLifecycle {
    pub(crate) fn handle<W: Write, E: Write>(
        &mut self,
        command: LifecycleCommand,
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        match command {
            LifecycleCommand::Start => self.start(context, output),
            LifecycleCommand::Stop => self.stop(context, output),
            LifecycleCommand::Status => self.status(context, output),
        }
    }

    fn start<W: Write, E: Write>(
        &mut self,
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        ensure_socket_available(context.config.daemon_socket())?;
        context.config.daemon_socket().prepare_filesystem()?;
        let paths = RuntimePaths::from_config(context.config)?;
        let mut child = spawn_daemon(context.config_arguments, context.config.launcher())?;
        let started_at = SystemTime::now();
        let snapshot = wait_for_ready(&paths, &mut child, started_at, STARTUP_TIMEOUT)?;
        output.stdout_line(format_args!(
            "daemon ready (pid {}) on {}",
            snapshot.pid,
            context.config.daemon_socket()
        ))?;
        output.stderr_line(format_args!(
            "runtime artefacts stored under {}",
            paths.runtime_dir().display()
        ))?;
        Ok(ExitCode::SUCCESS)
    }

    fn stop<W: Write, E: Write>(
        &mut self,
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        let paths = RuntimePaths::from_config_readonly(context.config)?;
        let Some(pid) = read_pid(paths.pid_path())? else {
            if socket_is_reachable(context.config.daemon_socket())? {
                return Err(LifecycleError::MissingPidWithSocket {
                    path: paths.pid_path().to_path_buf(),
                    endpoint: context.config.daemon_socket().to_string(),
                });
            }
            output.stdout_line(format_args!(
                "daemon is not running (pid file missing at {})",
                paths.pid_path().display()
            ))?;
            return Ok(ExitCode::SUCCESS);
        };
        signal_daemon(pid)?;
        wait_for_shutdown(&paths, context.config.daemon_socket())?;
        output.stdout_line(format_args!("daemon pid {pid} stopped cleanly"))?;
        Ok(ExitCode::SUCCESS)
    }

    fn status<W: Write, E: Write>(
        &mut self,
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        let paths = RuntimePaths::from_config_readonly(context.config)?;
        if !paths.runtime_dir().exists() {
            output.stdout_line(format_args!(
                "daemon is not running; use 'privstat daemon start' to launch it"
            ))?;
            return Ok(ExitCode::SUCCESS);
        }
        if let Some(snapshot) = read_health(paths.health_path())? {
            output.stdout_line(format_args!(
                "daemon status: {} (pid {}) via {}",
                snapshot.status,
                snapshot.pid,
                context.config.daemon_socket()
            ))?;
            return Ok(ExitCode::SUCCESS);
        }
        let reachable = socket_is_reachable(context.config.daemon_socket())?;
        match read_pid(paths.pid_path())? {
            Some(pid) => {
                output.stdout_line(format_args!(
                    "daemon recorded pid {pid} but health snapshot is missing; check {}",
                    paths.health_path().display()
                ))?;
            }
            None if reachable => {
                output.stdout_line(format_args!(
                    "daemon socket {} is listening but runtime files are missing; consider 'privstat daemon stop' or removing {}",
                    context.config.daemon_socket(),
                    paths.runtime_dir().display()
                ))?;
            }
            None => {
                output.stdout_line(format_args!(
                    "daemon is not running; use 'privstat daemon start' to launch it"
                ))?;
            }
        }
        Ok(ExitCode::SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;
    use std::fs;

    use privstat_config::{Config, SocketEndpoint};

    use super::*;

    fn context_for(config: &Config) -> LifecycleContext<'_> {
        LifecycleContext {
            config,
            config_arguments: &[],
        }
    }

    fn run(
        command: LifecycleCommand,
        config: &Config,
    ) -> (Result<ExitCode, LifecycleError>, String) {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let result = {
            let mut output = LifecycleOutput::new(&mut stdout, &mut stderr);
            SystemLifecycle.handle(command, context_for(config), &mut output)
        };
        (result, String::from_utf8(stdout).expect("utf8 stdout"))
    }

    fn config_in(dir: &std::path::Path) -> Config {
        let socket = dir.join("privstatd.sock");
        Config {
            daemon_socket: SocketEndpoint::unix(socket.to_str().expect("utf8 path")),
            ..Config::default()
        }
    }

    #[test]
    fn status_reports_not_running_without_artefacts() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = config_in(&dir.path().join("absent"));
        let (result, stdout) = run(LifecycleCommand::Status, &config);
        assert!(result.is_ok());
        assert!(stdout.contains("daemon is not running"));
    }

    #[test]
    fn status_prefers_the_health_snapshot() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = config_in(dir.path());
        fs::write(
            dir.path().join("privstatd.health"),
            br#"{"status":"ready","pid":311,"timestamp":1}"#,
        )
        .expect("write health");
        let (result, stdout) = run(LifecycleCommand::Status, &config);
        assert!(result.is_ok());
        assert!(stdout.contains("daemon status: ready (pid 311)"));
    }

    #[test]
    fn status_flags_pid_without_health() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = config_in(dir.path());
        fs::write(dir.path().join("privstatd.pid"), b"311\n").expect("write pid");
        let (result, stdout) = run(LifecycleCommand::Status, &config);
        assert!(result.is_ok());
        assert!(stdout.contains("health snapshot is missing"));
    }

    #[test]
    fn stop_without_artefacts_succeeds_quietly() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = config_in(dir.path());
        let (result, stdout) = run(LifecycleCommand::Stop, &config);
        assert!(result.is_ok());
        assert!(stdout.contains("daemon is not running"));
    }

    #[test]
    fn start_refuses_a_busy_socket() {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let addr = listener.local_addr().expect("addr");
        let config = Config {
            daemon_socket: SocketEndpoint::tcp(addr.ip().to_string(), addr.port()),
            ..Config::default()
        };
        let arguments: Vec<OsString> = Vec::new();
        let context = LifecycleContext {
            config: &config,
            config_arguments: &arguments,
        };
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut output = LifecycleOutput::new(&mut stdout, &mut stderr);
        let error = SystemLifecycle
            .handle(LifecycleCommand::Start, context, &mut output)
            .expect_err("socket busy");
        assert!(matches!(error, LifecycleError::SocketInUse { .. }));
    }
}
