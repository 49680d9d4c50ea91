//! Integration tests for the `privstat` binary entry point.
//!
//! Verifies argument handling and the user-facing failure path when no
//! daemon is listening.

use anyhow::Result;
use assert_cmd::Command;
use predicates::str::contains;

fn privstat() -> Command {
    Command::cargo_bin("privstat").expect("binary built")
}

#[test]
fn bare_invocation_prints_usage() {
    privstat().assert().failure().stderr(contains("Usage"));
}

#[test]
fn unknown_subcommand_fails_with_usage_error() {
    privstat()
        .arg("frobnicate")
        .assert()
        .failure()
        .stderr(contains("frobnicate"));
}

#[test]
fn status_without_daemon_reports_unavailable() {
    privstat()
        .args([
            "--daemon-socket",
            "tcp://127.0.0.1:1",
            "--request-timeout-ms",
            "500",
            "status",
        ])
        .assert()
        .failure()
        .stderr(contains("daemon is not available"));
}

#[test]
fn daemon_status_without_artefacts_reports_not_running() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let socket = dir.path().join("absent").join("privstatd.sock");
    let endpoint = format!("unix://{}", socket.display());
    privstat()
        .args(["--daemon-socket", &endpoint, "daemon", "status"])
        .assert()
        .success()
        .stdout(contains("daemon is not running"));
    Ok(())
}
