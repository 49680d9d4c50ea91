//! End-to-end exercise of the daemon serving loop.
//!
//! Boots the real launch sequence on a Unix socket in a temporary runtime
//! directory, speaks the wire protocol as a raw client, and shuts the
//! daemon down in-band.

#![cfg(unix)]

use std::ffi::OsString;
use std::io;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use privstat_protocol::{Command, Hello, Reply, ReplyKind, RequestFrame};

fn connect_with_retry(path: &Path) -> UnixStream {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        match UnixStream::connect(path) {
            Ok(stream) => return stream,
            Err(error) if Instant::now() >= deadline => {
                panic!("daemon socket never came up: {error}")
            }
            Err(_) => thread::sleep(Duration::from_millis(25)),
        }
    }
}

#[test]
fn daemon_serves_requests_and_shuts_down_over_the_wire() -> io::Result<()> {
    // Keep the daemon attached; forking inside the test harness would orphan
    // the assertions.
    // SAFETY: this is the only test in the binary touching the environment.
    unsafe { std::env::set_var("PRIVSTATD_FOREGROUND", "1") };

    let dir = tempfile::tempdir()?;
    let socket = dir.path().join("privstatd.sock");
    std::fs::write(
        dir.path().join("policy.json"),
        br#"[{"package":"org.example","permission":"net.inet","state":"granted","overridden":false}]"#,
    )?;

    let endpoint = format!("unix://{}", socket.display());
    let args: Vec<OsString> = ["privstatd", "--daemon-socket", endpoint.as_str()]
        .into_iter()
        .map(OsString::from)
        .collect();
    let server = thread::spawn(move || privstatd::run_daemon_from(args));

    let mut stream = connect_with_retry(&socket);
    let hello = Hello::read_from(&mut stream).expect("handshake");
    assert_eq!(hello.version, privstat_protocol::PROTOCOL_VERSION);

    RequestFrame::for_command(Command::GetPermStatus, None)
        .write_to(&mut stream)
        .expect("send status request");
    let Reply::Records(records) = Reply::read_from(&mut stream).expect("status reply") else {
        panic!("expected records reply");
    };
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].package, "org.example");

    RequestFrame::for_command(Command::GetAppOpStatus, None)
        .write_to(&mut stream)
        .expect("send app-ops request");
    let reply = Reply::read_from(&mut stream).expect("app-ops reply");
    assert_eq!(reply.kind(), ReplyKind::Integer);

    RequestFrame::for_command(Command::DumpHeap, Some(5))
        .write_to(&mut stream)
        .expect("send dump request");
    assert_eq!(
        Reply::read_from(&mut stream).expect("dump reply"),
        Reply::Empty
    );
    assert!(dir.path().join("dumps").join("heap-5.txt").exists());

    RequestFrame::for_command(Command::Shutdown, None)
        .write_to(&mut stream)
        .expect("send shutdown request");
    assert_eq!(
        Reply::read_from(&mut stream).expect("shutdown reply"),
        Reply::Empty
    );

    server
        .join()
        .expect("daemon thread")
        .expect("daemon exits cleanly");
    assert!(!dir.path().join("privstatd.pid").exists());
    assert!(!dir.path().join("privstatd.health").exists());
    Ok(())
}
