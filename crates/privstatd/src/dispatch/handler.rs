//! Connection handler driving one client session.

use std::io;

use privstat_protocol::{Command, Hello, ProtocolError, Reply, RequestFrame, fault};
use tracing::{debug, warn};

use crate::transport::{ConnectionHandler, ConnectionStream};

use super::router::{DISPATCH_TARGET, Router};

/// Serves the handshake and the request loop for each connection.
pub(crate) struct SessionConnectionHandler {
    router: Router,
    euid: u32,
}

impl SessionConnectionHandler {
    pub(crate) fn new(router: Router, euid: u32) -> Self {
        Self { router, euid }
    }

    fn serve(&self, stream: &mut ConnectionStream) {
        if let Err(error) = Hello::new(self.euid).write_to(stream) {
            warn!(target: DISPATCH_TARGET, %error, "handshake write failed");
            return;
        }

        loop {
            let frame = match RequestFrame::read_from(stream) {
                Ok(frame) => frame,
                Err(ProtocolError::Io(error)) if is_disconnect(&error) => {
                    debug!(target: DISPATCH_TARGET, "client disconnected");
                    return;
                }
                Err(error) => {
                    warn!(target: DISPATCH_TARGET, %error, "request read failed");
                    return;
                }
            };

            let command = Command::from_opcode(frame.opcode);
            let reply = match command {
                Some(command) => self.router.dispatch(command, frame.argument),
                None => {
                    // Requests are fixed-width, so the stream is still in
                    // sync; reject the opcode and keep the session.
                    warn!(
                        target: DISPATCH_TARGET,
                        opcode = frame.opcode,
                        "unknown opcode rejected"
                    );
                    Reply::failure(
                        fault::UNKNOWN_OPCODE,
                        format!("unknown opcode {}", frame.opcode),
                    )
                }
            };

            if let Err(error) = reply.write_to(stream) {
                warn!(target: DISPATCH_TARGET, %error, "reply write failed");
                return;
            }

            if matches!(command, Some(Command::Shutdown)) {
                debug!(target: DISPATCH_TARGET, "closing session after shutdown");
                return;
            }
        }
    }
}

impl ConnectionHandler for SessionConnectionHandler {
    fn handle(&self, mut stream: ConnectionStream) {
        self.serve(&mut stream);
    }
}

fn is_disconnect(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::BrokenPipe
    )
}

#[cfg(test)]
mod tests {
    use std::net::{TcpListener, TcpStream};
    use std::sync::Arc;
    use std::thread;

    use privstat_protocol::{PermState, PermStatus, ReplyKind};

    use crate::heap::HeapDumper;
    use crate::ops::OpTable;
    use crate::policy::{ProviderError, StatusProvider};
    use crate::process::ShutdownFlag;

    use super::*;

    struct StaticProvider(Vec<PermStatus>);

    impl StatusProvider for StaticProvider {
        fn perm_statuses(&self) -> Result<Vec<PermStatus>, ProviderError> {
            Ok(self.0.clone())
        }
    }

    fn sample_records() -> Vec<PermStatus> {
        vec![PermStatus {
            package: "org.example".into(),
            permission: "net.inet".into(),
            state: PermState::Granted,
            overridden: false,
        }]
    }

    /// Client/server pair with the handler running on a real socket.
    struct Harness {
        client: TcpStream,
        server: thread::JoinHandle<()>,
        shutdown: ShutdownFlag,
        _dir: tempfile::TempDir,
    }

    impl Harness {
        fn start(euid: u32) -> Self {
            let dir = tempfile::tempdir().expect("temp dir");
            let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
            let addr = listener.local_addr().expect("addr");
            let shutdown = ShutdownFlag::new();
            let router = Router::new(
                Arc::new(StaticProvider(sample_records())),
                OpTable::builtin(),
                HeapDumper::new(dir.path().join("dumps")),
                shutdown.clone(),
            );
            let server = thread::spawn(move || {
                let (stream, _) = listener.accept().expect("accept");
                SessionConnectionHandler::new(router, euid)
                    .handle(ConnectionStream::Tcp(stream));
            });
            let client = TcpStream::connect(addr).expect("connect");
            Self {
                client,
                server,
                shutdown,
                _dir: dir,
            }
        }

        fn handshake(&mut self) -> Hello {
            Hello::read_from(&mut self.client).expect("hello")
        }

        fn exchange(&mut self, frame: RequestFrame) -> Reply {
            frame.write_to(&mut self.client).expect("send request");
            Reply::read_from(&mut self.client).expect("read reply")
        }
    }

    #[test]
    fn handshake_reports_the_daemon_euid() {
        let mut harness = Harness::start(1000);
        let hello = harness.handshake();
        assert_eq!(hello.euid, 1000);
        drop(harness.client);
        harness.server.join().expect("server exits on disconnect");
    }

    #[test]
    fn session_serves_multiple_requests() {
        let mut harness = Harness::start(0);
        harness.handshake();

        let reply = harness.exchange(RequestFrame::for_command(Command::GetPermStatus, None));
        assert_eq!(reply, Reply::Records(sample_records()));

        let reply = harness.exchange(RequestFrame::for_command(Command::GetAppOpStatus, None));
        assert_eq!(reply.kind(), ReplyKind::Integer);

        drop(harness.client);
        harness.server.join().expect("server exits on disconnect");
    }

    #[test]
    fn unknown_opcode_gets_a_fault_and_keeps_the_session() {
        let mut harness = Harness::start(0);
        harness.handshake();

        let reply = harness.exchange(RequestFrame {
            opcode: 99,
            argument: None,
        });
        assert!(matches!(
            reply,
            Reply::Failure { code, .. } if code == fault::UNKNOWN_OPCODE
        ));

        // The stream is still usable afterwards.
        let reply = harness.exchange(RequestFrame::for_command(Command::GetAppOpStatus, None));
        assert_eq!(reply.kind(), ReplyKind::Integer);

        drop(harness.client);
        harness.server.join().expect("server exits on disconnect");
    }

    #[test]
    fn shutdown_acknowledges_then_closes_the_session() {
        let mut harness = Harness::start(0);
        harness.handshake();

        let reply = harness.exchange(RequestFrame::for_command(Command::Shutdown, None));
        assert_eq!(reply, Reply::Empty);
        assert!(harness.shutdown.is_raised());

        harness.server.join().expect("server closes the session");
    }
}
