//! In-process daemon double for client tests.
//!
//! Speaks the real wire protocol over a loopback TCP listener and records
//! what it saw, so session and dispatcher tests can assert on transmitted
//! frame order and exercise failure modes a healthy daemon never shows.

use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use privstat_config::SocketEndpoint;
use privstat_protocol::{Command, Hello, PermState, PermStatus, Reply, RequestFrame, fault};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behaviour {
    /// Answer every request with its canonical reply.
    Normal,
    /// Accept requests but never reply.
    Silent,
    /// Close the connection right after the handshake.
    DropAfterHandshake,
    /// Answer every request with an integer reply, whatever was asked.
    AlwaysInteger,
}

pub(crate) struct FakeDaemonBuilder {
    euid: u32,
    mask: i64,
    records: Vec<PermStatus>,
    behaviour: Behaviour,
    reply_delay: Duration,
}

impl FakeDaemonBuilder {
    pub(crate) fn euid(mut self, euid: u32) -> Self {
        self.euid = euid;
        self
    }

    pub(crate) fn mask(mut self, mask: i64) -> Self {
        self.mask = mask;
        self
    }

    pub(crate) fn records(mut self, records: Vec<PermStatus>) -> Self {
        self.records = records;
        self
    }

    pub(crate) fn silent(mut self) -> Self {
        self.behaviour = Behaviour::Silent;
        self
    }

    pub(crate) fn drop_after_handshake(mut self) -> Self {
        self.behaviour = Behaviour::DropAfterHandshake;
        self
    }

    pub(crate) fn always_integer(mut self) -> Self {
        self.behaviour = Behaviour::AlwaysInteger;
        self
    }

    pub(crate) fn reply_delay(mut self, delay: Duration) -> Self {
        self.reply_delay = delay;
        self
    }

    pub(crate) fn start(self) -> FakeDaemon {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind fake daemon");
        let addr = listener.local_addr().expect("fake daemon address");
        let accepted = Arc::new(AtomicUsize::new(0));
        let opcodes = Arc::new(Mutex::new(Vec::new()));

        let daemon = FakeDaemon {
            endpoint: SocketEndpoint::tcp(addr.ip().to_string(), addr.port()),
            accepted: Arc::clone(&accepted),
            opcodes: Arc::clone(&opcodes),
        };

        let script = ConnectionScript {
            euid: self.euid,
            mask: self.mask,
            records: self.records,
            behaviour: self.behaviour,
            reply_delay: self.reply_delay,
        };
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                accepted.fetch_add(1, Ordering::SeqCst);
                let script = script.clone();
                let opcodes = Arc::clone(&opcodes);
                thread::spawn(move || script.drive(stream, &opcodes));
            }
        });
        daemon
    }
}

#[derive(Clone)]
struct ConnectionScript {
    euid: u32,
    mask: i64,
    records: Vec<PermStatus>,
    behaviour: Behaviour,
    reply_delay: Duration,
}

impl ConnectionScript {
    fn drive(&self, mut stream: TcpStream, opcodes: &Mutex<Vec<i32>>) {
        if Hello::new(self.euid).write_to(&mut stream).is_err() {
            return;
        }
        if self.behaviour == Behaviour::DropAfterHandshake {
            return;
        }
        loop {
            let frame = match RequestFrame::read_from(&mut stream) {
                Ok(frame) => frame,
                Err(_) => return,
            };
            opcodes.lock().expect("opcode log").push(frame.opcode);
            if self.behaviour == Behaviour::Silent {
                continue;
            }
            if !self.reply_delay.is_zero() {
                thread::sleep(self.reply_delay);
            }
            let reply = self.reply_for(frame.opcode);
            if reply.write_to(&mut stream).is_err() {
                return;
            }
        }
    }

    fn reply_for(&self, opcode: i32) -> Reply {
        if self.behaviour == Behaviour::AlwaysInteger {
            return Reply::Integer(self.mask);
        }
        match Command::from_opcode(opcode) {
            Some(Command::GetPermStatus) => Reply::Records(self.records.clone()),
            Some(Command::GetAppOpStatus) => Reply::Integer(self.mask),
            Some(Command::DumpHeap | Command::Shutdown) => Reply::Empty,
            None => Reply::failure(fault::UNKNOWN_OPCODE, format!("unknown opcode {opcode}")),
        }
    }
}

/// Handle to a running fake daemon. The listener thread lives until the
/// test process exits; tests only ever need its endpoint and its logs.
pub(crate) struct FakeDaemon {
    endpoint: SocketEndpoint,
    accepted: Arc<AtomicUsize>,
    opcodes: Arc<Mutex<Vec<i32>>>,
}

impl FakeDaemon {
    pub(crate) fn spawn() -> FakeDaemonBuilder {
        FakeDaemonBuilder {
            euid: 0,
            mask: 0b1111,
            records: sample_records(),
            behaviour: Behaviour::Normal,
            reply_delay: Duration::ZERO,
        }
    }

    pub(crate) fn endpoint(&self) -> SocketEndpoint {
        self.endpoint.clone()
    }

    pub(crate) fn accepted_connections(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub(crate) fn received_opcodes(&self) -> Vec<i32> {
        self.opcodes.lock().expect("opcode log").clone()
    }

    /// Polls until the daemon has seen `count` frames or the deadline lapses.
    pub(crate) fn wait_for_frames(&self, count: usize, deadline: Duration) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < deadline {
            if self.received_opcodes().len() >= count {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }
}

pub(crate) fn sample_records() -> Vec<PermStatus> {
    vec![
        PermStatus {
            package: "org.example.mail".into(),
            permission: "net.inet.raw".into(),
            state: PermState::Granted,
            overridden: false,
        },
        PermStatus {
            package: "org.example.camera".into(),
            permission: "device.camera".into(),
            state: PermState::Denied,
            overridden: true,
        },
        PermStatus {
            package: "org.example.widget".into(),
            permission: "device.camera".into(),
            state: PermState::NotApplicable,
            overridden: false,
        },
    ]
}

/// Smoke check: the double itself must speak the protocol correctly.
#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    #[test]
    fn fake_daemon_answers_a_raw_client() {
        let daemon = FakeDaemon::spawn().euid(42).mask(0b1011).start();
        let SocketEndpoint::Tcp { host, port } = daemon.endpoint() else {
            panic!("fake daemon is TCP");
        };
        let mut stream = TcpStream::connect((host.as_str(), port)).expect("connect");
        let hello = Hello::read_from(&mut stream).expect("hello");
        assert_eq!(hello.euid, 42);

        RequestFrame::for_command(Command::GetAppOpStatus, None)
            .write_to(&mut stream)
            .expect("send request");
        let reply = Reply::read_from(&mut stream).expect("reply");
        assert_eq!(reply, Reply::Integer(0b1011));
        assert_eq!(daemon.received_opcodes(), vec![2]);
    }

    #[test]
    fn dropped_connection_reads_back_eof() {
        let daemon = FakeDaemon::spawn().drop_after_handshake().start();
        let SocketEndpoint::Tcp { host, port } = daemon.endpoint() else {
            panic!("fake daemon is TCP");
        };
        let mut stream = TcpStream::connect((host.as_str(), port)).expect("connect");
        let _hello = Hello::read_from(&mut stream).expect("hello");
        let mut rest = Vec::new();
        let read = stream.read_to_end(&mut rest);
        assert!(matches!(read, Ok(0)) || read.is_err());
    }
}
