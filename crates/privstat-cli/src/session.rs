//! Privileged daemon session management.
//!
//! A [`DaemonSession`] owns the single channel to `privstatd`: connection
//! establishment with a deadline, the hello handshake that fixes the daemon
//! identity for the session, framed round trips, and the state machine that
//! gates every exchange. Nothing else in the client touches the transport;
//! the dispatcher funnels all access through one session instance.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use privstat_config::SocketEndpoint;
use privstat_protocol::{Hello, ProtocolError, Reply, RequestFrame};
use thiserror::Error;
use tracing::debug;

#[cfg(unix)]
use socket2::{Domain, SockAddr, Socket, Type};
#[cfg(unix)]
use std::os::unix::net::UnixStream;

/// Tracing target for session events.
const SESSION_TARGET: &str = "privstat::session";

pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Identity of the connected daemon, fixed for the session's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonIdentity {
    /// Effective uid the daemon runs under.
    pub euid: u32,
}

/// Lifecycle of the privileged channel.
///
/// `Dead` is terminal until a fresh [`DaemonSession::connect`] establishes a
/// new channel; requests must never be issued to a non-`Alive` session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection has been attempted yet.
    Disconnected,
    /// A connection attempt is in progress.
    Connecting,
    /// The handshake completed; requests may flow.
    Alive,
    /// The channel failed or was torn down.
    Dead,
}

impl SessionState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Alive => 2,
            Self::Dead => 3,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Alive,
            3 => Self::Dead,
            _ => Self::Disconnected,
        }
    }
}

/// Lock-free view of the session state.
///
/// `is_alive` is a UI-affordance check and must answer instantly even while
/// a request blocks on the session, so the state lives in an atomic the
/// session updates on every transition.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(SessionState::Disconnected.as_u8()))
    }

    fn set(&self, state: SessionState) {
        self.0.store(state.as_u8(), Ordering::SeqCst);
    }

    pub(crate) fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.get() == SessionState::Alive
    }
}

/// Errors raised on the privileged channel.
#[derive(Debug, Error)]
pub enum SessionError {
    /// An operation required an alive session and none exists.
    #[error("no daemon session is alive")]
    NotConnected,
    /// Establishing the channel failed.
    #[error("failed to connect to daemon at {endpoint}: {source}")]
    Connect {
        /// Endpoint that was dialled.
        endpoint: String,
        /// Underlying connection error.
        #[source]
        source: io::Error,
    },
    /// The handshake was malformed or from an incompatible daemon.
    #[error("daemon handshake failed: {0}")]
    Handshake(ProtocolError),
    /// The channel failed mid-exchange; the session is now dead.
    #[error("daemon channel failed: {0}")]
    Transport(io::Error),
    /// The daemon produced bytes the protocol does not permit.
    #[error("daemon reply violated the protocol: {0}")]
    Protocol(ProtocolError),
    /// No reply arrived within the configured deadline.
    #[error("daemon did not reply within {timeout_ms} ms")]
    Timeout {
        /// Deadline that expired.
        timeout_ms: u64,
    },
    #[cfg(not(unix))]
    /// Unix socket endpoints cannot be dialled on this platform.
    #[error("platform does not support Unix sockets: {0}")]
    UnsupportedUnixTransport(String),
}

enum Connection {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Connection {
    fn set_read_timeout(&self, timeout: Duration) -> io::Result<()> {
        let timeout = Some(timeout);
        match self {
            Self::Tcp(stream) => stream.set_read_timeout(timeout),
            #[cfg(unix)]
            Self::Unix(stream) => stream.set_read_timeout(timeout),
        }
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Self::Unix(stream) => stream.flush(),
        }
    }
}

/// The single channel to the privileged daemon.
pub struct DaemonSession {
    endpoint: SocketEndpoint,
    reply_timeout: Duration,
    state: Arc<StateCell>,
    connection: Option<Connection>,
    identity: Option<DaemonIdentity>,
}

impl DaemonSession {
    /// Builds a session for the given endpoint. No connection is attempted.
    #[must_use]
    pub fn new(endpoint: SocketEndpoint, reply_timeout: Duration) -> Self {
        Self {
            endpoint,
            reply_timeout,
            state: Arc::new(StateCell::new()),
            connection: None,
            identity: None,
        }
    }

    /// Shared handle to the state cell, for non-blocking liveness checks.
    pub(crate) fn state_cell(&self) -> Arc<StateCell> {
        Arc::clone(&self.state)
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Whether the session is alive. Never attempts a connection.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.state.is_alive()
    }

    /// Identity captured during the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] unless the session is alive.
    pub fn identity(&self) -> Result<DaemonIdentity, SessionError> {
        if !self.is_alive() {
            return Err(SessionError::NotConnected);
        }
        self.identity.ok_or(SessionError::NotConnected)
    }

    /// Establishes the channel and performs the handshake.
    ///
    /// Idempotent: connecting an alive session is a no-op. From any other
    /// state a fresh channel is dialled; failure leaves the session dead.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Connect`] when the endpoint cannot be
    /// reached, [`SessionError::Handshake`] when the daemon is incompatible,
    /// and timeout/transport variants when the handshake stalls.
    pub fn connect(&mut self) -> Result<(), SessionError> {
        if self.is_alive() {
            return Ok(());
        }
        self.state.set(SessionState::Connecting);
        self.connection = None;
        self.identity = None;

        let connection = match open_stream(&self.endpoint, self.reply_timeout) {
            Ok(connection) => connection,
            Err(error) => {
                self.state.set(SessionState::Dead);
                return Err(error);
            }
        };

        let mut connection = connection;
        let hello = match Hello::read_from(&mut connection) {
            Ok(hello) => hello,
            Err(error) => {
                self.state.set(SessionState::Dead);
                return Err(classify_handshake(error, self.reply_timeout));
            }
        };

        debug!(
            target: SESSION_TARGET,
            endpoint = %self.endpoint,
            euid = hello.euid,
            version = hello.version,
            "daemon session established"
        );
        self.identity = Some(DaemonIdentity { euid: hello.euid });
        self.connection = Some(connection);
        self.state.set(SessionState::Alive);
        Ok(())
    }

    /// Performs one blocking request/reply exchange.
    ///
    /// Returns whatever structurally valid reply arrived; checking the reply
    /// kind against the opcode is the dispatcher's job, so a well-formed
    /// reply of the wrong shape does not disturb the session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] when no session is alive.
    /// Transport failures, deadline expiry, and undecodable replies force
    /// the session dead and surface as their respective variants.
    pub fn round_trip(&mut self, request: &RequestFrame) -> Result<Reply, SessionError> {
        if !self.is_alive() {
            return Err(SessionError::NotConnected);
        }

        let write_result = match self.connection.as_mut() {
            Some(connection) => request.write_to(connection),
            None => return Err(SessionError::NotConnected),
        };
        if let Err(error) = write_result {
            return Err(self.fail(error));
        }

        let read_result = match self.connection.as_mut() {
            Some(connection) => Reply::read_from(connection),
            None => return Err(SessionError::NotConnected),
        };
        match read_result {
            Ok(reply) => Ok(reply),
            Err(error) => Err(self.fail(error)),
        }
    }

    /// Tears the session down explicitly.
    pub fn shutdown(&mut self) {
        self.connection = None;
        self.identity = None;
        self.state.set(SessionState::Dead);
    }

    /// Marks the session dead and translates the codec error.
    fn fail(&mut self, error: ProtocolError) -> SessionError {
        self.connection = None;
        self.identity = None;
        self.state.set(SessionState::Dead);
        match error {
            ProtocolError::Io(source) if is_timeout(&source) => SessionError::Timeout {
                timeout_ms: duration_millis(self.reply_timeout),
            },
            ProtocolError::Io(source) => SessionError::Transport(source),
            other => SessionError::Protocol(other),
        }
    }
}

fn classify_handshake(error: ProtocolError, timeout: Duration) -> SessionError {
    match error {
        ProtocolError::Io(source) if is_timeout(&source) => SessionError::Timeout {
            timeout_ms: duration_millis(timeout),
        },
        other => SessionError::Handshake(other),
    }
}

fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn open_stream(
    endpoint: &SocketEndpoint,
    reply_timeout: Duration,
) -> Result<Connection, SessionError> {
    let connection = match endpoint {
        SocketEndpoint::Tcp { host, port } => {
            let address =
                resolve_tcp_address(host, *port).map_err(|source| SessionError::Connect {
                    endpoint: endpoint.to_string(),
                    source,
                })?;
            TcpStream::connect_timeout(&address, CONNECT_TIMEOUT)
                .map(Connection::Tcp)
                .map_err(|source| SessionError::Connect {
                    endpoint: endpoint.to_string(),
                    source,
                })?
        }
        SocketEndpoint::Unix { path } => {
            #[cfg(unix)]
            {
                connect_unix(path.as_str()).map_err(|source| SessionError::Connect {
                    endpoint: endpoint.to_string(),
                    source,
                })?
            }

            #[cfg(not(unix))]
            {
                return Err(SessionError::UnsupportedUnixTransport(endpoint.to_string()));
            }
        }
    };
    connection
        .set_read_timeout(reply_timeout)
        .map_err(|source| SessionError::Connect {
            endpoint: endpoint.to_string(),
            source,
        })?;
    Ok(connection)
}

fn resolve_tcp_address(host: &str, port: u16) -> io::Result<SocketAddr> {
    let mut addrs = (host, port).to_socket_addrs()?;
    addrs
        .find(|addr| matches!(addr, SocketAddr::V4(_) | SocketAddr::V6(_)))
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved addresses"))
}

#[cfg(unix)]
fn connect_unix(path: &str) -> io::Result<Connection> {
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    let address = SockAddr::unix(path)?;
    socket.connect_timeout(&address, CONNECT_TIMEOUT)?;
    let stream = UnixStream::from(std::os::fd::OwnedFd::from(socket));
    Ok(Connection::Unix(stream))
}
