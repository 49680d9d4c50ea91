//! Request dispatch for the privileged channel.
//!
//! Every daemon exchange funnels through [`Dispatcher::send_request`]. The
//! dispatcher owns the single [`DaemonSession`], serialises concurrent
//! callers in strict arrival order (the protocol has no request ids, so
//! out-of-order pipelining is not possible), reconnects a dead session on
//! demand, and maps every outcome — including its own failures — into a
//! [`Response`]. The call blocks until the daemon replies or the session
//! fails; hosting that blocking away from the interactive thread is the
//! caller bridge's job, not this module's.

use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use privstat_config::{Config, SocketEndpoint};
use privstat_protocol::{Command, PermStatus, Reply, RequestFrame};
use tracing::{debug, warn};

use crate::bridge::{ThreadBridge, WorkerBridge};
use crate::session::{DaemonIdentity, DaemonSession, SessionError, StateCell};

/// Tracing target for dispatch events.
const DISPATCH_TARGET: &str = "privstat::dispatch";

/// Typed outcome of one daemon exchange.
///
/// Callers know which shape their command produces and treat any other —
/// including [`Response::Failure`] — as "the operation did not succeed".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Permission status records.
    Records(Vec<PermStatus>),
    /// A single integer; for the app-ops query, the capability mask.
    Integer(i64),
    /// An acknowledgement without payload.
    Empty,
    /// The operation did not succeed.
    Failure(FailureKind),
}

impl Response {
    /// Whether the exchange failed.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }
}

/// Why an exchange failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No session could be established.
    NotConnected,
    /// The channel failed mid-exchange.
    Transport,
    /// The reply did not match what the opcode permits.
    Protocol,
    /// No reply arrived within the configured deadline.
    Timeout,
    /// The daemon reported a fault code.
    Daemon(u16),
}

/// Grants turns in strict arrival order.
///
/// A plain mutex makes no fairness promise, so under contention frames could
/// hit the wire out of arrival order. Tickets pin the order: each caller
/// draws the next number and waits until it is being served.
#[derive(Debug)]
struct TicketQueue {
    tickets: Mutex<Tickets>,
    turn: Condvar,
}

#[derive(Debug, Default)]
struct Tickets {
    next: u64,
    serving: u64,
}

impl TicketQueue {
    fn new() -> Self {
        Self {
            tickets: Mutex::new(Tickets::default()),
            turn: Condvar::new(),
        }
    }

    fn acquire(&self) -> TurnGuard<'_> {
        // A poisoned lock only means another caller panicked while holding
        // its turn; the counters themselves cannot be inconsistent.
        let mut tickets = self
            .tickets
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let ticket = tickets.next;
        tickets.next += 1;
        while tickets.serving != ticket {
            tickets = self
                .turn
                .wait(tickets)
                .unwrap_or_else(PoisonError::into_inner);
        }
        TurnGuard { queue: self }
    }
}

struct TurnGuard<'a> {
    queue: &'a TicketQueue,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        let mut tickets = self
            .queue
            .tickets
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        tickets.serving += 1;
        self.queue.turn.notify_all();
    }
}

struct Inner {
    queue: TicketQueue,
    session: Mutex<DaemonSession>,
    state: Arc<StateCell>,
    identity: Mutex<Option<DaemonIdentity>>,
    bridge: Box<dyn WorkerBridge>,
}

/// The sole entry point for daemon requests.
///
/// Cheap to clone; all clones share one session and one queue. Constructed
/// once at process start and passed to whatever issues requests — there is
/// deliberately no global instance.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Builds a dispatcher over a fresh, unconnected session.
    #[must_use]
    pub fn new(endpoint: SocketEndpoint, reply_timeout: Duration) -> Self {
        Self::with_bridge(endpoint, reply_timeout, Box::new(ThreadBridge))
    }

    /// Builds a dispatcher from the shared configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.daemon_socket().clone(), config.request_timeout())
    }

    /// Builds a dispatcher with an explicit caller bridge.
    #[must_use]
    pub fn with_bridge(
        endpoint: SocketEndpoint,
        reply_timeout: Duration,
        bridge: Box<dyn WorkerBridge>,
    ) -> Self {
        let session = DaemonSession::new(endpoint, reply_timeout);
        let state = session.state_cell();
        Self {
            inner: Arc::new(Inner {
                queue: TicketQueue::new(),
                session: Mutex::new(session),
                state,
                identity: Mutex::new(None),
                bridge,
            }),
        }
    }

    /// Whether the underlying session is alive.
    ///
    /// Never blocks and never attempts a connection, so it is safe to call
    /// from the interactive thread to gate UI affordances.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.inner.state.is_alive()
    }

    /// Identity of the connected daemon, when a session is alive.
    #[must_use]
    pub fn identity(&self) -> Option<DaemonIdentity> {
        if !self.is_alive() {
            return None;
        }
        *self
            .inner
            .identity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Performs one blocking daemon exchange.
    ///
    /// Always returns; every failure mode is folded into
    /// [`Response::Failure`]. Must not be invoked on a thread whose blocking
    /// would freeze user interaction — use [`Dispatcher::submit`] there.
    #[must_use]
    pub fn send_request(&self, command: Command, argument: Option<i64>) -> Response {
        let _turn = self.inner.queue.acquire();
        let mut session = self
            .inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if !session.is_alive() {
            if let Err(error) = session.connect() {
                debug!(
                    target: DISPATCH_TARGET,
                    command = %command,
                    %error,
                    "daemon connection failed"
                );
                self.store_identity(None);
                return Response::Failure(FailureKind::NotConnected);
            }
            self.store_identity(session.identity().ok());
        }

        let request = RequestFrame::for_command(command, argument);
        match session.round_trip(&request) {
            Ok(reply) => self.accept(command, reply),
            Err(error) => {
                warn!(
                    target: DISPATCH_TARGET,
                    command = %command,
                    %error,
                    "daemon exchange failed"
                );
                Response::Failure(failure_kind(&error))
            }
        }
    }

    /// Schedules the exchange on the caller bridge's background worker.
    ///
    /// The returned [`PendingReply`] is awaited wherever blocking is
    /// acceptable; the result is never delivered to a thread implicitly.
    #[must_use]
    pub fn submit(&self, command: Command, argument: Option<i64>) -> PendingReply {
        let (sender, receiver) = mpsc::channel();
        let dispatcher = self.clone();
        self.inner.bridge.run(Box::new(move || {
            let response = dispatcher.send_request(command, argument);
            // The receiver may have lost interest; that is not an error.
            let _ = sender.send(response);
        }));
        PendingReply { receiver }
    }

    /// Checks the reply shape against the catalogue and unwraps it.
    fn accept(&self, command: Command, reply: Reply) -> Response {
        if let Reply::Failure { code, message } = reply {
            warn!(
                target: DISPATCH_TARGET,
                command = %command,
                code,
                message = %message,
                "daemon reported a fault"
            );
            return Response::Failure(FailureKind::Daemon(code));
        }
        if reply.kind() != command.expected_reply() {
            warn!(
                target: DISPATCH_TARGET,
                command = %command,
                expected = %command.expected_reply(),
                received = %reply.kind(),
                "unexpected reply shape"
            );
            return Response::Failure(FailureKind::Protocol);
        }
        match reply {
            Reply::Records(records) => Response::Records(records),
            Reply::Integer(value) => Response::Integer(value),
            Reply::Empty => Response::Empty,
            // Failure was handled above; the kind check excludes it here.
            Reply::Failure { .. } => Response::Failure(FailureKind::Protocol),
        }
    }

    fn store_identity(&self, identity: Option<DaemonIdentity>) {
        *self
            .inner
            .identity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = identity;
    }
}

const fn failure_kind(error: &SessionError) -> FailureKind {
    match error {
        SessionError::NotConnected | SessionError::Connect { .. } => FailureKind::NotConnected,
        SessionError::Transport(_) => FailureKind::Transport,
        SessionError::Handshake(_) | SessionError::Protocol(_) => FailureKind::Protocol,
        SessionError::Timeout { .. } => FailureKind::Timeout,
        #[cfg(not(unix))]
        SessionError::UnsupportedUnixTransport(_) => FailureKind::NotConnected,
    }
}

/// Outcome handle for an exchange running on a background worker.
///
/// There is no protocol-level cancellation: dropping the handle abandons
/// interest in the result, but the request itself still runs to completion
/// on the worker.
pub struct PendingReply {
    receiver: Receiver<Response>,
}

impl PendingReply {
    /// Blocks until the worker delivers the response.
    #[must_use]
    pub fn wait(self) -> Response {
        self.receiver
            .recv()
            .unwrap_or(Response::Failure(FailureKind::Transport))
    }

    /// Returns the response if the worker has already delivered it.
    #[must_use]
    pub fn poll(&self) -> Option<Response> {
        self.receiver.try_recv().ok()
    }
}
