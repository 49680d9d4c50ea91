//! Framed request dispatch for daemon connections.
//!
//! Each accepted connection is a session: the handler writes one hello
//! frame (protocol magic, version, the daemon's effective uid) and then
//! serves request frames until the client disconnects. Requests are
//! fixed-width, so a rejected opcode never desynchronises the stream — the
//! daemon answers it with a fault reply and keeps the connection.
//!
//! Routing is by opcode: the catalogue lookup rejects opcodes this build
//! does not know, and each known command maps to one operation (policy
//! snapshot, capability probes, heap dump, shutdown).

mod handler;
mod router;

pub(crate) use handler::SessionConnectionHandler;
pub(crate) use router::Router;
