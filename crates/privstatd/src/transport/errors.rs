//! Error types for the daemon transport layer.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors raised while binding or running the socket listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to resolve listen address {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("listen address {host}:{port} resolved to nothing")]
    ResolveEmpty { host: String, port: u16 },
    #[error("failed to bind TCP listener on {addr}: {source}")]
    BindTcp {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to bind Unix listener on {path}: {source}")]
    BindUnix {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to inspect existing socket file {path}: {source}")]
    UnixMetadata {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("path {path} exists and is not a socket")]
    UnixNotSocket { path: String },
    #[error("socket {path} is in use by a running daemon")]
    UnixInUse { path: String },
    #[error("failed to probe existing socket {path}: {source}")]
    UnixProbe {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove stale socket file {path}: {source}")]
    UnixCleanup {
        path: String,
        #[source]
        source: io::Error,
    },
    #[cfg(not(unix))]
    #[error("platform does not support Unix sockets: {endpoint}")]
    UnsupportedUnix { endpoint: String },
    #[error("failed to switch listener to non-blocking accepts: {source}")]
    NonBlocking {
        #[source]
        source: io::Error,
    },
    #[error("listener thread panicked")]
    ThreadPanic,
}
