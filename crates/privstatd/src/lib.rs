//! Privileged helper daemon for the privstat client.
//!
//! The daemon listens on a socket, greets each connection with a handshake
//! carrying its effective uid, and then answers framed requests: permission
//! status records from the policy snapshot, the app-ops capability mask
//! assembled by probing the op table, diagnostic heap dumps, and an in-band
//! shutdown. Process management (pid file, health snapshot, signals,
//! daemonisation) follows the runtime artefact layout shared with the
//! client's lifecycle commands.

mod dispatch;
mod heap;
mod health;
mod ops;
mod policy;
mod process;
pub mod telemetry;
mod transport;

pub use policy::{PolicyStore, ProviderError, StatusProvider};
pub use process::{DaemonizeError, LaunchError, run_daemon, run_daemon_from};
pub use transport::ListenerError;
