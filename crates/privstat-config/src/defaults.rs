//! Built-in defaults shared by both binaries.

use camino::Utf8PathBuf;

#[cfg(unix)]
use dirs::runtime_dir;
#[cfg(unix)]
use libc::geteuid;

use crate::socket::SocketEndpoint;

/// Default TCP port used when Unix domain sockets are not available.
pub const DEFAULT_TCP_PORT: u16 = 9821;

/// Default tracing filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default deadline, in milliseconds, for one daemon round trip.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Default tracing filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Computes the default socket endpoint for the daemon.
///
/// The daemon is expected to run with elevated privilege, so when the caller
/// is root the socket lives under `/run`. Unprivileged invocations (tests,
/// development) fall back to the user runtime directory, then to a
/// uid-namespaced directory under the system temp dir.
#[must_use]
pub fn default_socket_endpoint() -> SocketEndpoint {
    default_socket_endpoint_inner()
}

#[cfg(unix)]
fn default_socket_endpoint_inner() -> SocketEndpoint {
    let base = if effective_uid() == 0 {
        Utf8PathBuf::from("/run/privstat")
    } else {
        user_base_directory()
    };
    SocketEndpoint::unix(base.join("privstatd.sock"))
}

#[cfg(unix)]
fn user_base_directory() -> Utf8PathBuf {
    if let Some(dir) = runtime_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok()) {
        return dir.join("privstat");
    }
    let tmp = Utf8PathBuf::from_path_buf(std::env::temp_dir())
        .unwrap_or_else(|_| Utf8PathBuf::from("/tmp"));
    tmp.join("privstat").join(format!("uid-{}", effective_uid()))
}

#[cfg(unix)]
fn effective_uid() -> u32 {
    // SAFETY: geteuid(2) reads process credentials and cannot fail.
    unsafe { geteuid() }
}

#[cfg(not(unix))]
fn default_socket_endpoint_inner() -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", DEFAULT_TCP_PORT)
}
