//! Error type for frame encoding and decoding.

use std::io;

use thiserror::Error;

/// Errors surfaced while reading or writing protocol frames.
///
/// [`ProtocolError::Io`] covers transport-level failures (including the read
/// deadline expiring); every other variant means the peer produced bytes the
/// protocol does not permit.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Reading from or writing to the channel failed.
    #[error("channel I/O failed: {0}")]
    Io(#[from] io::Error),

    /// The handshake did not start with the protocol magic.
    #[error("bad handshake magic {found:#010x}")]
    BadMagic {
        /// Value found where the magic was expected.
        found: u32,
    },

    /// The peer speaks a protocol version this build does not.
    #[error("unsupported protocol version {found}")]
    UnsupportedVersion {
        /// Version advertised by the peer.
        found: u16,
    },

    /// A reply carried a kind tag outside the defined set.
    #[error("unknown reply kind tag {tag:#04x}")]
    UnknownReplyKind {
        /// Tag byte found on the wire.
        tag: u8,
    },

    /// A one-byte flag field held something other than 0 or 1.
    #[error("invalid flag byte {value:#04x} in {field}")]
    InvalidFlag {
        /// Field the byte belongs to.
        field: &'static str,
        /// Value found on the wire.
        value: u8,
    },

    /// A record state byte was outside the defined classifications.
    #[error("unknown permission state code {code}")]
    UnknownState {
        /// State code found on the wire.
        code: u8,
    },

    /// A string field was not valid UTF-8.
    #[error("field {field} is not valid UTF-8")]
    InvalidUtf8 {
        /// Field the bytes belong to.
        field: &'static str,
    },

    /// A string field exceeded the length prefix range.
    #[error("string field {field} is {length} bytes, limit {limit}")]
    StringTooLong {
        /// Field being encoded.
        field: &'static str,
        /// Actual byte length.
        length: usize,
        /// Largest encodable length.
        limit: usize,
    },

    /// A records reply declared more entries than the decoder accepts.
    #[error("records reply declares {count} entries, limit {limit}")]
    TooManyRecords {
        /// Count declared on the wire.
        count: u32,
        /// Decoder limit.
        limit: u32,
    },

    /// An integer payload did not fit the 32-bit mask space.
    #[error("capability mask value {value} is out of range")]
    MaskOutOfRange {
        /// Value found on the wire.
        value: i64,
    },
}
