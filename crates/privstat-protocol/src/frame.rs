//! Byte-level framing for the privileged channel.
//!
//! Three frames exist. The daemon writes one [`Hello`] when it accepts a
//! connection; after that the client writes [`RequestFrame`]s and the daemon
//! answers each with exactly one [`Reply`]. Requests are fixed-width, so a
//! rejected opcode never desynchronises the stream.
//!
//! Decoding is deliberately shape-agnostic: [`Reply::read_from`] returns
//! whatever tagged reply arrived, and matching it against the set the opcode
//! permits is the caller's job. Coercing a mismatched reply is never done
//! here.

use std::io::{Read, Write};

use crate::command::Command;
use crate::error::ProtocolError;
use crate::record::{PermState, PermStatus};

/// Magic prefix of the handshake frame ("PVS1").
pub const WIRE_MAGIC: u32 = 0x5056_5331;

/// Protocol version this build speaks.
pub const PROTOCOL_VERSION: u16 = 1;

/// Upper bound on records in a single reply; bounds decoder allocation.
pub const MAX_RECORDS: u32 = 16_384;

/// Fault codes carried by failure replies. Append-only.
pub mod fault {
    /// The daemon build does not know the opcode.
    pub const UNKNOWN_OPCODE: u16 = 1;
    /// The operation ran and failed.
    pub const OPERATION_FAILED: u16 = 2;
    /// The daemon build does not support the operation.
    pub const UNSUPPORTED: u16 = 3;
}

/// Reply shapes the protocol defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// A list of permission status records.
    Records,
    /// A single integer value.
    Integer,
    /// An acknowledgement without payload.
    Empty,
    /// A daemon-reported fault.
    Failure,
}

impl ReplyKind {
    const fn tag(self) -> u8 {
        match self {
            Self::Records => 1,
            Self::Integer => 2,
            Self::Empty => 3,
            Self::Failure => 4,
        }
    }

    const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Records),
            2 => Some(Self::Integer),
            3 => Some(Self::Empty),
            4 => Some(Self::Failure),
            _ => None,
        }
    }

    /// Canonical name used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Records => "records",
            Self::Integer => "integer",
            Self::Empty => "empty",
            Self::Failure => "failure",
        }
    }
}

impl std::fmt::Display for ReplyKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.name())
    }
}

/// Handshake frame the daemon writes immediately after accepting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hello {
    /// Protocol version the daemon speaks.
    pub version: u16,
    /// Effective uid of the daemon process, fixed for the session.
    pub euid: u32,
}

impl Hello {
    /// Builds the handshake for the current protocol version.
    #[must_use]
    pub const fn new(euid: u32) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            euid,
        }
    }

    /// Writes the handshake frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Io`] when the channel rejects the write.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), ProtocolError> {
        write_u32(writer, WIRE_MAGIC)?;
        write_u16(writer, self.version)?;
        write_u32(writer, self.euid)?;
        writer.flush()?;
        Ok(())
    }

    /// Reads and validates the handshake frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::BadMagic`] or
    /// [`ProtocolError::UnsupportedVersion`] when the peer is not a daemon
    /// this build can talk to, and [`ProtocolError::Io`] on channel failure.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, ProtocolError> {
        let magic = read_u32(reader)?;
        if magic != WIRE_MAGIC {
            return Err(ProtocolError::BadMagic { found: magic });
        }
        let version = read_u16(reader)?;
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion { found: version });
        }
        let euid = read_u32(reader)?;
        Ok(Self { version, euid })
    }
}

/// One client request: an opcode and an optional argument.
///
/// The argument's meaning depends on the opcode; most commands carry none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestFrame {
    /// Wire opcode; not guaranteed to be catalogued on the receiving build.
    pub opcode: i32,
    /// Opcode-dependent argument.
    pub argument: Option<i64>,
}

impl RequestFrame {
    /// Builds the request frame for a catalogued command.
    #[must_use]
    pub const fn for_command(command: Command, argument: Option<i64>) -> Self {
        Self {
            opcode: command.opcode(),
            argument,
        }
    }

    /// Writes the request frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Io`] when the channel rejects the write.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), ProtocolError> {
        write_i32(writer, self.opcode)?;
        match self.argument {
            Some(argument) => {
                write_u8(writer, 1)?;
                write_i64(writer, argument)?;
            }
            None => write_u8(writer, 0)?,
        }
        writer.flush()?;
        Ok(())
    }

    /// Reads one request frame.
    ///
    /// The opcode is returned raw; rejecting unknown opcodes is the daemon's
    /// decision, not the codec's.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidFlag`] for a malformed argument marker
    /// and [`ProtocolError::Io`] on channel failure.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, ProtocolError> {
        let opcode = read_i32(reader)?;
        let argument = match read_u8(reader)? {
            0 => None,
            1 => Some(read_i64(reader)?),
            value => {
                return Err(ProtocolError::InvalidFlag {
                    field: "request argument marker",
                    value,
                });
            }
        };
        Ok(Self { opcode, argument })
    }
}

/// Decoded daemon reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Permission status records.
    Records(Vec<PermStatus>),
    /// A single integer value.
    Integer(i64),
    /// An acknowledgement without payload.
    Empty,
    /// A daemon-reported fault.
    Failure {
        /// One of the [`fault`] codes.
        code: u16,
        /// Human-readable detail, for logs only.
        message: String,
    },
}

impl Reply {
    /// Shape of this reply.
    #[must_use]
    pub const fn kind(&self) -> ReplyKind {
        match self {
            Self::Records(_) => ReplyKind::Records,
            Self::Integer(_) => ReplyKind::Integer,
            Self::Empty => ReplyKind::Empty,
            Self::Failure { .. } => ReplyKind::Failure,
        }
    }

    /// Builds a failure reply from a fault code and message.
    #[must_use]
    pub fn failure(code: u16, message: impl Into<String>) -> Self {
        Self::Failure {
            code,
            message: message.into(),
        }
    }

    /// Writes the reply frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::TooManyRecords`] or
    /// [`ProtocolError::StringTooLong`] when the payload cannot be encoded,
    /// and [`ProtocolError::Io`] on channel failure.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), ProtocolError> {
        write_u8(writer, self.kind().tag())?;
        match self {
            Self::Records(records) => {
                let count = u32::try_from(records.len()).unwrap_or(u32::MAX);
                if count > MAX_RECORDS {
                    return Err(ProtocolError::TooManyRecords {
                        count,
                        limit: MAX_RECORDS,
                    });
                }
                write_u32(writer, count)?;
                for record in records {
                    write_record(writer, record)?;
                }
            }
            Self::Integer(value) => write_i64(writer, *value)?,
            Self::Empty => {}
            Self::Failure { code, message } => {
                write_u16(writer, *code)?;
                write_string(writer, "fault message", message)?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    /// Reads one reply frame of whatever kind arrived.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownReplyKind`] for a tag outside the
    /// defined set, payload-specific variants for malformed bodies, and
    /// [`ProtocolError::Io`] on channel failure.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, ProtocolError> {
        let tag = read_u8(reader)?;
        let kind = ReplyKind::from_tag(tag).ok_or(ProtocolError::UnknownReplyKind { tag })?;
        match kind {
            ReplyKind::Records => {
                let count = read_u32(reader)?;
                if count > MAX_RECORDS {
                    return Err(ProtocolError::TooManyRecords {
                        count,
                        limit: MAX_RECORDS,
                    });
                }
                let mut records = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    records.push(read_record(reader)?);
                }
                Ok(Self::Records(records))
            }
            ReplyKind::Integer => Ok(Self::Integer(read_i64(reader)?)),
            ReplyKind::Empty => Ok(Self::Empty),
            ReplyKind::Failure => {
                let code = read_u16(reader)?;
                let message = read_string(reader, "fault message")?;
                Ok(Self::Failure { code, message })
            }
        }
    }
}

fn write_record<W: Write>(writer: &mut W, record: &PermStatus) -> Result<(), ProtocolError> {
    write_string(writer, "package", &record.package)?;
    write_string(writer, "permission", &record.permission)?;
    write_u8(writer, record.state.code())?;
    write_u8(writer, u8::from(record.overridden))?;
    Ok(())
}

fn read_record<R: Read>(reader: &mut R) -> Result<PermStatus, ProtocolError> {
    let package = read_string(reader, "package")?;
    let permission = read_string(reader, "permission")?;
    let state_code = read_u8(reader)?;
    let state =
        PermState::from_code(state_code).ok_or(ProtocolError::UnknownState { code: state_code })?;
    let overridden = match read_u8(reader)? {
        0 => false,
        1 => true,
        value => {
            return Err(ProtocolError::InvalidFlag {
                field: "override marker",
                value,
            });
        }
    };
    Ok(PermStatus {
        package,
        permission,
        state,
        overridden,
    })
}

fn write_string<W: Write>(
    writer: &mut W,
    field: &'static str,
    value: &str,
) -> Result<(), ProtocolError> {
    let length = u16::try_from(value.len()).map_err(|_| ProtocolError::StringTooLong {
        field,
        length: value.len(),
        limit: usize::from(u16::MAX),
    })?;
    write_u16(writer, length)?;
    writer.write_all(value.as_bytes())?;
    Ok(())
}

fn read_string<R: Read>(reader: &mut R, field: &'static str) -> Result<String, ProtocolError> {
    let length = read_u16(reader)?;
    let mut buffer = vec![0_u8; usize::from(length)];
    reader.read_exact(&mut buffer)?;
    String::from_utf8(buffer).map_err(|_| ProtocolError::InvalidUtf8 { field })
}

fn write_u8<W: Write>(writer: &mut W, value: u8) -> Result<(), ProtocolError> {
    writer.write_all(&[value])?;
    Ok(())
}

fn read_u8<R: Read>(reader: &mut R) -> Result<u8, ProtocolError> {
    let mut buffer = [0_u8; 1];
    reader.read_exact(&mut buffer)?;
    Ok(buffer[0])
}

macro_rules! fixed_width {
    ($write_name:ident, $read_name:ident, $ty:ty) => {
        fn $write_name<W: Write>(writer: &mut W, value: $ty) -> Result<(), ProtocolError> {
            writer.write_all(&value.to_be_bytes())?;
            Ok(())
        }

        fn $read_name<R: Read>(reader: &mut R) -> Result<$ty, ProtocolError> {
            let mut buffer = [0_u8; size_of::<$ty>()];
            reader.read_exact(&mut buffer)?;
            Ok(<$ty>::from_be_bytes(buffer))
        }
    };
}

fixed_width!(write_u16, read_u16, u16);
fixed_width!(write_u32, read_u32, u32);
fixed_width!(write_i32, read_i32, i32);
fixed_width!(write_i64, read_i64, i64);
