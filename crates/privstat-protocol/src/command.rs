//! Command catalogue and capability flags.

use std::fmt;

use crate::error::ProtocolError;
use crate::frame::ReplyKind;

/// Action commands the daemon executes on behalf of the client.
///
/// Opcodes are stable across protocol versions; a daemon that does not know
/// an opcode rejects it with a fault reply instead of guessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Requests the per-package permission status records.
    GetPermStatus,
    /// Requests the app-ops capability mask.
    GetAppOpStatus,
    /// Requests a diagnostic heap dump; the optional argument tags the dump
    /// file.
    DumpHeap,
    /// Asks the daemon to shut down after acknowledging.
    Shutdown,
}

impl Command {
    /// Every catalogued command, in opcode order.
    pub const ALL: [Self; 4] = [
        Self::GetPermStatus,
        Self::GetAppOpStatus,
        Self::DumpHeap,
        Self::Shutdown,
    ];

    /// Stable wire opcode for this command.
    #[must_use]
    pub const fn opcode(self) -> i32 {
        match self {
            Self::GetPermStatus => 1,
            Self::GetAppOpStatus => 2,
            Self::DumpHeap => 3,
            Self::Shutdown => 4,
        }
    }

    /// Looks up the command carried by a wire opcode.
    ///
    /// Returns `None` when this build does not know the opcode; callers treat
    /// that as a protocol-level rejection, not a crash.
    #[must_use]
    pub const fn from_opcode(opcode: i32) -> Option<Self> {
        match opcode {
            1 => Some(Self::GetPermStatus),
            2 => Some(Self::GetAppOpStatus),
            3 => Some(Self::DumpHeap),
            4 => Some(Self::Shutdown),
            _ => None,
        }
    }

    /// Reply shape the daemon produces for this command.
    ///
    /// A [`ReplyKind::Failure`] reply is additionally permitted for every
    /// opcode; anything else outside this shape is a protocol violation.
    #[must_use]
    pub const fn expected_reply(self) -> ReplyKind {
        match self {
            Self::GetPermStatus => ReplyKind::Records,
            Self::GetAppOpStatus => ReplyKind::Integer,
            Self::DumpHeap | Self::Shutdown => ReplyKind::Empty,
        }
    }

    /// Canonical name used in logs and CLI output.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::GetPermStatus => "perm-status",
            Self::GetAppOpStatus => "app-op-status",
            Self::DumpHeap => "dump-heap",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

/// Feature bits advertised through the app-ops status mask.
///
/// Each flag describes one introspection capability of the running daemon
/// build. Bit positions are append-only for the same reason opcodes are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityFlag {
    /// The op table resolves every op to its default mode.
    OpToDefaultMode,
    /// The op table resolves every op to a valid switch group.
    OpToSwitch,
    /// The op table resolves every op to a distinct name.
    OpToName,
    /// Op numbering is dense and consistent with the table order.
    OpNumConsistent,
}

impl CapabilityFlag {
    /// Every defined flag, in bit order.
    pub const ALL: [Self; 4] = [
        Self::OpToDefaultMode,
        Self::OpToSwitch,
        Self::OpToName,
        Self::OpNumConsistent,
    ];

    /// Bit position of this flag within the mask.
    #[must_use]
    pub const fn bit(self) -> u32 {
        match self {
            Self::OpToDefaultMode => 0,
            Self::OpToSwitch => 1,
            Self::OpToName => 2,
            Self::OpNumConsistent => 3,
        }
    }

    /// Mask value with only this flag's bit set.
    #[must_use]
    pub const fn bit_value(self) -> u32 {
        1 << self.bit()
    }

    /// Canonical name used in logs and CLI output.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::OpToDefaultMode => "op-to-default-mode",
            Self::OpToSwitch => "op-to-switch",
            Self::OpToName => "op-to-name",
            Self::OpNumConsistent => "op-num-consistent",
        }
    }
}

impl fmt::Display for CapabilityFlag {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

/// Integer capability mask returned by [`Command::GetAppOpStatus`].
///
/// The only defined operations are equality and per-flag testing. Bits the
/// catalogue does not define are preserved untouched: a newer daemon may set
/// appended bits that an older client cannot name yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppOpsMask(u32);

impl AppOpsMask {
    /// Wraps a raw mask value.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Interprets the integer payload of an app-ops status reply.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MaskOutOfRange`] when the value does not fit
    /// the 32-bit mask space; higher bits are always zero on the wire.
    pub fn from_reply(value: i64) -> Result<Self, ProtocolError> {
        u32::try_from(value)
            .map(Self)
            .map_err(|_| ProtocolError::MaskOutOfRange { value })
    }

    /// Raw mask value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Tests a single capability bit.
    #[must_use]
    pub const fn contains(self, flag: CapabilityFlag) -> bool {
        (self.0 >> flag.bit()) & 1 != 0
    }
}
