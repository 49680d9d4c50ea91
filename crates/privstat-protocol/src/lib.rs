//! Wire protocol shared by the `privstat` client and the `privstatd` daemon.
//!
//! The two binaries are shipped and updated independently, so everything in
//! this crate is governed by one rule: identifiers are append-only. Opcodes,
//! capability bit positions, reply-kind tags, and fault codes are never
//! renumbered; new entries take fresh numbers at the end.
//!
//! The crate has three layers:
//!
//! - [`Command`] and [`CapabilityFlag`] — the catalogue of operations the
//!   daemon understands and the feature bits it can advertise.
//! - [`RequestFrame`], [`Reply`], and [`Hello`] — the byte-level frames
//!   exchanged over the privileged channel.
//! - [`PermStatus`] — the record type carried by list replies.
//!
//! All multi-byte integers travel as fixed-width two's-complement values in
//! network byte order.

mod command;
mod error;
mod frame;
mod record;

pub use command::{AppOpsMask, CapabilityFlag, Command};
pub use error::ProtocolError;
pub use frame::{
    Hello, MAX_RECORDS, PROTOCOL_VERSION, Reply, ReplyKind, RequestFrame, WIRE_MAGIC, fault,
};
pub use record::{PermState, PermStatus};
