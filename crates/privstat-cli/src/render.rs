//! Plain-text rendering of daemon responses.
//!
//! The core hands the presentation layer three shapes — records, an integer
//! mask, or a failure — and this module turns them into lines. Failures are
//! rendered as "feature unavailable" messages; protocol detail stays in the
//! logs.

use std::io::{self, Write};

use privstat_protocol::{AppOpsMask, CapabilityFlag, PermStatus};

use crate::dispatcher::FailureKind;
use crate::session::DaemonIdentity;

pub(crate) fn write_records<W: Write>(
    writer: &mut W,
    identity: Option<DaemonIdentity>,
    records: &[PermStatus],
) -> io::Result<()> {
    if let Some(identity) = identity {
        writeln!(writer, "daemon uid: {}", identity.euid)?;
    }
    if records.is_empty() {
        writeln!(writer, "no permission records reported")?;
        return Ok(());
    }
    for record in records {
        let marker = if record.overridden { " [override]" } else { "" };
        writeln!(
            writer,
            "{}\t{}\t{}{}",
            record.package, record.permission, record.state, marker
        )?;
    }
    Ok(())
}

pub(crate) fn write_records_json<W: Write>(
    writer: &mut W,
    records: &[PermStatus],
) -> Result<(), serde_json::Error> {
    serde_json::to_writer_pretty(writer, records)
}

pub(crate) fn write_mask<W: Write>(writer: &mut W, mask: AppOpsMask) -> io::Result<()> {
    for flag in CapabilityFlag::ALL {
        let verdict = if mask.contains(flag) { "yes" } else { "no" };
        writeln!(writer, "{flag}\t{verdict}")?;
    }
    Ok(())
}

/// User-facing wording for a failed exchange.
///
/// Deliberately coarse: a failure means the feature is unavailable right
/// now, and the distinction between transport and protocol trouble belongs
/// in the logs.
pub(crate) const fn failure_message(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::NotConnected => "daemon is not available; start it with 'privstat daemon start'",
        FailureKind::Timeout => "daemon did not respond in time",
        FailureKind::Transport | FailureKind::Protocol | FailureKind::Daemon(_) => {
            "daemon request failed; see logs for details"
        }
    }
}
