//! Opcode routing to operation implementations.

use std::sync::Arc;

use privstat_protocol::{Command, Reply, fault};
use tracing::{debug, info, warn};

use crate::heap::HeapDumper;
use crate::ops::OpTable;
use crate::policy::StatusProvider;
use crate::process::ShutdownFlag;

/// Tracing target for dispatch events.
pub(crate) const DISPATCH_TARGET: &str = "privstatd::dispatch";

/// Routes catalogued commands to their operations.
///
/// The router is shared by every connection thread; all of its collaborators
/// are immutable or internally synchronised.
pub(crate) struct Router {
    provider: Arc<dyn StatusProvider>,
    ops: OpTable,
    dumper: HeapDumper,
    shutdown: ShutdownFlag,
}

impl Router {
    pub(crate) fn new(
        provider: Arc<dyn StatusProvider>,
        ops: OpTable,
        dumper: HeapDumper,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            provider,
            ops,
            dumper,
            shutdown,
        }
    }

    /// Executes one command and produces its reply.
    ///
    /// Operation failures become fault replies; this function never fails
    /// the connection itself.
    pub(crate) fn dispatch(&self, command: Command, argument: Option<i64>) -> Reply {
        debug!(
            target: DISPATCH_TARGET,
            command = %command,
            argument,
            "dispatching command"
        );
        match command {
            Command::GetPermStatus => match self.provider.perm_statuses() {
                Ok(records) => Reply::Records(records),
                Err(error) => {
                    warn!(
                        target: DISPATCH_TARGET,
                        %error,
                        "permission status query failed"
                    );
                    Reply::failure(fault::OPERATION_FAILED, error.to_string())
                }
            },
            Command::GetAppOpStatus => {
                Reply::Integer(i64::from(self.ops.capability_mask().raw()))
            }
            Command::DumpHeap => match self.dumper.write(argument) {
                Ok(path) => {
                    info!(
                        target: DISPATCH_TARGET,
                        path = %path.display(),
                        "heap dump written"
                    );
                    Reply::Empty
                }
                Err(error) => {
                    warn!(target: DISPATCH_TARGET, %error, "heap dump failed");
                    Reply::failure(fault::OPERATION_FAILED, error.to_string())
                }
            },
            Command::Shutdown => {
                info!(target: DISPATCH_TARGET, "shutdown requested over the wire");
                self.shutdown.raise();
                Reply::Empty
            }
        }
    }
}
