//! Scheduling seam between the dispatcher and its host.
//!
//! `send_request` blocks for the whole round trip, so the host decides where
//! that blocking happens. [`WorkerBridge`] is that seam: the production
//! bridge spawns a named worker thread, tests substitute an inline runner.
//! The dispatcher never assumes which thread it was invoked from beyond
//! "not one whose blocking freezes interaction".

use std::thread;

use tracing::warn;

/// Tracing target for bridge events.
const BRIDGE_TARGET: &str = "privstat::bridge";

/// Job executed away from the interactive thread.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs blocking daemon work on behalf of the dispatcher.
pub trait WorkerBridge: Send + Sync + 'static {
    /// Schedules the job on a background worker.
    fn run(&self, job: Job);
}

/// Bridge that hosts each job on a freshly spawned named thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadBridge;

impl WorkerBridge for ThreadBridge {
    fn run(&self, job: Job) {
        let builder = thread::Builder::new().name("privstat-request".to_owned());
        match builder.spawn(job) {
            Ok(_handle) => {}
            Err(error) => {
                // Spawning can fail under resource exhaustion; the job is
                // lost and the pending reply resolves as a failure when its
                // sender is dropped.
                warn!(
                    target: BRIDGE_TARGET,
                    %error,
                    "failed to spawn request worker"
                );
            }
        }
    }
}
