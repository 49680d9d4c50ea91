//! Diagnostic heap dumps.
//!
//! The dump command records the daemon's own memory footprint to a file in
//! the runtime dump directory so it can be collected without attaching a
//! debugger to a privileged process. On Linux the dump carries the kernel's
//! per-process accounting; elsewhere a minimal summary is written.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

const HEAP_TARGET: &str = "privstatd::heap";

/// Writes tagged memory dumps into a fixed directory.
#[derive(Debug, Clone)]
pub(crate) struct HeapDumper {
    dir: PathBuf,
}

impl HeapDumper {
    pub(crate) fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Writes one dump; the optional tag distinguishes client-requested
    /// dumps, otherwise the epoch second is used.
    pub(crate) fn write(&self, tag: Option<i64>) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let label = match tag {
            Some(tag) => tag.to_string(),
            None => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or(0)
                .to_string(),
        };
        let path = self.dir.join(format!("heap-{label}.txt"));
        let mut file = fs::File::create(&path)?;
        writeln!(file, "pid: {}", std::process::id())?;
        write_memory_accounting(&mut file)?;
        file.sync_all()?;
        debug!(
            target: HEAP_TARGET,
            path = %path.display(),
            "heap dump written"
        );
        Ok(path)
    }
}

#[cfg(target_os = "linux")]
fn write_memory_accounting(file: &mut fs::File) -> io::Result<()> {
    for source in ["/proc/self/status", "/proc/self/statm"] {
        match fs::read_to_string(source) {
            Ok(content) => {
                writeln!(file, "--- {source} ---")?;
                file.write_all(content.as_bytes())?;
            }
            Err(error) => writeln!(file, "--- {source} unavailable: {error} ---")?,
        }
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn write_memory_accounting(file: &mut fs::File) -> io::Result<()> {
    writeln!(file, "memory accounting unavailable on this platform")
}
