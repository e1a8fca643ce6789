// THEORY:
// Every detected change event is worth one durable line: when it happened and
// which cell triggered it. The `ChangeSink` trait keeps the control loop
// decoupled from the actual destination — the production sink appends
// timestamped lines to a process-local file, while tests substitute an
// in-memory recorder. The line format is for humans reading the log after the
// fact; it is not a wire protocol.

use anyhow::{Context, Result};
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Receiver for per-cell change events as the loop detects them.
pub trait ChangeSink {
    fn record(&mut self, frame_index: u64, cell: usize) -> Result<()>;
}

/// Appends one timestamped line per change event to a local log file.
pub struct FileChangeLog {
    writer: BufWriter<File>,
}

impl FileChangeLog {
    /// Opens the log for appending, creating it if needed.
    pub fn append(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .with_context(|| format!("failed to open change log {}", path.display()))?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

/// Builds the log line for one change event.
fn change_line(timestamp: &str, frame_index: u64, cell: usize) -> String {
    format!("{timestamp} - change detected in cell {cell} (frame {frame_index})")
}

impl ChangeSink for FileChangeLog {
    fn record(&mut self, frame_index: u64, cell: usize) -> Result<()> {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string();
        writeln!(self.writer, "{}", change_line(&timestamp, frame_index, cell))
            .context("failed to append to change log")?;
        Ok(())
    }
}

impl Drop for FileChangeLog {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}
