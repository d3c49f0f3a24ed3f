//! Append-only fault log.
//!
//! Every contained task fault appends one block (header line + report text) to
//! a single file next to the host's other logs. The file is opened per write so
//! a crash in between never leaves a handle behind.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

pub const DEFAULT_FAULT_LOG_FILE: &str = "StackTrace.txt";

#[derive(Debug, Clone)]
pub struct FaultLog {
    path: PathBuf,
}

impl FaultLog {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Fault log named [`DEFAULT_FAULT_LOG_FILE`] inside `dir`.
    #[must_use]
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(DEFAULT_FAULT_LOG_FILE))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one report block. Creates the parent directory on first use.
    pub fn append(&self, label: &str, report: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let mut block = format!("==== {label} (unix {stamp}) ====\n");
        block.push_str(report.trim_end());
        block.push('\n');
        file.write_all(block.as_bytes())?;

        debug!(path = %self.path.display(), bytes = block.len(), "Fault report appended");
        Ok(())
    }
}
