use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use palma_core::CommandRecord;
use tracing::warn;

/// Append-only audit log of command runs.
///
/// Records are kept in memory and, when a file is configured, appended to it
/// as JSON lines. A failed file write is logged and never fails the command.
#[derive(Debug, Default)]
pub struct CommandLog {
    records: Mutex<Vec<CommandRecord>>,
    file: Option<PathBuf>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(path: impl Into<PathBuf>) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            file: Some(path.into()),
        }
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn append(&self, record: CommandRecord) {
        if let Some(path) = &self.file {
            if let Err(e) = append_line(path, &record) {
                warn!(path = %path.display(), error = %e, "Failed to write command audit record");
            }
        }
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(record);
    }

    /// Snapshot of all records, oldest first.
    pub fn records(&self) -> Vec<CommandRecord> {
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn append_line(path: &Path, record: &CommandRecord) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let line = serde_json::to_string(record)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)
}
