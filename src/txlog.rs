//! Append-only transaction log.
//!
//! Every processed request is written as one JSON line, whether it
//! committed or was rejected, so the file doubles as an audit trail and as
//! replay input for rebuilding balances.

use crate::error::Result;
use crate::transaction::{TransactionRequest, TxKind};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// What happened to a logged request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Committed { event_ids: Vec<String> },
    Rejected { error: String },
}

impl Outcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Outcome::Committed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub caller: String,
    pub request: TransactionRequest,
    pub outcome: Outcome,
}

impl LogEntry {
    pub fn new(caller: &str, request: &TransactionRequest, outcome: Outcome) -> Self {
        LogEntry {
            timestamp: Utc::now(),
            caller: caller.to_string(),
            request: request.clone(),
            outcome,
        }
    }

    pub fn kind(&self) -> TxKind {
        self.request.kind()
    }
}

/// JSON-lines writer for [`LogEntry`] records.
pub struct TransactionLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl TransactionLog {
    /// Opens `path` for appending, creating it if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(TransactionLog {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry and flushes it to the file.
    pub fn append(&self, entry: &LogEntry) -> Result<()> {
        let line = serde_json::to_string(entry)?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }

    /// Reads every entry in the log at `path`, in append order.
    pub fn read_all<P: AsRef<Path>>(path: P) -> Result<Vec<LogEntry>> {
        let reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }

        Ok(entries)
    }
}

impl std::fmt::Debug for TransactionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionLog")
            .field("path", &self.path)
            .finish()
    }
}

impl Drop for TransactionLog {
    fn drop(&mut self) {
        let _ = self.writer.lock().flush();
    }
}
