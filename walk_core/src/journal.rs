//! Append-only JSONL journals.
//!
//! Finished sessions are appended to `sessions.wal` one JSON object per line,
//! and the profile ledger keeps its transaction history in the same format.
//! Writers first take the journal's [`StateLock`], the same sidecar lock a
//! rollup holds while it archives the file, then an exclusive lock on the file
//! itself for the duration of one append. Readers take a shared lock and skip
//! lines that fail to parse.

use crate::state::StateLock;
use crate::{Result, SessionSummary};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Destination for finished session summaries
pub trait SessionSink {
    fn append(&mut self, summary: &SessionSummary) -> Result<()>;
}

/// Append `records` to a JSONL file under one exclusive lock
pub fn append_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }

    // Opened only after the sidecar is held so a concurrent rollup can't rename
    // the file out from under this handle
    let _lock = StateLock::acquire(path)?;
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    file.lock_exclusive()?;

    let mut writer = std::io::BufWriter::new(&file);
    for record in records {
        let line = serde_json::to_string(record)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    drop(writer);

    file.unlock()?;
    Ok(())
}

/// Read every parseable record from a JSONL file.
///
/// A missing file is empty. Malformed lines are logged and skipped.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut records = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!("Skipping {:?} line {}: {}", path, line_num + 1, e);
            }
        }
    }

    file.unlock()?;
    Ok(records)
}

/// Session journal backed by a JSONL file
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionSink for JsonlSink {
    fn append(&mut self, summary: &SessionSummary) -> Result<()> {
        append_jsonl(&self.path, std::slice::from_ref(summary))?;
        tracing::debug!("Journaled session {}", summary.id);
        Ok(())
    }
}

/// Read all session summaries from a journal file
pub fn read_summaries(path: &Path) -> Result<Vec<SessionSummary>> {
    let summaries: Vec<SessionSummary> = read_jsonl(path)?;
    tracing::debug!("Read {} sessions from journal", summaries.len());
    Ok(summaries)
}
