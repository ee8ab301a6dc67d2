//! Journal rollup into `sessions.csv`.
//!
//! The session journal grows one line per finished session. Rolling it up
//! appends every journaled session to a CSV file, fsyncs the CSV, and only then
//! renames the journal to a timestamped `*.wal.processed` archive. A crash
//! between the two steps leaves duplicate rows, which [`crate::history`]
//! de-duplicates by session id.
//!
//! The journal's [`StateLock`] is held from the read until the rename, so a
//! session appended meanwhile waits and lands in a fresh journal.

use crate::state::StateLock;
use crate::{ConfidenceTier, Result, SessionSummary};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One session as stored in `sessions.csv`
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionRow {
    pub id: Uuid,
    /// Local calendar day the session started on
    pub date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub steps: u64,
    pub distance_km: f64,
    pub coins: u64,
    pub final_tier: ConfidenceTier,
}

impl From<&SessionSummary> for SessionRow {
    fn from(summary: &SessionSummary) -> Self {
        SessionRow {
            id: summary.id,
            date: summary.started_at.with_timezone(&chrono::Local).date_naive(),
            started_at: summary.started_at,
            ended_at: summary.ended_at,
            steps: summary.steps,
            distance_km: summary.distance_km,
            coins: summary.coins,
            final_tier: summary.final_tier,
        }
    }
}

const PROCESSED_SUFFIX: &str = ".wal.processed";

/// Path a journal is archived to when rolled up at `at`:
/// `sessions.wal` -> `sessions.20250602T120000123.wal.processed`
pub fn processed_path(journal_path: &Path, at: DateTime<Utc>) -> PathBuf {
    let stamp = at.format("%Y%m%dT%H%M%S%3f");
    journal_path.with_extension(format!("{}{}", stamp, PROCESSED_SUFFIX))
}

/// First archive path that does not exist yet
fn unused_processed_path(journal_path: &Path, at: DateTime<Utc>) -> PathBuf {
    let mut at = at;
    loop {
        let path = processed_path(journal_path, at);
        if !path.exists() {
            return path;
        }
        at += chrono::Duration::milliseconds(1);
    }
}

/// Archived journals in `dir`, oldest first
pub fn processed_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let archived = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(PROCESSED_SUFFIX));
        if archived {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Append journaled sessions to the CSV and archive the journal.
///
/// Returns the number of sessions rolled up. An empty or missing journal
/// leaves both files untouched.
pub fn journal_to_csv(journal_path: &Path, csv_path: &Path) -> Result<usize> {
    let _lock = StateLock::acquire(journal_path)?;

    let summaries = crate::journal::read_summaries(journal_path)?;
    if summaries.is_empty() {
        tracing::info!("No sessions in journal to roll up");
        return Ok(0);
    }

    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(csv_path)?;

    let needs_headers = file.metadata()?.len() == 0;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_headers)
        .from_writer(file);

    for summary in &summaries {
        writer.serialize(SessionRow::from(summary))?;
    }
    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    file.sync_all()?;

    let archived = unused_processed_path(journal_path, Utc::now());
    std::fs::rename(journal_path, &archived)?;
    tracing::info!(
        "Rolled up {} sessions into {:?}, journal archived to {:?}",
        summaries.len(),
        csv_path,
        archived
    );

    Ok(summaries.len())
}

/// Read all rows from `sessions.csv`; unparseable rows are skipped
pub fn read_rows(csv_path: &Path) -> Result<Vec<SessionRow>> {
    if !csv_path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut rows = Vec::new();
    for (index, record) in reader.deserialize::<SessionRow>().enumerate() {
        match record {
            Ok(row) => rows.push(row),
            Err(e) => tracing::warn!("Skipping CSV row {}: {}", index + 2, e),
        }
    }
    Ok(rows)
}

/// Delete archived journals in `dir`; returns how many were removed
pub fn cleanup_processed(dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for path in processed_files(dir)? {
        std::fs::remove_file(&path)?;
        tracing::debug!("Removed {:?}", path);
        removed += 1;
    }

    tracing::info!("Removed {} processed journals", removed);
    Ok(removed)
}
