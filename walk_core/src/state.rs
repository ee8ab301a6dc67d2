//! Locked JSON state files.
//!
//! Small user-owned records (step settings, profile) are stored as single JSON
//! documents. Reads take a shared lock on the document. Saves write a fresh
//! temp file in the same directory and rename it over the original, so a
//! reader sees either the old or the new document, never a torn one.
//!
//! The rename alone does not serialize writers: two processes doing
//! load-modify-save can still lose an update. Read-modify-write callers hold a
//! [`StateLock`] on the document for the whole cycle.

use crate::{Error, Result};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Exclusive advisory lock on a sidecar `<name>.lock` file next to a state file.
///
/// The sidecar is never renamed or replaced, so every process contends on the
/// same inode no matter how often the document itself is swapped out. Released
/// on drop. Not reentrant: acquiring it twice in one process deadlocks.
#[derive(Debug)]
pub struct StateLock {
    file: File,
    path: PathBuf,
}

impl StateLock {
    /// Block until the lock guarding `path` is held
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let lock_path = lock_path(path);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)?;
        file.lock_exclusive()?;
        tracing::trace!("Locked {:?}", lock_path);
        Ok(Self {
            file,
            path: lock_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!("Failed to unlock {:?}: {}", self.path, e);
        }
    }
}

/// Sidecar lock file for a state file: `profile.json` -> `profile.json.lock`
pub fn lock_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("state"));
    name.push(".lock");
    path.with_file_name(name)
}

/// Load a JSON document with shared locking.
///
/// A missing file yields `None`. An unreadable or unparseable file is logged
/// and also yields `None`, so callers fall back to defaults.
pub fn load_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<Option<T>> {
    if !path.exists() {
        tracing::info!("No {} file found at {:?}", what, path);
        return Ok(None);
    }

    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!("Unable to open {} file {:?}: {}. Using defaults.", what, path, e);
            return Ok(None);
        }
    };

    if let Err(e) = file.lock_shared() {
        tracing::warn!("Unable to lock {} file {:?}: {}. Using defaults.", what, path, e);
        return Ok(None);
    }

    let mut contents = String::new();
    let mut reader = std::io::BufReader::new(&file);
    if let Err(e) = reader.read_to_string(&mut contents) {
        let _ = file.unlock();
        tracing::warn!("Failed to read {} file {:?}: {}. Using defaults.", what, path, e);
        return Ok(None);
    }

    file.unlock()?;

    match serde_json::from_str::<T>(&contents) {
        Ok(value) => {
            tracing::debug!("Loaded {} from {:?}", what, path);
            Ok(Some(value))
        }
        Err(e) => {
            tracing::warn!("Failed to parse {} file {:?}: {}. Using defaults.", what, path, e);
            Ok(None)
        }
    }
}

/// Atomically replace a JSON document.
///
/// Callers that read the document first and write back a modified copy must
/// hold its [`StateLock`] across both steps.
pub fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Same directory so the final rename stays on one filesystem
    let temp = NamedTempFile::new_in(path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::Other, "state path missing parent")
    })?)?;

    {
        let mut writer = std::io::BufWriter::new(temp.as_file());
        let contents = serde_json::to_string_pretty(value)?;
        writer.write_all(contents.as_bytes())?;
        writer.flush()?;
    }

    temp.as_file().sync_all()?;

    temp.persist(path).map_err(|e| Error::Io(e.error))?;

    tracing::debug!("Saved {:?}", path);
    Ok(())
}
