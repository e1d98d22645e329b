//! Durable on-disk registry of live processes.
//!
//! A JSON array of [`ProcessRecord`] entries. Every mutation is a full
//! read-modify-write serialized through one async mutex per registry file,
//! shared by every [`ProcessRegistry`] in the process that points at the
//! same path; the file itself carries no locking. Writes land in a temp file
//! in the same directory and are atomically renamed into place.
//!
//! A missing, unreadable, or malformed file reads as an empty registry.

use std::collections::HashMap;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, PoisonError};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::models::process::ProcessRecord;
use crate::{AppError, Result};

/// Write locks keyed by resolved registry path.
static FILE_LOCKS: LazyLock<std::sync::Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(Default::default);

/// Registry of processes spawned by this host.
#[derive(Debug)]
pub struct ProcessRegistry {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl ProcessRegistry {
    /// Registry stored at `path`.
    ///
    /// Registries built for the same file, even through different spellings
    /// of its path, share one write lock.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        let lock = file_lock(&path);
        Self { path, lock }
    }

    /// Location of the registry file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add `record`, replacing any stale entry with the same pid.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the registry cannot be written.
    pub async fn append(&self, record: ProcessRecord) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_records().await;
        records.retain(|existing| existing.pid != record.pid);
        records.push(record);
        self.write_records(records).await
    }

    /// Remove the entry for `pid`. Returns whether an entry was removed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the registry cannot be written.
    pub async fn remove(&self, pid: u32) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_records().await;
        let before = records.len();
        records.retain(|record| record.pid != pid);
        if records.len() == before {
            return Ok(false);
        }
        self.write_records(records).await?;
        Ok(true)
    }

    /// Current registry contents.
    pub async fn list(&self) -> Vec<ProcessRecord> {
        let _guard = self.lock.lock().await;
        self.read_records().await
    }

    /// Return the current contents and empty the registry in one step.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the emptied registry cannot be written.
    pub async fn drain(&self) -> Result<Vec<ProcessRecord>> {
        let _guard = self.lock.lock().await;
        let records = self.read_records().await;
        self.write_records(Vec::new()).await?;
        Ok(records)
    }

    async fn read_records(&self) -> Vec<ProcessRecord> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                warn!(path = %self.path.display(), %err, "failed to read process registry, treating as empty");
                return Vec::new();
            }
        };

        if raw.trim().is_empty() {
            return Vec::new();
        }

        match serde_json::from_str::<Vec<ProcessRecord>>(&raw) {
            Ok(records) => records,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "malformed process registry, treating as empty");
                Vec::new()
            }
        }
    }

    async fn write_records(&self, records: Vec<ProcessRecord>) -> Result<()> {
        let path = self.path.clone();
        debug!(path = %path.display(), entries = records.len(), "writing process registry");
        tokio::task::spawn_blocking(move || write_atomic(&path, &records))
            .await
            .map_err(|err| AppError::Io(format!("registry write task failed: {err}")))?
    }
}

fn file_lock(path: &Path) -> Arc<Mutex<()>> {
    let key = lock_key(path);
    let mut locks = FILE_LOCKS.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(locks.entry(key).or_default())
}

/// Canonicalize the deepest existing ancestor of `path` and re-append the
/// rest, so the key is stable before and after the registry directory is
/// created.
fn lock_key(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut missing: Vec<OsString> = Vec::new();
    let mut current = absolute.as_path();
    loop {
        if let Ok(canonical) = current.canonicalize() {
            return missing
                .iter()
                .rev()
                .fold(canonical, |acc, part| acc.join(part));
        }
        match (current.parent(), current.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                current = parent;
            }
            _ => return absolute,
        }
    }
}

fn write_atomic(path: &Path, records: &[ProcessRecord]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| AppError::Io(format!("registry path {} has no parent", path.display())))?;
    std::fs::create_dir_all(dir)
        .map_err(|err| AppError::Io(format!("cannot create {}: {err}", dir.display())))?;

    let json = serde_json::to_string_pretty(records)
        .map_err(|err| AppError::Io(format!("cannot serialize registry: {err}")))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|err| AppError::Io(format!("cannot create registry temp file: {err}")))?;
    tmp.write_all(json.as_bytes())
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|err| AppError::Io(format!("cannot write registry: {err}")))?;
    tmp.persist(path)
        .map_err(|err| AppError::Io(format!("cannot replace {}: {}", path.display(), err.error)))?;

    Ok(())
}
