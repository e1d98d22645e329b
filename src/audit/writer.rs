//! JSONL process audit log.
//!
//! One file per UTC day, `<log_dir>/audit-YYYY-MM-DD.jsonl`. The day comes
//! from the event's `finished_at`, so a process that completes just before
//! midnight is filed under that day even if the sink is called after it.
//! Each event is serialized up front and appended with a single write.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::NaiveDate;

use super::ProcessAuditSink;
use crate::config::GatewayConfig;
use crate::models::process::ProcessAuditEvent;
use crate::{AppError, Result};

/// The day file currently held open for appending.
struct DayLog {
    day: NaiveDate,
    file: File,
}

/// Appends completed-process events to daily JSONL files.
pub struct JsonlAuditWriter {
    log_dir: PathBuf,
    current: Mutex<Option<DayLog>>,
}

impl JsonlAuditWriter {
    /// Writer appending under `log_dir`, created if missing.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Audit`] if the directory cannot be created.
    pub fn new(log_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&log_dir).map_err(|err| {
            AppError::Audit(format!("cannot create {}: {err}", log_dir.display()))
        })?;
        Ok(Self {
            log_dir,
            current: Mutex::new(None),
        })
    }

    /// Writer for the project's `.command-gate/logs` directory.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Audit`] if the directory cannot be created.
    pub fn for_project(config: &GatewayConfig) -> Result<Self> {
        Self::new(config.audit_dir())
    }

    /// Directory the writer appends to.
    #[must_use]
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// File holding the events that finished on `day`.
    #[must_use]
    pub fn log_path(&self, day: NaiveDate) -> PathBuf {
        self.log_dir.join(format!("audit-{day}.jsonl"))
    }

    fn open_day(&self, day: NaiveDate) -> Result<DayLog> {
        let path = self.log_path(day);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| AppError::Audit(format!("cannot open {}: {err}", path.display())))?;
        Ok(DayLog { day, file })
    }
}

impl ProcessAuditSink for JsonlAuditWriter {
    fn record(&self, event: &ProcessAuditEvent) -> Result<()> {
        let mut line = serde_json::to_vec(event)
            .map_err(|err| AppError::Audit(format!("cannot serialize event: {err}")))?;
        line.push(b'\n');

        let day = event.finished_at.date_naive();
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let log = match current.take() {
            Some(log) if log.day == day => log,
            _ => self.open_day(day)?,
        };
        let log = current.insert(log);

        log.file
            .write_all(&line)
            .map_err(|err| AppError::Audit(format!("append to audit-{day}.jsonl failed: {err}")))
    }
}
