//! Finished task history.
//!
//! When a task reaches a terminal state its summary is handed to a
//! [`HistoryRecorder`]. Recording failures are logged by the caller and
//! never affect the task itself.

use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::{ManagerError, ManagerResult};
use super::progress::{InstallationTask, ResourceError, TaskStatus};

/// Summary of one finished task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub task_id: String,
    pub pack_id: String,
    pub pack_name: String,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub canceled: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ResourceError>,
}

impl HistoryEntry {
    /// Summarize a task snapshot.
    pub fn from_task(task: &InstallationTask) -> Self {
        let summary = task.summary();
        Self {
            task_id: task.task_id.clone(),
            pack_id: task.pack_id.clone(),
            pack_name: task.pack_name.clone(),
            status: task.status,
            started_at: task.started_at,
            finished_at: task.finished_at.unwrap_or_else(Utc::now),
            completed: summary.completed,
            skipped: summary.skipped,
            failed: summary.failed,
            canceled: summary.canceled,
            errors: summary.errors,
        }
    }
}

/// Sink for finished task summaries.
pub trait HistoryRecorder: Send + Sync {
    /// Store one entry.
    fn record(&self, entry: &HistoryEntry) -> ManagerResult<()>;

    /// Most recent entries, newest first.
    fn recent(&self, limit: usize) -> ManagerResult<Vec<HistoryEntry>>;
}

/// Recorder that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHistory;

impl HistoryRecorder for NoopHistory {
    fn record(&self, _entry: &HistoryEntry) -> ManagerResult<()> {
        Ok(())
    }

    fn recent(&self, _limit: usize) -> ManagerResult<Vec<HistoryEntry>> {
        Ok(Vec::new())
    }
}

/// Bounded in-memory history.
#[derive(Debug)]
pub struct MemoryHistory {
    capacity: usize,
    entries: Mutex<VecDeque<HistoryEntry>>,
}

impl MemoryHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }
}

impl HistoryRecorder for MemoryHistory {
    fn record(&self, entry: &HistoryEntry) -> ManagerResult<()> {
        let mut entries = self.entries.lock();
        entries.push_back(entry.clone());
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        Ok(())
    }

    fn recent(&self, limit: usize) -> ManagerResult<Vec<HistoryEntry>> {
        Ok(self.entries.lock().iter().rev().take(limit).cloned().collect())
    }
}

/// Append-only JSON-lines history file.
///
/// After each append the file is cut back to the newest `limit` lines.
#[derive(Debug)]
pub struct JsonlHistory {
    path: PathBuf,
    limit: usize,
    lock: Mutex<()>,
}

impl JsonlHistory {
    pub fn new(path: impl Into<PathBuf>, limit: usize) -> Self {
        Self {
            path: path.into(),
            limit: limit.max(1),
            lock: Mutex::new(()),
        }
    }

    /// History file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_lines(&self) -> ManagerResult<Vec<String>> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ManagerError::ReadFailed {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        BufReader::new(file)
            .lines()
            .filter(|line| !matches!(line, Ok(l) if l.trim().is_empty()))
            .collect::<io::Result<Vec<_>>>()
            .map_err(|source| ManagerError::ReadFailed {
                path: self.path.clone(),
                source,
            })
    }

    fn write_err(&self, source: io::Error) -> ManagerError {
        ManagerError::WriteFailed {
            path: self.path.clone(),
            source,
        }
    }
}

impl HistoryRecorder for JsonlHistory {
    fn record(&self, entry: &HistoryEntry) -> ManagerResult<()> {
        let _guard = self.lock.lock();

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| ManagerError::CreateDirFailed {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let line = serde_json::to_string(entry)
            .map_err(|e| self.write_err(io::Error::new(io::ErrorKind::InvalidData, e)))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.write_err(e))?;
        writeln!(file, "{}", line).map_err(|e| self.write_err(e))?;
        drop(file);

        let lines = self.read_lines()?;
        if lines.len() > self.limit {
            let keep = &lines[lines.len() - self.limit..];
            let mut contents = keep.join("\n");
            contents.push('\n');
            fs::write(&self.path, contents).map_err(|e| self.write_err(e))?;
        }
        Ok(())
    }

    fn recent(&self, limit: usize) -> ManagerResult<Vec<HistoryEntry>> {
        let _guard = self.lock.lock();
        let lines = self.read_lines()?;

        let mut entries = Vec::new();
        for line in lines.iter().rev() {
            if entries.len() >= limit {
                break;
            }
            match serde_json::from_str::<HistoryEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(path = %self.path.display(), error = %e, "Skipping bad history line"),
            }
        }
        Ok(entries)
    }
}
