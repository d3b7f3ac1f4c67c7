use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{format_description::FormatItem, macros::format_description, OffsetDateTime};
use tracing::{debug, info, warn};

use crate::repairs::model::StoredRepair;
use crate::storage::write_json_atomic;

const FILE_PREFIX: &str = "repairs_backup_";
const FILE_SUFFIX: &str = ".json";
const SNAPSHOT_VERSION: &str = "1.0";

/// Fixed width so lexical order of file names is chronological order.
const STAMP_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year][month][day]T[hour][minute][second].[subsecond digits:9]Z"
);

/// Tie-breaker for snapshots taken within the same clock tick.
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("backup i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("backup not found: {0}")]
    NotFound(String),
    #[error("invalid backup name: {0}")]
    InvalidName(String),
    #[error("malformed backup {name}: {reason}")]
    Malformed { name: String, reason: String },
}

/// Immutable point-in-time copy of the whole collection, in its at-rest
/// (encrypted) form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub reason: String,
    pub version: String,
    pub record_count: usize,
    pub payload: Vec<StoredRepair>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotHeader {
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    reason: String,
    record_count: usize,
}

/// Listing entry for a snapshot file.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    pub filename: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
    pub reason: String,
    pub record_count: usize,
    pub size_bytes: u64,
}

/// Writes timestamped snapshots into one directory and keeps at most
/// `max_backups` of them.
#[derive(Debug, Clone)]
pub struct BackupManager {
    dir: PathBuf,
    max_backups: usize,
}

impl BackupManager {
    pub fn new(dir: impl Into<PathBuf>, max_backups: usize) -> Self {
        Self {
            dir: dir.into(),
            max_backups: max_backups.max(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_backups(&self) -> usize {
        self.max_backups
    }

    /// Write a snapshot, then prune. Returns the snapshot path once it is
    /// durably on disk.
    pub fn snapshot(&self, records: &[StoredRepair], reason: &str) -> Result<PathBuf, BackupError> {
        fs::create_dir_all(&self.dir)?;

        let now = OffsetDateTime::now_utc();
        let stamp = now
            .format(STAMP_FORMAT)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let reason = sanitize_reason(reason);
        let filename = format!("{FILE_PREFIX}{stamp}_{seq:06}_{reason}{FILE_SUFFIX}");
        let path = self.dir.join(&filename);

        let snapshot = Snapshot {
            timestamp: now,
            reason,
            version: SNAPSHOT_VERSION.to_string(),
            record_count: records.len(),
            payload: records.to_vec(),
        };
        write_json_atomic(&path, &snapshot)?;
        info!(%filename, records = records.len(), "backup created");

        // The snapshot is already durable; retention is best effort.
        match self.prune() {
            Ok(pruned) if !pruned.is_empty() => {
                debug!(count = pruned.len(), "old backups pruned");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "backup retention failed"),
        }
        Ok(path)
    }

    /// All snapshots, most recent first. Unreadable files are still listed
    /// with reason `unknown`.
    pub fn list(&self) -> Result<Vec<BackupInfo>, BackupError> {
        let mut infos = Vec::new();
        for filename in self.snapshot_names()? {
            let path = self.dir.join(&filename);
            let size_bytes = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            let info = match read_header(&path) {
                Ok(header) => BackupInfo {
                    filename,
                    timestamp: Some(header.timestamp),
                    reason: header.reason,
                    record_count: header.record_count,
                    size_bytes,
                },
                Err(e) => {
                    warn!(%filename, error = %e, "unreadable backup");
                    BackupInfo {
                        filename,
                        timestamp: None,
                        reason: "unknown".into(),
                        record_count: 0,
                        size_bytes,
                    }
                }
            };
            infos.push(info);
        }
        Ok(infos)
    }

    /// Load the payload of one snapshot by file name.
    pub fn restore(&self, filename: &str) -> Result<Vec<StoredRepair>, BackupError> {
        validate_name(filename)?;
        let path = self.dir.join(filename);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BackupError::NotFound(filename.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let snapshot: Snapshot =
            serde_json::from_slice(&raw).map_err(|e| BackupError::Malformed {
                name: filename.to_string(),
                reason: e.to_string(),
            })?;
        if snapshot.record_count != snapshot.payload.len() {
            return Err(BackupError::Malformed {
                name: filename.to_string(),
                reason: format!(
                    "declares {} records, holds {}",
                    snapshot.record_count,
                    snapshot.payload.len()
                ),
            });
        }
        info!(%filename, records = snapshot.record_count, "backup loaded for restore");
        Ok(snapshot.payload)
    }

    /// Delete the oldest snapshots beyond the retention limit.
    pub fn prune(&self) -> Result<Vec<PathBuf>, BackupError> {
        let mut deleted = Vec::new();
        for filename in self.snapshot_names()?.into_iter().skip(self.max_backups) {
            let path = self.dir.join(&filename);
            fs::remove_file(&path)?;
            debug!(%filename, "backup deleted");
            deleted.push(path);
        }
        Ok(deleted)
    }

    /// Snapshot file names, newest first.
    fn snapshot_names(&self) -> Result<Vec<String>, BackupError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        for entry in entries {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX) {
                names.push(name);
            }
        }
        names.sort_unstable_by(|a, b| b.cmp(a));
        Ok(names)
    }
}

fn read_header(path: &Path) -> Result<SnapshotHeader, BackupError> {
    let raw = fs::read(path)?;
    serde_json::from_slice(&raw).map_err(|e| BackupError::Malformed {
        name: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn sanitize_reason(reason: &str) -> String {
    let cleaned: String = reason
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(64)
        .collect();
    if cleaned.is_empty() {
        "manual".into()
    } else {
        cleaned
    }
}

fn validate_name(filename: &str) -> Result<(), BackupError> {
    let ok = filename.starts_with(FILE_PREFIX)
        && filename.ends_with(FILE_SUFFIX)
        && !filename.contains(['/', '\\'])
        && !filename.contains("..");
    if ok {
        Ok(())
    } else {
        Err(BackupError::InvalidName(filename.to_string()))
    }
}
