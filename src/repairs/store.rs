//! JSON-file repository for repair tickets.
//!
//! PII is encrypted on the way to disk and decrypted on the way out. Every
//! commit first snapshots the current file through the [`BackupManager`],
//! then replaces the file atomically. Mutations run as read-modify-write over
//! the whole collection under one lock.

use std::path::{Path, PathBuf};

use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::backup::{BackupError, BackupInfo, BackupManager};
use crate::crypto::{hash, hash_email, CryptoError, FieldCipher};
use crate::repairs::model::{Repair, RepairStatus, StoredRepair};
use crate::storage::{read_json, write_json_atomic};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("data file i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("record {id}: {source}")]
    Crypto {
        id: String,
        #[source]
        source: CryptoError,
    },
    #[error(transparent)]
    Backup(#[from] BackupError),
    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Outcome of a commit. The data write succeeded; the snapshot taken before
/// it may not have.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub backup: Option<String>,
    pub backup_warning: Option<String>,
}

pub struct SecureStore {
    file: DataFile,
    write_lock: Mutex<()>,
}

/// On-disk half of the store. Cloned into blocking tasks for commits.
#[derive(Clone)]
struct DataFile {
    path: PathBuf,
    cipher: FieldCipher,
    backups: BackupManager,
}

impl SecureStore {
    /// Open the data file, creating it when absent, and migrate legacy
    /// records: missing statuses are backfilled and plaintext PII is
    /// re-encrypted.
    pub fn open(
        path: impl Into<PathBuf>,
        cipher: FieldCipher,
        backups: BackupManager,
    ) -> Result<Self, StoreError> {
        let file = DataFile {
            path: path.into(),
            cipher,
            backups,
        };

        if !file.path.exists() {
            write_json_atomic(&file.path, &Vec::<StoredRepair>::new())?;
            info!(path = %file.path.display(), "data file created");
        }

        let migrated = file.migrate_legacy()?;
        if migrated > 0 {
            info!(migrated, "legacy records migrated");
        }
        Ok(Self {
            file,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }

    pub fn backups(&self) -> &BackupManager {
        &self.file.backups
    }

    /// Every record, PII decrypted.
    pub fn read_all(&self) -> Result<Vec<Repair>, StoreError> {
        self.file.read_all()
    }

    /// Exact-match lookup on the stored email hash; only matches are
    /// decrypted.
    pub fn find_by_email(&self, email: &str) -> Result<Vec<Repair>, StoreError> {
        let digest = hash_email(email);
        self.file.find_where(|r| r.email_hash == digest)
    }

    pub fn find_by_phone(&self, phone: &str) -> Result<Vec<Repair>, StoreError> {
        let digest = hash(phone);
        self.file.find_where(|r| r.phone_hash == digest)
    }

    /// Runs the snapshot, sealing and write on the blocking pool. Callers
    /// hold the write lock.
    async fn commit(
        &self,
        records: Vec<Repair>,
        reason: &str,
    ) -> Result<(Vec<Repair>, WriteReport), StoreError> {
        let file = self.file.clone();
        let reason = reason.to_string();
        tokio::task::spawn_blocking(move || {
            let report = file.commit(&records, &reason)?;
            Ok((records, report))
        })
        .await?
    }

    /// Replace the whole collection.
    pub async fn write_all(&self, records: &[Repair], reason: &str) -> Result<WriteReport, StoreError> {
        let _guard = self.write_lock.lock().await;
        let (_, report) = self.commit(records.to_vec(), reason).await?;
        Ok(report)
    }

    /// Read-modify-write under the store lock. Nothing is written when
    /// `transform` fails.
    pub async fn mutate<T, E, F>(&self, reason: &str, transform: F) -> Result<(T, WriteReport), E>
    where
        F: FnOnce(&mut Vec<Repair>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let _guard = self.write_lock.lock().await;
        let mut records = self.file.read_all()?;
        let out = transform(&mut records)?;
        let (_, report) = self.commit(records, reason).await?;
        Ok((out, report))
    }

    /// Manual snapshot of the current file.
    pub async fn snapshot(&self, reason: &str) -> Result<PathBuf, StoreError> {
        let _guard = self.write_lock.lock().await;
        let current = self.file.read_stored()?;
        Ok(self.file.backups.snapshot(&current, reason)?)
    }

    pub fn list_backups(&self) -> Result<Vec<BackupInfo>, StoreError> {
        Ok(self.file.backups.list()?)
    }

    /// Make a snapshot's payload the current collection. The state being
    /// replaced is itself snapshotted first.
    pub async fn restore_from_backup(&self, filename: &str) -> Result<(usize, WriteReport), StoreError> {
        let _guard = self.write_lock.lock().await;
        let payload = self.file.backups.restore(filename)?;
        let records = payload
            .into_iter()
            .map(|r| self.file.open_record(r))
            .collect::<Result<Vec<_>, _>>()?;
        let (records, report) = self.commit(records, "before_restore").await?;
        info!(%filename, records = records.len(), "backup restored");
        Ok((records.len(), report))
    }
}

impl DataFile {
    fn migrate_legacy(&self) -> Result<usize, StoreError> {
        let stored = self.read_stored()?;
        let missing = stored
            .iter()
            .filter(|r| {
                r.status.is_none()
                    || !FieldCipher::is_encrypted(&r.email)
                    || !FieldCipher::is_encrypted(&r.phone)
            })
            .count();
        if missing == 0 {
            return Ok(0);
        }

        let now = OffsetDateTime::now_utc();
        let mut records = Vec::with_capacity(stored.len());
        for record in stored {
            let needs_status = record.status.is_none();
            let mut repair = self.open_record(record)?;
            if needs_status {
                repair.status = RepairStatus::Pending;
                repair.updated_at = now;
            }
            records.push(repair);
        }
        self.commit(&records, "migration")?;
        Ok(missing)
    }

    fn read_stored(&self) -> Result<Vec<StoredRepair>, StoreError> {
        Ok(read_json::<Vec<StoredRepair>, _>(&self.path)?.unwrap_or_default())
    }

    fn open_record(&self, record: StoredRepair) -> Result<Repair, StoreError> {
        let id = record.id.clone();
        record.open(&self.cipher).map_err(|source| {
            error!(%id, error = %source, "cannot decrypt record");
            StoreError::Crypto { id, source }
        })
    }

    fn read_all(&self) -> Result<Vec<Repair>, StoreError> {
        self.read_stored()?
            .into_iter()
            .map(|r| self.open_record(r))
            .collect()
    }

    fn find_where(&self, pred: impl Fn(&StoredRepair) -> bool) -> Result<Vec<Repair>, StoreError> {
        self.read_stored()?
            .into_iter()
            .filter(|r| pred(r))
            .map(|r| self.open_record(r))
            .collect()
    }

    /// Snapshot what is on disk, then atomically replace it with `records`.
    /// A failed snapshot is logged and reported, not fatal.
    fn commit(&self, records: &[Repair], reason: &str) -> Result<WriteReport, StoreError> {
        let mut report = WriteReport::default();
        let snapshot = self
            .read_stored()
            .and_then(|current| Ok(self.backups.snapshot(&current, reason)?));
        match snapshot {
            Ok(path) => {
                report.backup = path.file_name().map(|n| n.to_string_lossy().into_owned());
            }
            Err(e) => {
                warn!(error = %e, %reason, "backup before write failed; continuing");
                report.backup_warning = Some("backup before write failed".into());
            }
        }

        let sealed = records
            .iter()
            .map(|r| {
                StoredRepair::seal(r, &self.cipher).map_err(|source| StoreError::Crypto {
                    id: r.id.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        write_json_atomic(&self.path, &sealed)?;
        debug!(records = sealed.len(), %reason, "data file committed");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repairs::model::sample_repair;
    use crate::storage::temp_path;
    use std::sync::Arc;
    use tempfile::TempDir;

    const KEY: [u8; 32] = [9u8; 32];

    fn open_store(dir: &TempDir) -> SecureStore {
        SecureStore::open(
            dir.path().join("repairs.json"),
            FieldCipher::new(&KEY),
            BackupManager::new(dir.path().join("backups"), 10),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn open_creates_empty_file() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert!(store.path().exists());
        assert!(store.read_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_encrypts_and_read_decrypts() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store
            .write_all(&[sample_repair("repair_1")], "test")
            .await
            .unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("jean@x.fr"));
        assert!(!raw.contains("0601020304"));
        assert!(raw.contains("enc:v1:"));

        let records = store.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].email, "jean@x.fr");
        assert_eq!(records[0].phone, "0601020304");
    }

    #[tokio::test]
    async fn every_write_snapshots_previous_state() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let r1 = store.write_all(&[sample_repair("a")], "first").await.unwrap();
        let r2 = store
            .write_all(&[sample_repair("a"), sample_repair("b")], "second")
            .await
            .unwrap();
        assert!(r1.backup.is_some());
        assert!(r2.backup_warning.is_none());

        let backups = store.list_backups().unwrap();
        assert_eq!(backups.len(), 2);
        assert_eq!(backups[0].reason, "second");
        assert_eq!(backups[0].record_count, 1);
        assert_eq!(backups[1].record_count, 0);
    }

    #[tokio::test]
    async fn backup_failure_does_not_block_write() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "file in the way").unwrap();
        let store = SecureStore::open(
            dir.path().join("repairs.json"),
            FieldCipher::new(&KEY),
            BackupManager::new(&blocker, 10),
        )
        .unwrap();

        let report = store.write_all(&[sample_repair("a")], "test").await.unwrap();
        assert!(report.backup.is_none());
        assert!(report.backup_warning.is_some());
        assert_eq!(store.read_all().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_transform_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let result: Result<((), WriteReport), StoreError> = store
            .mutate("noop", |_| {
                Err(StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "rejected",
                )))
            })
            .await;
        assert!(result.is_err());
        assert!(store.list_backups().unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_mutations_do_not_lose_updates() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SecureStore::open(
            dir.path().join("repairs.json"),
            FieldCipher::new(&KEY),
            BackupManager::new(dir.path().join("backups"), 3),
        )
        .unwrap());

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .mutate::<_, StoreError, _>("add", |records| {
                        records.push(sample_repair(&format!("repair_{i}")));
                        Ok(())
                    })
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(store.read_all().unwrap().len(), 16);
        assert_eq!(store.list_backups().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn interrupted_write_keeps_committed_file() {
        let dir = TempDir::new().unwrap();
        {
            let store = open_store(&dir);
            store.write_all(&[sample_repair("kept")], "test").await.unwrap();
            std::fs::write(temp_path(store.path()), b"[{\"id\": \"half").unwrap();
        }

        let reopened = open_store(&dir);
        let records = reopened.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "kept");
    }

    #[tokio::test]
    async fn open_backfills_missing_status_and_encrypts_legacy_plaintext() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repairs.json");
        let legacy = serde_json::json!([{
            "id": "legacy_1",
            "firstName": "Jean",
            "lastName": "Dupont",
            "email": "jean@x.fr",
            "emailHash": hash_email("jean@x.fr"),
            "phone": "0601020304",
            "phoneHash": hash("0601020304"),
            "serialNumber": "SN1",
            "fault": "no power",
            "price": 20.0,
            "returnDate": "2025-01-01",
            "responsibleInitials": "AB",
            "createdAt": "2024-12-01T10:00:00Z",
            "updatedAt": "2024-12-01T10:00:00Z",
            "createdBy": "admin"
        }]);
        std::fs::write(&path, serde_json::to_vec(&legacy).unwrap()).unwrap();

        let store = open_store(&dir);
        let records = store.read_all().unwrap();
        assert_eq!(records[0].status, RepairStatus::Pending);
        assert_eq!(records[0].email, "jean@x.fr");

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"status\": \"pending\""));
        assert!(!raw.contains("jean@x.fr"));

        let backups = store.list_backups().unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].reason, "migration");
    }

    #[tokio::test]
    async fn open_encrypts_plaintext_pii_even_when_status_present() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repairs.json");
        let legacy = serde_json::json!([{
            "id": "legacy_2",
            "firstName": "Jean",
            "lastName": "Dupont",
            "email": "jean@x.fr",
            "emailHash": hash_email("jean@x.fr"),
            "phone": "0601020304",
            "phoneHash": hash("0601020304"),
            "serialNumber": "SN2",
            "fault": "cracked screen",
            "price": 80.0,
            "returnDate": "2025-02-01",
            "responsibleInitials": "CD",
            "status": "in_progress",
            "createdAt": "2024-12-01T10:00:00Z",
            "updatedAt": "2024-12-02T10:00:00Z",
            "createdBy": "admin"
        }]);
        std::fs::write(&path, serde_json::to_vec(&legacy).unwrap()).unwrap();

        let store = open_store(&dir);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("jean@x.fr"));
        assert!(!raw.contains("0601020304"));
        assert!(raw.contains("enc:v1:"));

        let records = store.read_all().unwrap();
        assert_eq!(records[0].status, RepairStatus::InProgress);
        assert_eq!(records[0].email, "jean@x.fr");
        assert_eq!(records[0].phone, "0601020304");
    }

    #[tokio::test]
    async fn open_leaves_encrypted_file_untouched() {
        let dir = TempDir::new().unwrap();
        {
            let store = open_store(&dir);
            store.write_all(&[sample_repair("a")], "seed").await.unwrap();
        }
        let before = std::fs::read_to_string(dir.path().join("repairs.json")).unwrap();
        let store = open_store(&dir);
        let after = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(before, after);
        assert_eq!(store.list_backups().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lookup_by_hash() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let mut other = sample_repair("b");
        other.email = "marie@x.fr".into();
        other.phone = "0711223344".into();
        store
            .write_all(&[sample_repair("a"), other], "test")
            .await
            .unwrap();

        let found = store.find_by_email("JEAN@x.fr").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a");

        let found = store.find_by_phone("0711223344").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "b");

        assert!(store.find_by_email("nobody@x.fr").unwrap().is_empty());
    }

    #[tokio::test]
    async fn wrong_key_fails_loudly() {
        let dir = TempDir::new().unwrap();
        open_store(&dir)
            .write_all(&[sample_repair("a")], "test")
            .await
            .unwrap();

        let other = SecureStore::open(
            dir.path().join("repairs.json"),
            FieldCipher::new(&[1u8; 32]),
            BackupManager::new(dir.path().join("backups"), 10),
        )
        .unwrap();
        assert!(matches!(other.read_all(), Err(StoreError::Crypto { .. })));
    }

    #[tokio::test]
    async fn restore_replaces_collection() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.write_all(&[sample_repair("a")], "first").await.unwrap();
        let snap = store.snapshot("manual").await.unwrap();
        store
            .write_all(&[sample_repair("a"), sample_repair("b")], "second")
            .await
            .unwrap();

        let name = snap.file_name().unwrap().to_string_lossy().into_owned();
        let (count, report) = store.restore_from_backup(&name).await.unwrap();
        assert_eq!(count, 1);
        assert!(report.backup.is_some());
        assert_eq!(store.read_all().unwrap().len(), 1);
    }
}
