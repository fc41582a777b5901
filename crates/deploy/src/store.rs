//! Durable storage for deployment records.
//!
//! The orchestrator only needs keyed `get`/`put`; resuming a run relies on every `put` being
//! durable before the next network call.

use std::{
    collections::BTreeMap,
    fs::File,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{DeploymentRecord, StoreError, UnitId, fs::FsHandler};

/// Key-value storage for [`DeploymentRecord`]s, keyed by unit id.
pub trait RecordStore {
    fn get(&self, unit: &UnitId) -> Result<Option<DeploymentRecord>, StoreError>;

    /// Insert or overwrite the record for `record.unit`.
    fn put(&mut self, record: DeploymentRecord) -> Result<(), StoreError>;
}

impl<S: RecordStore + ?Sized> RecordStore for &mut S {
    fn get(&self, unit: &UnitId) -> Result<Option<DeploymentRecord>, StoreError> {
        (**self).get(unit)
    }

    fn put(&mut self, record: DeploymentRecord) -> Result<(), StoreError> {
        (**self).put(record)
    }
}

/// In-memory record store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: BTreeMap<UnitId, DeploymentRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> impl Iterator<Item = &DeploymentRecord> {
        self.records.values()
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, unit: &UnitId) -> Result<Option<DeploymentRecord>, StoreError> {
        Ok(self.records.get(unit).cloned())
    }

    fn put(&mut self, record: DeploymentRecord) -> Result<(), StoreError> {
        self.records.insert(record.unit.clone(), record);
        Ok(())
    }
}

/// On-disk shape of a record store file.
#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    #[serde(default)]
    records: BTreeMap<UnitId, DeploymentRecord>,
}

/// JSON file record store, one file per target network.
///
/// Records live in `<dir>/<network>.json`. Every `put` rewrites the file atomically. An exclusive
/// lock on `<dir>/<network>.lock` is held while the store is open, so two runs cannot deploy
/// against the same network from the same store at once.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    records: BTreeMap<UnitId, DeploymentRecord>,
    _lock: File,
}

impl FileStore {
    /// Current on-disk format version.
    pub const VERSION: u32 = 1;

    /// Open (or create) the store for `network` under `dir`, taking its lock.
    pub fn open(dir: &Path, network: &str) -> Result<Self, StoreError> {
        let path = Self::path_for(dir, network)?;
        FsHandler::create_dir(dir).map_err(|source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let lock_path = dir.join(format!("{network}.lock"));
        let lock = FsHandler::try_lock(&lock_path)
            .map_err(|source| StoreError::Io {
                path: lock_path.clone(),
                source,
            })?
            .ok_or(StoreError::Locked { path: lock_path })?;

        let records = Self::read_records(&path)?;
        tracing::debug!(path = %path.display(), records = records.len(), "Record store opened");

        Ok(Self {
            path,
            records,
            _lock: lock,
        })
    }

    /// Read the records of a store without locking it.
    pub fn load_records(
        dir: &Path,
        network: &str,
    ) -> Result<BTreeMap<UnitId, DeploymentRecord>, StoreError> {
        Self::read_records(&Self::path_for(dir, network)?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> impl Iterator<Item = &DeploymentRecord> {
        self.records.values()
    }

    /// Store file of `network` under `dir`. The name must stay a plain file name inside `dir`.
    fn path_for(dir: &Path, network: &str) -> Result<PathBuf, StoreError> {
        let plain = !network.is_empty()
            && !network.starts_with('.')
            && network
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !plain {
            return Err(StoreError::InvalidNetwork {
                name: network.to_string(),
            });
        }
        Ok(dir.join(format!("{network}.json")))
    }

    fn read_records(path: &Path) -> Result<BTreeMap<UnitId, DeploymentRecord>, StoreError> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: StoreFile = serde_json::from_str(&content).map_err(|e| StoreError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        if file.version != Self::VERSION {
            return Err(StoreError::VersionMismatch {
                path: path.to_path_buf(),
                found: file.version,
                expected: Self::VERSION,
            });
        }

        Ok(file.records)
    }

    fn flush(&self) -> Result<(), StoreError> {
        let file = StoreFile {
            version: Self::VERSION,
            records: self.records.clone(),
        };
        let content = serde_json::to_vec_pretty(&file).map_err(|e| StoreError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        })?;

        FsHandler::write_atomic(&self.path, &content).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl RecordStore for FileStore {
    fn get(&self, unit: &UnitId) -> Result<Option<DeploymentRecord>, StoreError> {
        Ok(self.records.get(unit).cloned())
    }

    fn put(&mut self, record: DeploymentRecord) -> Result<(), StoreError> {
        let previous = self.records.insert(record.unit.clone(), record.clone());
        if let Err(e) = self.flush() {
            // Keep memory consistent with what is on disk.
            match previous {
                Some(previous) => self.records.insert(record.unit, previous),
                None => self.records.remove(&record.unit),
            };
            return Err(e);
        }
        tracing::trace!(unit = %record.unit, state = record.status.label(), "Record persisted");
        Ok(())
    }
}
