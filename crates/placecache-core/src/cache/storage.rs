//! Durable storage backends for the location snapshot.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::error::StoreError;
use crate::models::CacheSnapshot;

/// File name of the persisted snapshot inside the cache directory
const SNAPSHOT_FILE: &str = "locations.json";

/// Key-value style persistence for the whole snapshot.
///
/// Implementations must make `save` all-or-nothing: after an error the
/// previously saved document is still the one `load` returns.
pub trait SnapshotStorage: Send + Sync {
    fn load(&self) -> Result<Option<CacheSnapshot>, StoreError>;
    fn save(&self, snapshot: &CacheSnapshot) -> Result<(), StoreError>;
    fn erase(&self) -> Result<(), StoreError>;
}

/// One pretty-printed JSON document in the cache directory.
pub struct JsonFileStorage {
    cache_dir: PathBuf,
}

impl JsonFileStorage {
    pub fn new(cache_dir: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    pub fn path(&self) -> PathBuf {
        self.cache_dir.join(SNAPSHOT_FILE)
    }

    fn temp_path(&self) -> PathBuf {
        self.cache_dir.join(format!("{}.tmp", SNAPSHOT_FILE))
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

impl SnapshotStorage for JsonFileStorage {
    fn load(&self) -> Result<Option<CacheSnapshot>, StoreError> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        let snapshot: CacheSnapshot = serde_json::from_str(&contents)?;
        debug!(path = %path.display(), provinces = snapshot.provinces.len(), "Loaded location snapshot");
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &CacheSnapshot) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.temp_path();
        let mut file = File::create(&tmp)?;
        file.write_all(contents.as_bytes())?;
        // data must be on disk before the rename publishes it
        file.sync_all()?;
        drop(file);
        std::fs::rename(&tmp, self.path())?;
        Ok(())
    }

    fn erase(&self) -> Result<(), StoreError> {
        let path = self.path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// In-process backend, used for tests and throwaway stores.
#[derive(Default)]
pub struct MemoryStorage {
    document: Mutex<Option<CacheSnapshot>>,
    fail_writes: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an already persisted snapshot.
    pub fn with_snapshot(snapshot: CacheSnapshot) -> Self {
        Self {
            document: Mutex::new(Some(snapshot)),
            ..Self::default()
        }
    }

    /// Make every subsequent `save`/`erase` fail until switched back.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// The currently persisted document.
    pub fn stored(&self) -> Option<CacheSnapshot> {
        self.document
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Storage("memory storage is read-only".to_string()));
        }
        Ok(())
    }
}

impl SnapshotStorage for MemoryStorage {
    fn load(&self) -> Result<Option<CacheSnapshot>, StoreError> {
        Ok(self.stored())
    }

    fn save(&self, snapshot: &CacheSnapshot) -> Result<(), StoreError> {
        self.check_writable()?;
        *self.document.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn erase(&self) -> Result<(), StoreError> {
        self.check_writable()?;
        *self.document.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Province;
    use chrono::Utc;

    fn sample() -> CacheSnapshot {
        CacheSnapshot {
            provinces: vec![Province::new(1, "Hà Nội")],
            last_updated: Some(Utc::now()),
            ..Default::default()
        }
    }

    #[test]
    fn test_file_storage_missing_document_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().to_path_buf()).unwrap();
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn test_file_storage_save_load_erase() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("nested")).unwrap();
        let snapshot = sample();

        storage.save(&snapshot).unwrap();
        assert!(storage.path().exists());
        assert!(!storage.temp_path().exists());
        assert_eq!(storage.load().unwrap(), Some(snapshot));

        storage.erase().unwrap();
        assert!(storage.load().unwrap().is_none());
        // erasing twice is fine
        storage.erase().unwrap();
    }

    #[test]
    fn test_file_storage_save_replaces_leftover_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().to_path_buf()).unwrap();
        storage.save(&CacheSnapshot::default()).unwrap();
        // an interrupted earlier write left a longer, half-written temp file
        std::fs::write(storage.temp_path(), "x".repeat(4096)).unwrap();

        let snapshot = sample();
        storage.save(&snapshot).unwrap();

        assert!(!storage.temp_path().exists());
        assert_eq!(storage.load().unwrap(), Some(snapshot));
    }

    #[test]
    fn test_file_storage_corrupt_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().to_path_buf()).unwrap();
        std::fs::write(storage.path(), "{not json").unwrap();
        assert!(matches!(storage.load(), Err(StoreError::Serialize(_))));
    }

    #[test]
    fn test_memory_storage_failing_writes_keep_previous_document() {
        let storage = MemoryStorage::with_snapshot(sample());
        storage.set_fail_writes(true);
        assert!(storage.save(&CacheSnapshot::default()).is_err());
        assert!(storage.erase().is_err());
        assert_eq!(storage.stored().unwrap().provinces.len(), 1);
        assert_eq!(storage.save_count(), 0);
    }
}
