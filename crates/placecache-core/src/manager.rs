//! One long-lived handle over the store, synchronizer and snapshot transfer.
//!
//! A view layer owns a single `LocationCacheManager` and uses it for every
//! read, sync, import/export and reset.

use std::sync::Arc;

use anyhow::Result;
use chrono::Duration;
use tokio::sync::watch;
use tracing::warn;

use crate::api::{HttpLocationSource, LocationSource};
use crate::cache::{JsonFileStorage, LocationStore, SnapshotTransfer};
use crate::config::Config;
use crate::error::{SyncError, TransferError};
use crate::models::{CacheSnapshot, CacheStats, District, Province, Ward};
use crate::sync::{SyncOptions, SyncProgress, SyncReport, Synchronizer};

pub struct LocationCacheManager {
    store: Arc<LocationStore>,
    synchronizer: Synchronizer,
    transfer: SnapshotTransfer,
}

impl LocationCacheManager {
    pub fn new(store: Arc<LocationStore>, source: Arc<dyn LocationSource>, options: SyncOptions) -> Self {
        Self {
            synchronizer: Synchronizer::new(store.clone(), source, options),
            transfer: SnapshotTransfer::new(store.clone()),
            store,
        }
    }

    /// Wire the file-backed store and HTTP source described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let storage = JsonFileStorage::new(config.cache_dir()?)?;
        let store = Arc::new(LocationStore::open(Arc::new(storage)));
        let source = HttpLocationSource::with_timeout(config.api_base_url.clone(), config.request_timeout())?;
        Ok(Self::new(store, Arc::new(source), config.sync_options()))
    }

    pub fn store(&self) -> &Arc<LocationStore> {
        &self.store
    }

    // ===== Reads =====

    pub fn snapshot(&self) -> CacheSnapshot {
        self.store.snapshot()
    }

    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    pub fn has_data(&self) -> bool {
        self.store.has_data()
    }

    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.store.is_stale(ttl)
    }

    pub fn version(&self) -> u64 {
        self.store.version()
    }

    pub fn provinces(&self) -> Vec<Province> {
        self.store.provinces()
    }

    pub fn districts_of(&self, province_code: i64) -> Vec<District> {
        self.store.districts_of(province_code)
    }

    pub fn wards_of(&self, district_code: i64) -> Vec<Ward> {
        self.store.wards_of(district_code)
    }

    // ===== Sync =====

    pub fn is_syncing(&self) -> bool {
        self.synchronizer.is_running()
    }

    pub fn progress(&self) -> SyncProgress {
        self.synchronizer.progress()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncProgress> {
        self.synchronizer.subscribe()
    }

    pub fn cancel_sync(&self) {
        self.synchronizer.cancel();
    }

    pub async fn sync_provinces(&self) -> Result<SyncReport, SyncError> {
        self.synchronizer.sync_provinces().await
    }

    pub async fn sync_all_districts(&self) -> Result<SyncReport, SyncError> {
        self.synchronizer.sync_all_districts().await
    }

    pub async fn sync_missing_districts(&self) -> Result<SyncReport, SyncError> {
        self.synchronizer.sync_missing_districts().await
    }

    pub async fn sync_wards_for_district(&self, district_code: i64) -> Result<SyncReport, SyncError> {
        self.synchronizer.sync_wards_for_district(district_code).await
    }

    pub async fn sync_wards_for_province(&self, province_code: i64) -> Result<SyncReport, SyncError> {
        self.synchronizer.sync_wards_for_province(province_code).await
    }

    pub async fn sync_missing_wards(&self, province_code: i64) -> Result<SyncReport, SyncError> {
        self.synchronizer.sync_missing_wards(province_code).await
    }

    pub async fn sync_all(&self) -> Result<SyncReport, SyncError> {
        self.synchronizer.sync_all().await
    }

    // ===== Transfer / reset =====

    pub fn export_snapshot(&self) -> Result<String, TransferError> {
        self.transfer.export()
    }

    /// Replace the cache with `document`; `false` if it is rejected or a
    /// sync run is active.
    pub fn import_snapshot(&self, document: &str) -> bool {
        match self.try_import_snapshot(document) {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Snapshot import rejected");
                false
            }
        }
    }

    /// Holds the run slot for the whole import so no sync can merge into
    /// the replaced snapshot.
    pub fn try_import_snapshot(&self, document: &str) -> Result<CacheStats, TransferError> {
        let _guard = self
            .synchronizer
            .exclusive()
            .map_err(|_| TransferError::SyncInProgress)?;
        self.transfer.try_import(document)
    }

    /// Reset to the empty snapshot. Refused while a sync run is writing.
    pub fn clear(&self) -> Result<(), SyncError> {
        let _guard = self.synchronizer.exclusive()?;
        self.store.clear()?;
        Ok(())
    }
}
