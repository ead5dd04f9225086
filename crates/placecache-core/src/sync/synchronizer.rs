//! Bulk population of the location store from a remote source.
//!
//! Parents are fetched one at a time with a fixed pause in between. A
//! failed parent is logged and skipped, fetched children are flushed into
//! the store every few parents, and only one run may be active at a time.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::progress::{ParentFailure, ParentLevel, SyncPhase, SyncProgress, SyncReport};
use crate::api::{ApiError, LocationSource};
use crate::cache::LocationStore;
use crate::error::{StoreError, SyncError};
use crate::models::{District, Ward};

/// Parents processed between two flushes into the store.
pub const DEFAULT_FLUSH_EVERY: usize = 5;

/// Pause between two parent fetches, in milliseconds.
pub const DEFAULT_FETCH_DELAY_MS: u64 = 50;

/// Upper bound for a single fetch, in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub flush_every: usize,
    pub fetch_delay: Duration,
    pub fetch_timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            flush_every: DEFAULT_FLUSH_EVERY,
            fetch_delay: Duration::from_millis(DEFAULT_FETCH_DELAY_MS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        }
    }
}

/// Children fetched but not yet merged into the store.
#[derive(Default)]
struct ChildBuffer {
    districts: Vec<District>,
    wards: Vec<Ward>,
}

impl ChildBuffer {
    fn is_empty(&self) -> bool {
        self.districts.is_empty() && self.wards.is_empty()
    }

    fn flush(&mut self, store: &LocationStore) -> Result<usize, StoreError> {
        let districts = std::mem::take(&mut self.districts);
        let wards = std::mem::take(&mut self.wards);
        let merged = districts.len() + wards.len();
        store.upsert_districts(districts)?;
        store.upsert_wards(wards)?;
        Ok(merged)
    }
}

/// Holds the single run slot; clears the running flag however the holder ends.
pub struct RunGuard<'a> {
    running: &'a AtomicBool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

pub struct Synchronizer {
    store: Arc<LocationStore>,
    source: Arc<dyn LocationSource>,
    options: SyncOptions,
    running: AtomicBool,
    cancel_requested: AtomicBool,
    progress: watch::Sender<SyncProgress>,
}

impl Synchronizer {
    pub fn new(store: Arc<LocationStore>, source: Arc<dyn LocationSource>, options: SyncOptions) -> Self {
        let (progress, _) = watch::channel(SyncProgress::default());
        Self {
            store,
            source,
            options,
            running: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
            progress,
        }
    }

    pub fn store(&self) -> &Arc<LocationStore> {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Latest published progress.
    pub fn progress(&self) -> SyncProgress {
        self.progress.borrow().clone()
    }

    /// Receive every progress update as it is published.
    pub fn subscribe(&self) -> watch::Receiver<SyncProgress> {
        self.progress.subscribe()
    }

    /// Ask the active run to stop at the next parent boundary. Whatever is
    /// buffered is still flushed before the run returns.
    pub fn cancel(&self) {
        if self.is_running() {
            info!("Sync cancellation requested");
            self.cancel_requested.store(true, Ordering::SeqCst);
        }
    }

    /// Claim the run slot for a writer other than a sync run, so no run can
    /// start until the guard is dropped. `Busy` if a run is active.
    pub fn exclusive(&self) -> Result<RunGuard<'_>, SyncError> {
        self.begin()
    }

    fn begin(&self) -> Result<RunGuard<'_>, SyncError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Sync requested while another run is active");
            return Err(SyncError::Busy);
        }
        self.cancel_requested.store(false, Ordering::SeqCst);
        Ok(RunGuard {
            running: &self.running,
        })
    }

    fn publish(&self, progress: SyncProgress) {
        self.progress.send_replace(progress);
    }

    fn finish(&self, result: Result<SyncReport, SyncError>) -> Result<SyncReport, SyncError> {
        let last = self.progress();
        match &result {
            Ok(report) => {
                info!(summary = %report.summary(), "Sync run complete");
                self.publish(SyncProgress::new(
                    SyncPhase::Complete,
                    last.current,
                    last.total,
                    report.summary(),
                ));
            }
            Err(e) => {
                error!(error = %e, "Sync run failed");
                self.publish(SyncProgress::new(SyncPhase::Error, last.current, last.total, e.to_string()));
            }
        }
        result
    }

    async fn bounded<T, F>(&self, fetch: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        match tokio::time::timeout(self.options.fetch_timeout, fetch).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(self.options.fetch_timeout)),
        }
    }

    // =========================================================================
    // Public runs
    // =========================================================================

    /// Fetch the province list and merge it as one batch.
    pub async fn sync_provinces(&self) -> Result<SyncReport, SyncError> {
        let _guard = self.begin()?;
        let result = self.province_phase().await;
        self.finish(result)
    }

    /// Fetch districts for every cached province.
    pub async fn sync_all_districts(&self) -> Result<SyncReport, SyncError> {
        let _guard = self.begin()?;
        let parents = self.store.provinces().iter().map(|p| p.code).collect();
        let result = self.children_phase(ParentLevel::Province, parents).await;
        self.finish(result)
    }

    /// Fetch districts only for provinces that have none cached.
    pub async fn sync_missing_districts(&self) -> Result<SyncReport, SyncError> {
        let _guard = self.begin()?;
        let parents = self
            .store
            .provinces_without_districts()
            .iter()
            .map(|p| p.code)
            .collect();
        let result = self.children_phase(ParentLevel::Province, parents).await;
        self.finish(result)
    }

    pub async fn sync_wards_for_district(&self, district_code: i64) -> Result<SyncReport, SyncError> {
        let _guard = self.begin()?;
        let result = self.children_phase(ParentLevel::District, vec![district_code]).await;
        self.finish(result)
    }

    /// Fetch wards for every cached district of one province.
    pub async fn sync_wards_for_province(&self, province_code: i64) -> Result<SyncReport, SyncError> {
        let _guard = self.begin()?;
        let parents = self
            .store
            .districts_of(province_code)
            .iter()
            .map(|d| d.code)
            .collect();
        let result = self.children_phase(ParentLevel::District, parents).await;
        self.finish(result)
    }

    /// Fetch wards only for districts of `province_code` that have none cached.
    pub async fn sync_missing_wards(&self, province_code: i64) -> Result<SyncReport, SyncError> {
        let _guard = self.begin()?;
        let parents = self
            .store
            .districts_without_wards(province_code)
            .iter()
            .map(|d| d.code)
            .collect();
        let result = self.children_phase(ParentLevel::District, parents).await;
        self.finish(result)
    }

    /// Provinces, then districts of every province, then wards of every district.
    pub async fn sync_all(&self) -> Result<SyncReport, SyncError> {
        let _guard = self.begin()?;
        let result = self.full_run().await;
        self.finish(result)
    }

    async fn full_run(&self) -> Result<SyncReport, SyncError> {
        let mut report = self.province_phase().await?;

        let provinces = self.store.provinces().iter().map(|p| p.code).collect();
        report.absorb(self.children_phase(ParentLevel::Province, provinces).await?);
        if report.cancelled {
            return Ok(report);
        }

        let districts = self.store.snapshot().districts.iter().map(|d| d.code).collect();
        report.absorb(self.children_phase(ParentLevel::District, districts).await?);
        Ok(report)
    }

    // =========================================================================
    // Phases
    // =========================================================================

    async fn province_phase(&self) -> Result<SyncReport, SyncError> {
        info!("Syncing provinces");
        self.publish(SyncProgress::new(SyncPhase::FetchingProvinces, 0, 1, "Fetching provinces"));

        let provinces = self.bounded(self.source.fetch_provinces()).await?;
        let count = provinces.len();
        self.store.upsert_provinces(provinces)?;

        self.publish(SyncProgress::new(
            SyncPhase::FetchingProvinces,
            1,
            1,
            format!("{} provinces cached", count),
        ));
        Ok(SyncReport {
            provinces_merged: count,
            ..Default::default()
        })
    }

    async fn children_phase(&self, level: ParentLevel, parents: Vec<i64>) -> Result<SyncReport, SyncError> {
        let total = parents.len();
        let flush_every = self.options.flush_every.max(1);
        let mut report = SyncReport {
            parents_total: total,
            ..Default::default()
        };
        let mut buffer = ChildBuffer::default();

        info!(?level, parents = total, "Syncing children");
        self.publish(SyncProgress::new(SyncPhase::FetchingChildren, 0, total, "Starting"));

        for (i, &code) in parents.iter().enumerate() {
            if self.cancel_requested.load(Ordering::SeqCst) {
                report.cancelled = true;
                break;
            }
            if i > 0 && !self.options.fetch_delay.is_zero() {
                tokio::time::sleep(self.options.fetch_delay).await;
            }

            let status = match self.fetch_children(level, code, &mut buffer).await {
                Ok(count) => {
                    report.parents_synced += 1;
                    format!("{:?} {}: {} fetched", level, code, count)
                }
                Err(e) => {
                    warn!(?level, code, error = %e, "Failed to fetch children, skipping");
                    report.failures.push(ParentFailure {
                        level,
                        code,
                        error: e.to_string(),
                    });
                    format!("{:?} {}: failed ({})", level, code, e)
                }
            };

            let processed = i + 1;
            if processed % flush_every == 0 || processed == total {
                report.items_merged += self.flush(&mut buffer)?;
            }
            self.publish(SyncProgress::new(SyncPhase::FetchingChildren, processed, total, status));
        }

        if !buffer.is_empty() {
            report.items_merged += self.flush(&mut buffer)?;
        }
        Ok(report)
    }

    async fn fetch_children(&self, level: ParentLevel, code: i64, buffer: &mut ChildBuffer) -> Result<usize, ApiError> {
        match level {
            ParentLevel::Province => {
                let districts = self.bounded(self.source.fetch_districts(code)).await?;
                let count = districts.len();
                buffer.districts.extend(districts);
                Ok(count)
            }
            ParentLevel::District => {
                let wards = self.bounded(self.source.fetch_wards(code)).await?;
                let count = wards.len();
                buffer.wards.extend(wards);
                Ok(count)
            }
        }
    }

    fn flush(&self, buffer: &mut ChildBuffer) -> Result<usize, SyncError> {
        let merged = buffer.flush(&self.store)?;
        debug!(merged, "Flushed children into store");
        Ok(merged)
    }
}
