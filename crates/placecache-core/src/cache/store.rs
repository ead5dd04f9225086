//! The location store: single source of truth for the cached hierarchy.
//!
//! All reads and writes go through [`LocationStore`]. Every write is
//! write-through: the next state is built aside, persisted, and only then
//! swapped in, so memory and the durable copy never diverge.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};

use crate::cache::storage::{MemoryStorage, SnapshotStorage};
use crate::error::StoreError;
use crate::models::{CacheSnapshot, CacheStats, Coded, District, Province, Ward};

#[derive(Debug, Clone, Default)]
struct StoreState {
    snapshot: CacheSnapshot,
    province_index: HashMap<i64, usize>,
    district_index: HashMap<i64, usize>,
    ward_index: HashMap<i64, usize>,
}

impl StoreState {
    /// Build indexed state from a snapshot, collapsing duplicate codes.
    fn from_snapshot(snapshot: CacheSnapshot) -> Self {
        let mut state = StoreState {
            snapshot: CacheSnapshot {
                last_updated: snapshot.last_updated,
                ..Default::default()
            },
            ..Default::default()
        };
        merge_into(&mut state.snapshot.provinces, &mut state.province_index, snapshot.provinces);
        merge_into(&mut state.snapshot.districts, &mut state.district_index, snapshot.districts);
        merge_into(&mut state.snapshot.wards, &mut state.ward_index, snapshot.wards);
        state
    }
}

/// Upsert `incoming` into `items` by code, keeping first-seen position.
fn merge_into<T: Coded>(items: &mut Vec<T>, index: &mut HashMap<i64, usize>, incoming: Vec<T>) {
    for item in incoming {
        match index.get(&item.code()) {
            Some(&pos) => items[pos] = item,
            None => {
                index.insert(item.code(), items.len());
                items.push(item);
            }
        }
    }
}

pub struct LocationStore {
    state: RwLock<StoreState>,
    version: AtomicU64,
    storage: Arc<dyn SnapshotStorage>,
}

impl LocationStore {
    /// Open the store over `storage`, loading any persisted snapshot.
    ///
    /// A document that cannot be read is logged and ignored; the store then
    /// starts empty and the next write replaces it.
    pub fn open(storage: Arc<dyn SnapshotStorage>) -> Self {
        let snapshot = match storage.load() {
            Ok(Some(snapshot)) => {
                info!(
                    provinces = snapshot.provinces.len(),
                    districts = snapshot.districts.len(),
                    wards = snapshot.wards.len(),
                    "Restored location cache"
                );
                snapshot
            }
            Ok(None) => CacheSnapshot::default(),
            Err(e) => {
                warn!(error = %e, "Persisted location cache unreadable, starting empty");
                CacheSnapshot::default()
            }
        };
        Self {
            state: RwLock::new(StoreState::from_snapshot(snapshot)),
            version: AtomicU64::new(0),
            storage,
        }
    }

    /// A store backed by process memory only.
    pub fn in_memory() -> Self {
        Self::open(Arc::new(MemoryStorage::new()))
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump_version(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    /// Apply `mutate` to a copy of the state, persist it, then swap it in.
    fn commit<F>(&self, what: &str, mutate: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut StoreState),
    {
        let mut guard = self.write();
        let mut next = guard.clone();
        mutate(&mut next);

        if let Err(e) = self.storage.save(&next.snapshot) {
            error!(op = what, error = %e, "Failed to persist location cache");
            return Err(e);
        }

        debug!(
            op = what,
            provinces = next.snapshot.provinces.len(),
            districts = next.snapshot.districts.len(),
            wards = next.snapshot.wards.len(),
            "Location cache persisted"
        );
        *guard = next;
        drop(guard);
        self.bump_version();
        Ok(())
    }

    // ===== Reads =====

    pub fn snapshot(&self) -> CacheSnapshot {
        self.read().snapshot.clone()
    }

    pub fn stats(&self) -> CacheStats {
        self.read().snapshot.stats()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.read().snapshot.last_updated
    }

    /// True once at least one province is cached.
    pub fn has_data(&self) -> bool {
        !self.read().snapshot.provinces.is_empty()
    }

    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.is_stale_at(ttl, Utc::now())
    }

    /// Staleness against an explicit `now`: never synced, or older than `now - ttl`.
    ///
    /// A `ttl` reaching past the representable range never expires.
    pub fn is_stale_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match self.last_updated() {
            Some(at) => now.checked_sub_signed(ttl).is_some_and(|cutoff| at < cutoff),
            None => true,
        }
    }

    /// Counter bumped on every successful write.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn provinces(&self) -> Vec<Province> {
        self.read().snapshot.provinces.clone()
    }

    pub fn province(&self, code: i64) -> Option<Province> {
        let state = self.read();
        state
            .province_index
            .get(&code)
            .map(|&pos| state.snapshot.provinces[pos].clone())
    }

    pub fn district(&self, code: i64) -> Option<District> {
        let state = self.read();
        state
            .district_index
            .get(&code)
            .map(|&pos| state.snapshot.districts[pos].clone())
    }

    pub fn ward(&self, code: i64) -> Option<Ward> {
        let state = self.read();
        state
            .ward_index
            .get(&code)
            .map(|&pos| state.snapshot.wards[pos].clone())
    }

    /// Districts of a province, in cache insertion order. Empty when none are cached.
    pub fn districts_of(&self, province_code: i64) -> Vec<District> {
        self.read()
            .snapshot
            .districts
            .iter()
            .filter(|d| d.province_code == province_code)
            .cloned()
            .collect()
    }

    /// Wards of a district, in cache insertion order. Empty when none are cached.
    pub fn wards_of(&self, district_code: i64) -> Vec<Ward> {
        self.read()
            .snapshot
            .wards
            .iter()
            .filter(|w| w.district_code == district_code)
            .cloned()
            .collect()
    }

    /// Provinces with no cached district, candidates for a targeted re-sync.
    pub fn provinces_without_districts(&self) -> Vec<Province> {
        let state = self.read();
        let parents: HashSet<i64> = state.snapshot.districts.iter().map(|d| d.province_code).collect();
        state
            .snapshot
            .provinces
            .iter()
            .filter(|p| !parents.contains(&p.code))
            .cloned()
            .collect()
    }

    /// Districts of `province_code` with no cached ward.
    pub fn districts_without_wards(&self, province_code: i64) -> Vec<District> {
        let state = self.read();
        let parents: HashSet<i64> = state.snapshot.wards.iter().map(|w| w.district_code).collect();
        state
            .snapshot
            .districts
            .iter()
            .filter(|d| d.province_code == province_code && !parents.contains(&d.code))
            .cloned()
            .collect()
    }

    /// Districts whose province is not cached. They stay queryable by their
    /// own code and show up under `districts_of` once the province arrives.
    pub fn orphaned_districts(&self) -> Vec<District> {
        let state = self.read();
        state
            .snapshot
            .districts
            .iter()
            .filter(|d| !state.province_index.contains_key(&d.province_code))
            .cloned()
            .collect()
    }

    /// Wards whose district is not cached.
    pub fn orphaned_wards(&self) -> Vec<Ward> {
        let state = self.read();
        state
            .snapshot
            .wards
            .iter()
            .filter(|w| !state.district_index.contains_key(&w.district_code))
            .cloned()
            .collect()
    }

    // ===== Writes =====

    pub fn upsert_provinces(&self, provinces: Vec<Province>) -> Result<(), StoreError> {
        if provinces.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        self.commit("upsert_provinces", move |state| {
            merge_into(&mut state.snapshot.provinces, &mut state.province_index, provinces);
            state.snapshot.last_updated = Some(now);
        })
    }

    pub fn upsert_districts(&self, districts: Vec<District>) -> Result<(), StoreError> {
        if districts.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        self.commit("upsert_districts", move |state| {
            merge_into(&mut state.snapshot.districts, &mut state.district_index, districts);
            state.snapshot.last_updated = Some(now);
        })
    }

    pub fn upsert_wards(&self, wards: Vec<Ward>) -> Result<(), StoreError> {
        if wards.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        self.commit("upsert_wards", move |state| {
            merge_into(&mut state.snapshot.wards, &mut state.ward_index, wards);
            state.snapshot.last_updated = Some(now);
        })
    }

    /// Replace the whole snapshot at once; old data is discarded.
    pub fn replace(&self, snapshot: CacheSnapshot) -> Result<(), StoreError> {
        let next = StoreState::from_snapshot(snapshot);
        self.commit("replace", move |state| *state = next)
    }

    /// Reset to the empty snapshot and erase the durable copy.
    pub fn clear(&self) -> Result<(), StoreError> {
        let mut guard = self.write();
        self.storage.erase()?;
        *guard = StoreState::default();
        drop(guard);
        self.bump_version();
        info!("Location cache cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_storage() -> (LocationStore, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (LocationStore::open(storage.clone()), storage)
    }

    fn sorted_districts(mut districts: Vec<District>) -> Vec<District> {
        districts.sort_by_key(|d| d.code);
        districts
    }

    #[test]
    fn test_empty_store() {
        let store = LocationStore::in_memory();
        assert!(!store.has_data());
        assert!(store.is_stale(Duration::days(7)));
        assert_eq!(store.stats(), CacheStats::default());
        assert!(store.districts_of(1).is_empty());
        assert!(store.wards_of(101).is_empty());
    }

    #[test]
    fn test_upsert_provinces_sets_data_and_watermark() {
        let (store, storage) = store_with_storage();
        store
            .upsert_provinces(vec![Province::new(1, "Hà Nội"), Province::new(79, "TP.HCM")])
            .unwrap();

        assert!(store.has_data());
        assert_eq!(store.stats().total_provinces, 2);
        assert!(store.last_updated().is_some());
        assert_eq!(storage.stored().unwrap(), store.snapshot());
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let store = LocationStore::in_memory();
        let district = District::new(101, 1, "Cầu Giấy");
        store.upsert_districts(vec![district.clone()]).unwrap();
        let once = store.snapshot();
        store.upsert_districts(vec![district.clone()]).unwrap();
        let twice = store.snapshot();

        assert_eq!(once.districts, twice.districts);
        assert_eq!(store.stats().total_districts, 1);
    }

    #[test]
    fn test_upsert_overwrites_name_in_place() {
        let store = LocationStore::in_memory();
        store
            .upsert_provinces(vec![Province::new(1, "Ha Noi"), Province::new(2, "Hà Giang")])
            .unwrap();
        store.upsert_provinces(vec![Province::new(1, "Hà Nội")]).unwrap();

        let provinces = store.provinces();
        assert_eq!(provinces.len(), 2);
        assert_eq!(provinces[0], Province::new(1, "Hà Nội"));
        assert_eq!(provinces[1].code, 2);
    }

    #[test]
    fn test_duplicate_codes_within_one_batch_collapse() {
        let store = LocationStore::in_memory();
        store
            .upsert_wards(vec![Ward::new(1, 101, "old"), Ward::new(1, 101, "new")])
            .unwrap();
        assert_eq!(store.wards_of(101), vec![Ward::new(1, 101, "new")]);
    }

    #[test]
    fn test_order_independent_convergence() {
        let districts = vec![
            District::new(101, 1, "Cầu Giấy"),
            District::new(102, 1, "Ba Đình"),
            District::new(760, 79, "Quận 1"),
            District::new(101, 1, "Cầu Giấy"),
        ];
        let forward = LocationStore::in_memory();
        forward.upsert_districts(districts.clone()).unwrap();

        let backward = LocationStore::in_memory();
        for district in districts.into_iter().rev() {
            backward.upsert_districts(vec![district]).unwrap();
        }

        assert_eq!(
            sorted_districts(forward.snapshot().districts),
            sorted_districts(backward.snapshot().districts)
        );
        assert!(forward.snapshot().same_entities(&backward.snapshot()));
    }

    #[test]
    fn test_parent_filter_correctness() {
        let store = LocationStore::in_memory();
        store
            .upsert_districts(vec![
                District::new(101, 1, "Cầu Giấy"),
                District::new(760, 79, "Quận 1"),
                District::new(102, 1, "Ba Đình"),
            ])
            .unwrap();

        let of_one = store.districts_of(1);
        assert_eq!(of_one.len(), 2);
        assert!(of_one.iter().all(|d| d.province_code == 1));
        assert_eq!(of_one[0].code, 101);
        assert_eq!(of_one[1].code, 102);
        assert_eq!(store.districts_of(79), vec![District::new(760, 79, "Quận 1")]);
    }

    #[test]
    fn test_orphaned_district_is_kept_and_adopted_later() {
        let store = LocationStore::in_memory();
        store.upsert_districts(vec![District::new(101, 1, "Cầu Giấy")]).unwrap();

        assert!(!store.has_data());
        assert_eq!(store.district(101).unwrap().name, "Cầu Giấy");
        assert_eq!(store.orphaned_districts().len(), 1);

        store.upsert_provinces(vec![Province::new(1, "Hà Nội")]).unwrap();
        assert!(store.orphaned_districts().is_empty());
        assert_eq!(store.districts_of(1).len(), 1);
    }

    #[test]
    fn test_orphaned_wards() {
        let store = LocationStore::in_memory();
        store.upsert_wards(vec![Ward::new(1, 101, "Dịch Vọng")]).unwrap();
        assert_eq!(store.orphaned_wards().len(), 1);
        store.upsert_districts(vec![District::new(101, 1, "Cầu Giấy")]).unwrap();
        assert!(store.orphaned_wards().is_empty());
    }

    #[test]
    fn test_missing_children_queries() {
        let store = LocationStore::in_memory();
        store
            .upsert_provinces(vec![Province::new(1, "Hà Nội"), Province::new(79, "TP.HCM")])
            .unwrap();
        store
            .upsert_districts(vec![District::new(101, 1, "Cầu Giấy"), District::new(102, 1, "Ba Đình")])
            .unwrap();
        store.upsert_wards(vec![Ward::new(1, 101, "Dịch Vọng")]).unwrap();

        let missing: Vec<i64> = store.provinces_without_districts().iter().map(|p| p.code).collect();
        assert_eq!(missing, vec![79]);
        let missing: Vec<i64> = store.districts_without_wards(1).iter().map(|d| d.code).collect();
        assert_eq!(missing, vec![102]);
    }

    #[test]
    fn test_staleness_threshold() {
        let store = LocationStore::in_memory();
        let ttl = Duration::hours(24);
        let now = Utc::now();
        assert!(store.is_stale_at(ttl, now));

        store
            .replace(CacheSnapshot {
                provinces: vec![Province::new(1, "Hà Nội")],
                last_updated: Some(now - ttl - Duration::seconds(1)),
                ..Default::default()
            })
            .unwrap();
        assert!(store.is_stale_at(ttl, now));

        store
            .replace(CacheSnapshot {
                provinces: vec![Province::new(1, "Hà Nội")],
                last_updated: Some(now),
                ..Default::default()
            })
            .unwrap();
        assert!(!store.is_stale_at(ttl, now));
    }

    #[test]
    fn test_unbounded_ttl_never_expires() {
        let store = LocationStore::in_memory();
        assert!(store.is_stale(Duration::MAX));

        store.upsert_provinces(vec![Province::new(1, "Hà Nội")]).unwrap();
        assert!(!store.is_stale(Duration::MAX));
        assert!(!store.is_stale_at(Duration::MIN, Utc::now()));
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let (store, storage) = store_with_storage();
        store.upsert_districts(vec![]).unwrap();
        assert!(store.last_updated().is_none());
        assert_eq!(storage.save_count(), 0);
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn test_failed_persist_leaves_memory_unchanged() {
        let (store, storage) = store_with_storage();
        store.upsert_provinces(vec![Province::new(1, "Hà Nội")]).unwrap();
        let before = store.snapshot();

        storage.set_fail_writes(true);
        let result = store.upsert_provinces(vec![Province::new(79, "TP.HCM")]);
        assert!(matches!(result, Err(StoreError::Storage(_))));
        assert_eq!(store.snapshot(), before);
        assert_eq!(storage.stored().unwrap(), before);
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn test_clear_erases_durable_copy() {
        let (store, storage) = store_with_storage();
        store.upsert_provinces(vec![Province::new(1, "Hà Nội")]).unwrap();
        store.clear().unwrap();

        assert!(!store.has_data());
        assert!(store.last_updated().is_none());
        assert!(storage.stored().is_none());
    }

    #[test]
    fn test_open_restores_persisted_snapshot() {
        let snapshot = CacheSnapshot {
            provinces: vec![Province::new(1, "Hà Nội")],
            districts: vec![District::new(101, 1, "Cầu Giấy")],
            wards: vec![],
            last_updated: Some(Utc::now()),
        };
        let store = LocationStore::open(Arc::new(MemoryStorage::with_snapshot(snapshot.clone())));
        assert_eq!(store.snapshot(), snapshot);
        assert_eq!(store.province(1).unwrap().name, "Hà Nội");
    }

    #[test]
    fn test_open_ignores_unreadable_document() {
        let dir = tempfile::tempdir().unwrap();
        let storage = crate::cache::JsonFileStorage::new(dir.path().to_path_buf()).unwrap();
        std::fs::write(storage.path(), "{not json").unwrap();

        let store = LocationStore::open(Arc::new(storage));
        assert!(!store.has_data());
        store.upsert_provinces(vec![Province::new(1, "Hà Nội")]).unwrap();
        assert!(store.has_data());
    }
}
