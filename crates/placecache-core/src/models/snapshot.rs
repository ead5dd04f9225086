use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Coded, District, Province, Ward};

/// Complete state of the location store at a point in time.
///
/// Each entity list is kept in cache insertion order with unique codes.
/// `last_updated` is a single watermark for the whole snapshot; `None`
/// means nothing has ever been merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshot {
    pub provinces: Vec<Province>,
    pub districts: Vec<District>,
    pub wards: Vec<Ward>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl CacheSnapshot {
    pub fn is_empty(&self) -> bool {
        self.provinces.is_empty() && self.districts.is_empty() && self.wards.is_empty()
    }

    /// Same entities, ignoring list order and the watermark.
    pub fn same_entities(&self, other: &CacheSnapshot) -> bool {
        fn sorted<T: Clone + Coded>(items: &[T]) -> Vec<T> {
            let mut items = items.to_vec();
            items.sort_by_key(|item| item.code());
            items
        }
        sorted(&self.provinces) == sorted(&other.provinces)
            && sorted(&self.districts) == sorted(&other.districts)
            && sorted(&self.wards) == sorted(&other.wards)
    }

    /// Same entities and watermark, ignoring list order.
    pub fn equivalent(&self, other: &CacheSnapshot) -> bool {
        self.last_updated == other.last_updated && self.same_entities(other)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            total_provinces: self.provinces.len(),
            total_districts: self.districts.len(),
            total_wards: self.wards.len(),
            last_updated: self.last_updated,
        }
    }
}

/// Counts derived from a snapshot on read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_provinces: usize,
    pub total_districts: usize,
    pub total_wards: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

impl CacheStats {
    /// Human readable age of the snapshot, "never" when it was never synced.
    pub fn age_display(&self) -> String {
        match self.last_updated {
            Some(at) => crate::utils::age_display(at, Utc::now()),
            None => "never".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_serializes_null_last_updated() {
        let json = serde_json::to_value(CacheSnapshot::default()).unwrap();
        assert!(json["lastUpdated"].is_null());
        assert!(json["provinces"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_stats_counts() {
        let snapshot = CacheSnapshot {
            provinces: vec![Province::new(1, "Hà Nội")],
            districts: vec![District::new(101, 1, "Cầu Giấy"), District::new(102, 1, "Ba Đình")],
            wards: vec![],
            last_updated: None,
        };
        let stats = snapshot.stats();
        assert_eq!(stats.total_provinces, 1);
        assert_eq!(stats.total_districts, 2);
        assert_eq!(stats.total_wards, 0);
        assert_eq!(stats.age_display(), "never");
    }

    #[test]
    fn test_same_entities_ignores_order_and_watermark() {
        let a = CacheSnapshot {
            districts: vec![District::new(101, 1, "Cầu Giấy"), District::new(102, 1, "Ba Đình")],
            last_updated: None,
            ..Default::default()
        };
        let b = CacheSnapshot {
            districts: vec![District::new(102, 1, "Ba Đình"), District::new(101, 1, "Cầu Giấy")],
            last_updated: Some(Utc::now()),
            ..Default::default()
        };
        assert!(a.same_entities(&b));
        assert!(!a.equivalent(&b));
    }
}
