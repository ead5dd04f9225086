//! Export and import of the whole location snapshot as a portable JSON document.
//!
//! Import is all-or-nothing: the document is fully parsed and validated
//! before the store is touched, and a valid document replaces the store
//! wholesale instead of merging into it.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::cache::LocationStore;
use crate::error::TransferError;
use crate::models::{CacheSnapshot, CacheStats, Coded, District, Province, Ward};

/// Highest document schema this build understands. Absent means 1.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotDocument {
    #[serde(default)]
    schema_version: Option<u32>,
    provinces: Option<Vec<Province>>,
    districts: Option<Vec<District>>,
    wards: Option<Vec<Ward>>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

fn check_unique<T: Coded>(entity: &'static str, items: &[T]) -> Result<(), TransferError> {
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        if !seen.insert(item.code()) {
            return Err(TransferError::DuplicateCode {
                entity,
                code: item.code(),
            });
        }
    }
    Ok(())
}

/// Parse and validate a document without touching any store.
pub fn parse_document(document: &str) -> Result<CacheSnapshot, TransferError> {
    let doc: SnapshotDocument =
        serde_json::from_str(document).map_err(|e| TransferError::Malformed(e.to_string()))?;

    let version = doc.schema_version.unwrap_or(SCHEMA_VERSION);
    if version != SCHEMA_VERSION {
        return Err(TransferError::UnsupportedSchema(version));
    }

    let provinces = doc.provinces.ok_or(TransferError::MissingField("provinces"))?;
    let districts = doc.districts.ok_or(TransferError::MissingField("districts"))?;
    let wards = doc.wards.ok_or(TransferError::MissingField("wards"))?;

    check_unique("province", &provinces)?;
    check_unique("district", &districts)?;
    check_unique("ward", &wards)?;

    Ok(CacheSnapshot {
        provinces,
        districts,
        wards,
        last_updated: doc.last_updated,
    })
}

pub struct SnapshotTransfer {
    store: Arc<LocationStore>,
}

impl SnapshotTransfer {
    pub fn new(store: Arc<LocationStore>) -> Self {
        Self { store }
    }

    /// Serialize the current snapshot as `{provinces, districts, wards, lastUpdated}`.
    pub fn export(&self) -> Result<String, TransferError> {
        Ok(serde_json::to_string_pretty(&self.store.snapshot())?)
    }

    /// Replace the store with `document`. Returns `false`, with the store
    /// unchanged, if the document is rejected or cannot be persisted.
    pub fn import(&self, document: &str) -> bool {
        match self.try_import(document) {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Snapshot import rejected");
                false
            }
        }
    }

    /// Same as [`import`](Self::import) but reports why a document was rejected.
    pub fn try_import(&self, document: &str) -> Result<CacheStats, TransferError> {
        let snapshot = parse_document(document)?;
        let stats = snapshot.stats();
        self.store.replace(snapshot)?;
        info!(
            provinces = stats.total_provinces,
            districts = stats.total_districts,
            wards = stats.total_wards,
            "Snapshot imported"
        );
        Ok(stats)
    }
}
