//! Core library for placecache.
//!
//! A client-resident cache of a country's Province → District → Ward
//! hierarchy, fed incrementally from a remote source and kept across
//! sessions:
//!
//! - [`cache`]: the location store, its durable storage and snapshot transfer
//! - [`api`]: the remote source seam and its HTTP implementation
//! - [`sync`]: paced, failure-tolerant population of the store
//! - [`manager`]: one handle combining all of the above
//! - [`config`]: on-disk configuration and environment overrides

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod manager;
pub mod models;
pub mod sync;
pub mod utils;

pub use api::{ApiError, HttpLocationSource, LocationSource};
pub use cache::{JsonFileStorage, LocationStore, MemoryStorage, SnapshotStorage, SnapshotTransfer};
pub use config::Config;
pub use error::{StoreError, SyncError, TransferError};
pub use manager::LocationCacheManager;
pub use models::{CacheSnapshot, CacheStats, District, Province, Ward};
pub use sync::{SyncOptions, SyncPhase, SyncProgress, SyncReport, Synchronizer};
