//! Local caching module for offline location data.
//!
//! - `LocationStore`: the in-memory hierarchy with write-through persistence
//! - `SnapshotStorage`: durable backends (`JsonFileStorage`, `MemoryStorage`)
//! - `SnapshotTransfer`: portable export/import of the whole snapshot

pub mod storage;
pub mod store;
pub mod transfer;

pub use storage::{JsonFileStorage, MemoryStorage, SnapshotStorage};
pub use store::LocationStore;
pub use transfer::SnapshotTransfer;
