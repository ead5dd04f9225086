//! Data models for the administrative-location hierarchy.
//!
//! - `Province`, `District`, `Ward`: the three levels, parent to child
//! - `CacheSnapshot`: the full cached hierarchy plus its update watermark
//! - `CacheStats`: counts derived from a snapshot

pub mod location;
pub mod snapshot;

pub use location::{Coded, District, Province, Ward};
pub use snapshot::{CacheSnapshot, CacheStats};
