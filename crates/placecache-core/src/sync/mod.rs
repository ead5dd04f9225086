//! Synchronization of the location store with a remote source.
//!
//! `Synchronizer` runs province and children phases, publishing
//! `SyncProgress` on a watch channel and returning a `SyncReport`.

pub mod progress;
pub mod synchronizer;

pub use progress::{ParentFailure, ParentLevel, SyncPhase, SyncProgress, SyncReport};
pub use synchronizer::{RunGuard, SyncOptions, Synchronizer};
