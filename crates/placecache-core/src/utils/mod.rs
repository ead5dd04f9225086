//! Small formatting helpers shared by the store and the CLI.

pub mod format;

pub use format::{age_display, age_minutes};
