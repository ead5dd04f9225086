//! Error types for the store, synchronizer and snapshot transfer.

use thiserror::Error;

use crate::api::ApiError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Storage backend error: {0}")]
    Storage(String),
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("A sync run is already in progress")]
    Busy,

    #[error("Remote source failed: {0}")]
    Source(#[from] ApiError),

    #[error("Failed to persist synced data: {0}")]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Document is not well-formed JSON: {0}")]
    Malformed(String),

    #[error("Document is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Duplicate {entity} code {code} in document")]
    DuplicateCode { entity: &'static str, code: i64 },

    #[error("Unsupported schema version {0}")]
    UnsupportedSchema(u32),

    #[error("Failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("A sync run is in progress")]
    SyncInProgress,

    #[error(transparent)]
    Store(#[from] StoreError),
}
