//! Error types for the tracker core

use thiserror::Error;

/// Failure of the persistence layer
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("unknown item '{0}'")]
    UnknownItem(String),

    #[error("invalid catalog entry '{item}': {reason}")]
    InvalidCatalog { item: String, reason: String },

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, TrackerError>;
