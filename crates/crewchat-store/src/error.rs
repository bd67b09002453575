use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (reading, writing, renaming, creating directories).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A file that must exist (e.g. an image being deleted) is absent.
    #[error("Record not found")]
    NotFound,

    /// A persisted file exists but is not valid JSON for its collection.
    /// Recoverable: callers log it and fall back to an empty collection.
    #[error("Failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Encoding a collection to JSON failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The chat id cannot be used as a storage key.
    #[error("Invalid chat id: {0}")]
    InvalidId(String),

    /// A picked image could not be decoded or re-encoded as JPEG.
    #[error("Image encode error: {0}")]
    ImageEncode(#[from] image::ImageError),
}

impl StoreError {
    /// Whether the caller should log and continue with an empty collection.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StoreError::Decode { .. })
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
