//! Page pool errors.

use damson_common::types::StoreId;
use thiserror::Error;

use crate::file::IoError;

/// Result type for page pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors surfaced by the page pool and the store layer above it.
#[derive(Debug, Error)]
#[allow(missing_docs)] // Fields are documented by variant docs
pub enum PoolError {
    /// No frame available: the pool is at capacity and every frame is
    /// pinned.
    #[error("page pool is full, all frames are pinned")]
    PoolFull,

    /// The store is closing or closed and can no longer serve pages.
    #[error("store {store} is closed")]
    StoreClosed { store: StoreId },

    /// A store file failed validation.
    #[error("store file is corrupted: {reason}")]
    Corrupt { reason: String },

    /// Configuration error.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// I/O error from the underlying file.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
}

impl PoolError {
    /// Creates a corruption error.
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Self::Corrupt {
            reason: reason.into(),
        }
    }

    /// Creates a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns true if this is a transient error that can be retried once
    /// pins are released.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PoolFull)
    }

    /// Returns true if this error indicates on-disk damage.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}
