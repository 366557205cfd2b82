//! Error types for mnemo-compress

use thiserror::Error;

use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::storage::StoreError;

/// Main error type for engine operations
///
/// Summarizer and per-batch persistence failures never surface here; they
/// are recovered or reported inside the run result.
#[derive(Error, Debug)]
pub enum CompressError {
    /// Invalid configuration, raised before any work starts
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Store errors outside of per-batch writes (queries)
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Backend construction errors
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, CompressError>;
