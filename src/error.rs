//! Error types shared across the crate.
//!
//! Only [`FansError`] ever reaches a caller. Cache, count-store and populator
//! failures are absorbed by the engine and surface as logs and metrics.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by [`crate::pagination::PaginationEngine::get_fans_page`].
#[derive(Error, Debug)]
pub enum FansError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("relation store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
}

impl FansError {
    /// Stable machine-readable code for the error.
    pub fn code(&self) -> &'static str {
        match self {
            FansError::InvalidArgument(_) => "invalid_argument",
            FansError::StoreUnavailable(_) => "store_unavailable",
        }
    }
}

/// Failure of a durable store (relations or counts).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O failure: {0}")]
    Io(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure of the range cache backend.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache call timed out after {0:?}")]
    Timeout(Duration),

    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[cfg(feature = "redis")]
    #[error("redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),
}

/// Failure of one background population job.
#[derive(Error, Debug)]
pub enum PopulateError {
    #[error("cache write failed for {key}: {source}")]
    Cache {
        key: String,
        #[source]
        source: CacheError,
    },
}
