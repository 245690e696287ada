//! Cache module for storing fetched declinations to disk
//!
//! This module provides a coordinate-keyed cache that persists accepted
//! declination values with their fetch time and a fixed TTL. Stale or invalid
//! entries read as misses; they are never surfaced to callers.

mod atomic;
mod manager;

pub use atomic::write_json_atomic;
pub use manager::{CacheEntry, GeoCache, DEFAULT_TTL_DAYS};

use thiserror::Error;

/// Errors that can occur when persisting cache or breaker state
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem operation failed
    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize or parse a persisted record
    #[error("cache serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Refused to store a declination outside [-180, 180]
    #[error("declination out of bounds: {0}")]
    InvalidValue(f64),
}
