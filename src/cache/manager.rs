//! Coordinate-keyed declination cache persisted to disk
//!
//! Provides a `GeoCache` that stores one JSON file per rounded coordinate with
//! the fetch timestamp. Staleness is judged lazily at read time; there is no
//! eviction, expired entries are simply overwritten by the next successful fetch.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use super::atomic::write_json_atomic;
use super::CacheError;
use crate::data::{is_valid_declination, Coordinate};

/// Default time-to-live for a cached declination
pub const DEFAULT_TTL_DAYS: i64 = 7;

/// A previously accepted declination for one coordinate bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Declination in degrees, always within [-180, 180]
    pub declination: f64,
    /// When the value was fetched, stored as epoch seconds
    #[serde(with = "chrono::serde::ts_seconds")]
    pub fetched_at: DateTime<Utc>,
}

/// Reads and writes cached declinations on disk
///
/// Entries live as `<cache_dir>/decl_<lat>_<lon>.json`. Writes go through a
/// temporary file in the same directory followed by a rename, so a reader
/// sees either the previous entry or the new one, never a partial write.
#[derive(Debug, Clone)]
pub struct GeoCache {
    /// Directory where cache files are stored
    cache_dir: PathBuf,
    ttl: Duration,
}

impl GeoCache {
    /// Creates a GeoCache with a custom cache directory and the default TTL
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            ttl: Duration::days(DEFAULT_TTL_DAYS),
        }
    }

    /// Overrides the time-to-live
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Returns the path of the cache file for a coordinate
    pub fn entry_path(&self, coord: &Coordinate) -> PathBuf {
        self.cache_dir.join(format!("{}.json", coord.cache_key()))
    }

    /// Returns the cached entry if it is still fresh and holds a valid value
    ///
    /// A missing, unreadable, corrupt, expired or out-of-range entry is a miss.
    pub fn get(&self, coord: &Coordinate, now: DateTime<Utc>) -> Option<CacheEntry> {
        let content = fs::read_to_string(self.entry_path(coord)).ok()?;
        let entry: CacheEntry = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(
                    lat = coord.lat,
                    lon = coord.lon,
                    error = %e,
                    "ignoring unparseable cache entry"
                );
                return None;
            }
        };

        if now - entry.fetched_at >= self.ttl {
            tracing::debug!(lat = coord.lat, lon = coord.lon, "cache entry expired");
            return None;
        }
        if !is_valid_declination(entry.declination) {
            tracing::warn!(
                lat = coord.lat,
                lon = coord.lon,
                declination = entry.declination,
                "ignoring out-of-range cache entry"
            );
            return None;
        }

        Some(entry)
    }

    /// Stores a declination for a coordinate, replacing any previous entry
    ///
    /// # Returns
    /// * `Ok(())` on success
    /// * `Err(CacheError::InvalidValue)` if the value is outside [-180, 180]
    /// * `Err` if directory creation or the atomic write fails
    pub fn put(
        &self,
        coord: &Coordinate,
        declination: f64,
        now: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        if !is_valid_declination(declination) {
            return Err(CacheError::InvalidValue(declination));
        }

        let entry = CacheEntry {
            declination,
            fetched_at: now,
        };
        write_json_atomic(&self.entry_path(coord), &entry)
    }
}
