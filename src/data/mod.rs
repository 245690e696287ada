//! Core data models for declination lookups
//!
//! This module contains the coordinate key, failure classification types and
//! the range checks shared by the cache, the parser and the API client.

pub mod declination;
pub mod parser;

pub use declination::{resolve_declination, DeclinationClient};
pub use parser::extract_declination;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest declination (in degrees) ever accepted from the API or the cache
pub const MIN_DECLINATION: f64 = -180.0;
/// Largest declination (in degrees) ever accepted from the API or the cache
pub const MAX_DECLINATION: f64 = 180.0;

/// Number of decimal places coordinates are rounded to before keying or querying
const COORDINATE_DECIMALS: i32 = 6;

/// Returns true if `value` is a finite declination within [-180, 180]
pub fn is_valid_declination(value: f64) -> bool {
    value.is_finite() && (MIN_DECLINATION..=MAX_DECLINATION).contains(&value)
}

/// A validated location, rounded to 6 decimal places
///
/// Construction is the only place coordinates are range-checked, so any
/// `Coordinate` in hand is safe to use as a cache key or query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees, within [-90, 90]
    pub lat: f64,
    /// Longitude in degrees, within [-180, 180]
    pub lon: f64,
}

impl Coordinate {
    /// Creates a coordinate, returning `None` if either component is out of range
    /// or not finite.
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        if !lat.is_finite() || !lon.is_finite() {
            return None;
        }
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return None;
        }
        Some(Self {
            lat: round_coordinate(lat),
            lon: round_coordinate(lon),
        })
    }

    /// Latitude formatted with exactly 6 decimal places
    pub fn lat_param(&self) -> String {
        format!("{:.6}", self.lat)
    }

    /// Longitude formatted with exactly 6 decimal places
    pub fn lon_param(&self) -> String {
        format!("{:.6}", self.lon)
    }

    /// Deterministic cache key for this coordinate (e.g. `decl_47.300000_-122.300000`)
    ///
    /// Stable across runs and processes because it is derived purely from the
    /// rounded decimal representation.
    pub fn cache_key(&self) -> String {
        format!("decl_{}_{}", self.lat_param(), self.lon_param())
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat_param(), self.lon_param())
    }
}

/// Round to 6 decimal places, folding negative zero into zero so `-0.0` and
/// `0.0` share a key.
fn round_coordinate(value: f64) -> f64 {
    let scale = 10f64.powi(COORDINATE_DECIMALS);
    let rounded = (value * scale).round() / scale;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Whether a failure reflects upstream health or a problem with the request itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network errors, 5xx, timeouts and bad payloads; counts toward opening the breaker
    Transient,
    /// 4xx client errors such as a rejected key; never moves the breaker
    Permanent,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Transient => write!(f, "transient"),
            FailureKind::Permanent => write!(f, "permanent"),
        }
    }
}

/// One observed lookup failure, kept only long enough to be logged
#[derive(Debug, Clone, PartialEq)]
pub struct FailureRecord {
    pub kind: FailureKind,
    /// HTTP status, when a response was received at all
    pub http_code: Option<u16>,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl FailureRecord {
    pub fn transient(
        http_code: Option<u16>,
        reason: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: FailureKind::Transient,
            http_code,
            reason: reason.into(),
            timestamp,
        }
    }

    pub fn permanent(http_code: u16, reason: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            http_code: Some(http_code),
            reason: reason.into(),
            timestamp,
        }
    }

    /// Classify an HTTP status that is not 200.
    ///
    /// 4xx is permanent; 0, 5xx and anything else unexpected is transient.
    pub fn from_status(status: u16, timestamp: DateTime<Utc>) -> Self {
        let reason = format!("HTTP {}", status);
        if (400..500).contains(&status) {
            Self::permanent(status, reason, timestamp)
        } else {
            Self::transient(Some(status), reason, timestamp)
        }
    }

    /// Emit this failure to the log sink with the coordinate as context
    pub fn log(&self, coord: &Coordinate) {
        tracing::warn!(
            lat = coord.lat,
            lon = coord.lon,
            kind = %self.kind,
            http_code = ?self.http_code,
            reason = %self.reason,
            timestamp = self.timestamp.timestamp(),
            "declination lookup failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_rejects_out_of_range() {
        assert!(Coordinate::new(90.1, 0.0).is_none());
        assert!(Coordinate::new(-90.1, 0.0).is_none());
        assert!(Coordinate::new(0.0, 180.5).is_none());
        assert!(Coordinate::new(0.0, -181.0).is_none());
        assert!(Coordinate::new(f64::NAN, 0.0).is_none());
        assert!(Coordinate::new(0.0, f64::INFINITY).is_none());
    }

    #[test]
    fn test_coordinate_accepts_boundaries() {
        assert!(Coordinate::new(90.0, 180.0).is_some());
        assert!(Coordinate::new(-90.0, -180.0).is_some());
    }

    #[test]
    fn test_coordinate_rounds_to_six_places() {
        let coord = Coordinate::new(47.12345678, -122.98765449).unwrap();
        assert_eq!(coord.lat_param(), "47.123457");
        assert_eq!(coord.lon_param(), "-122.987654");
    }

    #[test]
    fn test_cache_key_is_stable_for_nearby_inputs() {
        let a = Coordinate::new(47.3000001, -122.3).unwrap();
        let b = Coordinate::new(47.2999999, -122.3000004).unwrap();
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key(), "decl_47.300000_-122.300000");
    }

    #[test]
    fn test_negative_zero_shares_key_with_zero() {
        let a = Coordinate::new(-0.0000001, 0.0).unwrap();
        let b = Coordinate::new(0.0, -0.0).unwrap();
        assert_eq!(a.cache_key(), "decl_0.000000_0.000000");
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_is_valid_declination() {
        assert!(is_valid_declination(15.2));
        assert!(is_valid_declination(-180.0));
        assert!(is_valid_declination(180.0));
        assert!(!is_valid_declination(180.01));
        assert!(!is_valid_declination(200.0));
        assert!(!is_valid_declination(f64::NAN));
    }

    #[test]
    fn test_failure_from_status_classification() {
        let now = Utc::now();

        let client_error = FailureRecord::from_status(401, now);
        assert_eq!(client_error.kind, FailureKind::Permanent);
        assert_eq!(client_error.reason, "HTTP 401");

        let server_error = FailureRecord::from_status(503, now);
        assert_eq!(server_error.kind, FailureKind::Transient);
        assert_eq!(server_error.http_code, Some(503));

        let no_status = FailureRecord::from_status(0, now);
        assert_eq!(no_status.kind, FailureKind::Transient);
        assert_eq!(no_status.reason, "HTTP 0");
    }
}
