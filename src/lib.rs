//! Magnetic declination lookup library
//!
//! Fetches declination for a coordinate from the NOAA calculator behind a
//! coordinate-keyed disk cache and a circuit breaker. Lookups never fail
//! loudly: callers get a value in [-180, 180] or `None`.

pub mod breaker;
pub mod cache;
pub mod cli;
pub mod config;
pub mod data;

pub use breaker::{BreakerConfig, BreakerPhase, BreakerSnapshot, CircuitBreaker};
pub use cache::{CacheEntry, CacheError, GeoCache};
pub use config::{ConfigError, DeclinationConfig};
pub use data::{
    extract_declination, resolve_declination, Coordinate, DeclinationClient, FailureKind,
    FailureRecord,
};
