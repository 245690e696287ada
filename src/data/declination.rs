//! Magnetic declination API client
//!
//! `DeclinationClient::lookup` runs the full pipeline: input validation,
//! cache check, breaker gate, a single bounded HTTP GET, response parsing,
//! range validation, then breaker and cache updates. Every failure is
//! absorbed here and surfaces to the caller only as `None`.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;

use super::parser::extract_declination;
use super::{is_valid_declination, Coordinate, FailureRecord};
use crate::breaker::CircuitBreaker;
use crate::cache::GeoCache;
use crate::config::DeclinationConfig;

/// Client for the declination lookup pipeline
#[derive(Debug, Clone)]
pub struct DeclinationClient {
    client: Client,
    endpoint: String,
    cache: GeoCache,
    breaker: Arc<CircuitBreaker>,
    fallback_declination: Option<f64>,
    mock_external_services: bool,
}

/// Build the HTTP client with the configured timeouts and user agent
fn build_http_client(config: &DeclinationConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(config.connect_timeout())
        .timeout(config.request_timeout())
        .user_agent(config.user_agent.as_str())
        .build()
}

impl DeclinationClient {
    /// Create a client from configuration
    ///
    /// The breaker restores any state persisted in the configured state file.
    pub fn from_config(config: &DeclinationConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
            endpoint: config.endpoint.clone(),
            cache: GeoCache::with_dir(config.resolved_cache_dir())
                .with_ttl(config.cache_ttl()),
            breaker: Arc::new(config.breaker()),
            fallback_declination: config.fallback_declination,
            mock_external_services: config.mock_external_services,
        })
    }

    /// Share an existing breaker, e.g. one instance across several clients
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn cache(&self) -> &GeoCache {
        &self.cache
    }

    /// Look up the declination for a location
    ///
    /// # Arguments
    /// * `lat` - Latitude in degrees, within [-90, 90]
    /// * `lon` - Longitude in degrees, within [-180, 180]
    /// * `api_key` - API key; empty disables the lookup
    /// * `now` - Current time, used for cache freshness and breaker timing
    ///
    /// # Returns
    /// * `Some(value)` with `value` in [-180, 180]
    /// * `None` on invalid input, mock mode, an open breaker or any failure
    pub async fn lookup(
        &self,
        lat: f64,
        lon: f64,
        api_key: &str,
        now: DateTime<Utc>,
    ) -> Option<f64> {
        if self.mock_external_services || api_key.trim().is_empty() {
            return None;
        }
        let coord = Coordinate::new(lat, lon)?;

        if let Some(entry) = self.cache.get(&coord, now) {
            tracing::debug!(lat = coord.lat, lon = coord.lon, "declination cache hit");
            return Some(entry.declination);
        }

        if self.breaker.check_skip(now) {
            tracing::debug!(
                lat = coord.lat,
                lon = coord.lon,
                open_until = ?self.breaker.open_until(),
                "circuit breaker open, skipping declination fetch"
            );
            return None;
        }

        match self.fetch(&coord, api_key, now).await {
            Ok(declination) => {
                self.breaker.record_success(now);
                if let Err(e) = self.cache.put(&coord, declination, now) {
                    tracing::warn!(
                        lat = coord.lat,
                        lon = coord.lon,
                        error = %e,
                        "failed to cache declination"
                    );
                }
                Some(declination)
            }
            Err(failure) => {
                self.breaker.record_failure(failure.kind, now);
                failure.log(&coord);
                None
            }
        }
    }

    /// `lookup`, falling back to the configured override or zero
    pub async fn lookup_or_fallback(
        &self,
        lat: f64,
        lon: f64,
        api_key: &str,
        now: DateTime<Utc>,
    ) -> f64 {
        let value = self.lookup(lat, lon, api_key, now).await;
        resolve_declination(value, self.fallback_declination)
    }

    /// Perform one GET and turn the response into a validated declination
    async fn fetch(
        &self,
        coord: &Coordinate,
        api_key: &str,
        now: DateTime<Utc>,
    ) -> Result<f64, FailureRecord> {
        let lat = coord.lat_param();
        let lon = coord.lon_param();

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", api_key),
                ("lat1", lat.as_str()),
                ("lon1", lon.as_str()),
                ("resultFormat", "json"),
            ])
            .send()
            .await
            // The URL carries the API key; keep it out of the logged reason.
            .map_err(|e| FailureRecord::transient(None, e.without_url().to_string(), now))?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(FailureRecord::from_status(status, now));
        }

        let invalid = |reason: &str| FailureRecord::transient(Some(status), reason, now);

        // A body that cannot be read or decoded is treated like a malformed one.
        let document = response
            .json::<Value>()
            .await
            .ok()
            .filter(Value::is_object)
            .ok_or_else(|| invalid("invalid JSON response"))?;

        let declination = extract_declination(&document)
            .ok_or_else(|| invalid("unexpected response format"))?;

        if !is_valid_declination(declination) {
            return Err(invalid("declination out of bounds"));
        }

        Ok(declination)
    }
}

/// Deterministic fallback for a missing lookup result
///
/// Prefers the looked-up value, then a valid override, then zero.
pub fn resolve_declination(value: Option<f64>, fallback: Option<f64>) -> f64 {
    value
        .filter(|v| is_valid_declination(*v))
        .or_else(|| fallback.filter(|v| is_valid_declination(*v)))
        .unwrap_or(0.0)
}
