//! Configuration loader: defaults, optional TOML file, then environment overrides.

use chrono::Duration;
use directories::ProjectDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::breaker::{
    BreakerConfig, CircuitBreaker, DEFAULT_COOLDOWN_SECS, DEFAULT_FAILURE_THRESHOLD,
};
use crate::cache::DEFAULT_TTL_DAYS;
use crate::data::is_valid_declination;

/// NOAA geomagnetic declination calculator
pub const DEFAULT_ENDPOINT: &str =
    "https://www.ngdc.noaa.gov/geomag-web/calculators/calculateDeclination";
const DEFAULT_USER_AGENT: &str =
    concat!("magdec/", env!("CARGO_PKG_VERSION"), " (declination overlay)");
const FALLBACK_CACHE_DIR: &str = ".magdec-cache";
const BREAKER_STATE_FILE: &str = "breaker.json";

/// Upper bounds; lookups must stay quick enough for request-path callers
pub const MAX_CONNECT_TIMEOUT_SECS: u64 = 5;
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const MAX_CACHE_TTL_DAYS: i64 = 365;
pub const MAX_COOLDOWN_SECS: i64 = 86_400;

pub const ENV_API_KEY: &str = "MAGDEC_API_KEY";
pub const ENV_ENDPOINT: &str = "MAGDEC_ENDPOINT";
pub const ENV_MOCK_EXTERNAL_SERVICES: &str = "MAGDEC_MOCK_EXTERNAL_SERVICES";
pub const ENV_FALLBACK_DECLINATION: &str = "MAGDEC_FALLBACK_DECLINATION";

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{name} {message}")]
    Env { name: &'static str, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for the declination lookup pipeline
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DeclinationConfig {
    pub endpoint: String,
    /// An empty key turns every lookup into a no-op
    pub api_key: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub cache_ttl_days: i64,
    pub failure_threshold: u32,
    pub cooldown_secs: i64,
    /// Defaults to the XDG cache directory
    pub cache_dir: Option<PathBuf>,
    /// Defaults to `breaker.json` in the cache directory
    pub breaker_state_file: Option<PathBuf>,
    /// Used when a lookup yields nothing; zero if unset
    pub fallback_declination: Option<f64>,
    /// Test environments set this to skip all external calls
    pub mock_external_services: bool,
}

impl Default for DeclinationConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: String::new(),
            connect_timeout_secs: MAX_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: MAX_REQUEST_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cache_ttl_days: DEFAULT_TTL_DAYS,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            cache_dir: None,
            breaker_state_file: None,
            fallback_declination: None,
            mock_external_services: false,
        }
    }
}

fn parse_bool(raw: &str) -> bool {
    let lowered = raw.trim().to_ascii_lowercase();
    !matches!(lowered.as_str(), "" | "0" | "false" | "no" | "off")
}

impl DeclinationConfig {
    /// Load configuration from an optional TOML file and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply overrides from an environment lookup function
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(ENV_API_KEY) {
            self.api_key = key.trim().to_string();
        }
        if let Some(endpoint) = lookup(ENV_ENDPOINT) {
            self.endpoint = endpoint.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_MOCK_EXTERNAL_SERVICES) {
            self.mock_external_services = parse_bool(&raw);
        }
        if let Some(raw) = lookup(ENV_FALLBACK_DECLINATION) {
            let value = raw.trim().parse::<f64>().map_err(|_| ConfigError::Env {
                name: ENV_FALLBACK_DECLINATION,
                message: "must be a number".to_string(),
            })?;
            self.fallback_declination = Some(value);
        }
        Ok(())
    }

    /// Check every setting, reporting all problems at once
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut issues: Vec<String> = Vec::new();

        if self.endpoint.trim().is_empty() {
            issues.push("endpoint must not be empty".into());
        }
        if self.connect_timeout_secs == 0 {
            issues.push("connect_timeout_secs must be > 0".into());
        }
        if self.request_timeout_secs == 0 {
            issues.push("request_timeout_secs must be > 0".into());
        }
        if self.connect_timeout_secs > MAX_CONNECT_TIMEOUT_SECS {
            issues.push(format!("connect_timeout_secs must be <= {MAX_CONNECT_TIMEOUT_SECS}"));
        }
        if self.request_timeout_secs > MAX_REQUEST_TIMEOUT_SECS {
            issues.push(format!("request_timeout_secs must be <= {MAX_REQUEST_TIMEOUT_SECS}"));
        }
        if self.connect_timeout_secs > self.request_timeout_secs {
            issues.push("connect_timeout_secs must be <= request_timeout_secs".into());
        }
        if self.cache_ttl_days <= 0 {
            issues.push("cache_ttl_days must be > 0".into());
        } else if self.cache_ttl_days > MAX_CACHE_TTL_DAYS
            || Duration::try_days(self.cache_ttl_days).is_none()
        {
            issues.push(format!("cache_ttl_days must be <= {MAX_CACHE_TTL_DAYS}"));
        }
        if self.failure_threshold == 0 {
            issues.push("failure_threshold must be > 0".into());
        }
        if self.cooldown_secs <= 0 {
            issues.push("cooldown_secs must be > 0".into());
        } else if self.cooldown_secs > MAX_COOLDOWN_SECS
            || Duration::try_seconds(self.cooldown_secs).is_none()
        {
            issues.push(format!("cooldown_secs must be <= {MAX_COOLDOWN_SECS}"));
        }
        if let Some(fallback) = self.fallback_declination {
            if !is_valid_declination(fallback) {
                issues.push("fallback_declination must be within [-180, 180]".into());
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(issues.join("; ")))
        }
    }

    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }

    /// Cache TTL; an unrepresentable setting falls back to the default
    pub fn cache_ttl(&self) -> Duration {
        Duration::try_days(self.cache_ttl_days)
            .unwrap_or_else(|| Duration::days(DEFAULT_TTL_DAYS))
    }

    pub fn breaker_config(&self) -> BreakerConfig {
        let cooldown = Duration::try_seconds(self.cooldown_secs)
            .unwrap_or_else(|| Duration::seconds(DEFAULT_COOLDOWN_SECS));
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            cooldown,
        }
    }

    /// Cache directory: configured, else XDG, else a relative fallback
    pub fn resolved_cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.cache_dir {
            return dir.clone();
        }
        ProjectDirs::from("", "", "magdec")
            .map(|dirs| dirs.cache_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(FALLBACK_CACHE_DIR))
    }

    pub fn resolved_breaker_state_file(&self) -> PathBuf {
        self.breaker_state_file
            .clone()
            .unwrap_or_else(|| self.resolved_cache_dir().join(BREAKER_STATE_FILE))
    }

    /// Build the breaker this configuration describes, restoring persisted state
    pub fn breaker(&self) -> CircuitBreaker {
        CircuitBreaker::with_state_file(self.breaker_config(), self.resolved_breaker_state_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_match_lookup_contract() {
        let config = DeclinationConfig::default();
        assert_eq!(config.connect_timeout_secs, 5);
        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.cache_ttl(), Duration::days(7));
        assert_eq!(config.failure_threshold, 5);
        assert!(config.api_key.is_empty());
        assert!(!config.mock_external_services);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_overrides_selected_fields() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("magdec.toml");
        fs::write(
            &path,
            r#"
api_key = "abc"
cooldown_secs = 30
fallback_declination = 12.5
cache_dir = "/tmp/magdec-test"
"#,
        )
        .unwrap();

        let config = DeclinationConfig::from_file(&path).unwrap();

        assert_eq!(config.api_key, "abc");
        assert_eq!(config.cooldown_secs, 30);
        assert_eq!(config.fallback_declination, Some(12.5));
        assert_eq!(config.resolved_cache_dir(), PathBuf::from("/tmp/magdec-test"));
        assert_eq!(
            config.resolved_breaker_state_file(),
            PathBuf::from("/tmp/magdec-test/breaker.json")
        );
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_from_file_missing_reports_path() {
        let err = DeclinationConfig::from_file(Path::new("/nonexistent/magdec.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/magdec.toml"));
    }

    #[test]
    fn test_from_file_rejects_bad_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("magdec.toml");
        fs::write(&path, "failure_threshold = \"five\"").unwrap();

        assert!(matches!(DeclinationConfig::from_file(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = DeclinationConfig::default();
        config
            .apply_env(env(&[
                (ENV_API_KEY, " secret "),
                (ENV_ENDPOINT, "http://localhost:9999/decl"),
                (ENV_MOCK_EXTERNAL_SERVICES, "true"),
                (ENV_FALLBACK_DECLINATION, "-4.5"),
            ]))
            .unwrap();

        assert_eq!(config.api_key, "secret");
        assert_eq!(config.endpoint, "http://localhost:9999/decl");
        assert!(config.mock_external_services);
        assert_eq!(config.fallback_declination, Some(-4.5));
    }

    #[test]
    fn test_env_mock_flag_falsy_values() {
        for raw in ["0", "false", "No", "off", ""] {
            let mut config = DeclinationConfig {
                mock_external_services: true,
                ..Default::default()
            };
            config.apply_env(env(&[(ENV_MOCK_EXTERNAL_SERVICES, raw)])).unwrap();
            assert!(!config.mock_external_services, "{raw:?} should be false");
        }
    }

    #[test]
    fn test_env_bad_fallback_is_error() {
        let mut config = DeclinationConfig::default();
        let err = config
            .apply_env(env(&[(ENV_FALLBACK_DECLINATION, "east")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_FALLBACK_DECLINATION));
    }

    #[test]
    fn test_validate_collects_all_issues() {
        let config = DeclinationConfig {
            connect_timeout_secs: 0,
            failure_threshold: 0,
            fallback_declination: Some(400.0),
            ..Default::default()
        };

        let message = config.validate().unwrap_err().to_string();

        assert!(message.contains("connect_timeout_secs"));
        assert!(message.contains("failure_threshold"));
        assert!(message.contains("fallback_declination"));
    }

    #[test]
    fn test_validate_rejects_slow_timeouts() {
        let config = DeclinationConfig {
            connect_timeout_secs: 60,
            request_timeout_secs: 600,
            ..Default::default()
        };

        let message = config.validate().unwrap_err().to_string();

        assert!(message.contains("connect_timeout_secs must be <= 5"), "{message}");
        assert!(message.contains("request_timeout_secs must be <= 10"), "{message}");
    }

    #[test]
    fn test_validate_accepts_timeouts_at_limits() {
        let config = DeclinationConfig {
            connect_timeout_secs: 5,
            request_timeout_secs: 10,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_huge_durations() {
        let config = DeclinationConfig {
            cooldown_secs: 1_000_000_000_000_000,
            cache_ttl_days: i64::MAX,
            ..Default::default()
        };

        let message = config.validate().unwrap_err().to_string();

        assert!(message.contains("cooldown_secs must be <="), "{message}");
        assert!(message.contains("cache_ttl_days must be <="), "{message}");
    }

    #[test]
    fn test_unrepresentable_durations_fall_back_to_defaults() {
        let config = DeclinationConfig {
            cooldown_secs: i64::MAX,
            cache_ttl_days: i64::MAX,
            ..Default::default()
        };
        assert_eq!(config.cache_ttl(), Duration::days(DEFAULT_TTL_DAYS));
        assert_eq!(
            config.breaker_config().cooldown,
            Duration::seconds(DEFAULT_COOLDOWN_SECS)
        );
    }

    #[test]
    fn test_breaker_config_from_settings() {
        let config = DeclinationConfig {
            failure_threshold: 3,
            cooldown_secs: 45,
            ..Default::default()
        };
        let breaker = config.breaker_config();
        assert_eq!(breaker.failure_threshold, 3);
        assert_eq!(breaker.cooldown, Duration::seconds(45));
    }
}
