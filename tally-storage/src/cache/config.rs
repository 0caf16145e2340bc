//! Aggregate cache configuration.

use std::time::Duration;

use tally_core::ConfigError;

/// Configuration for the aggregate cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum age at which a snapshot is still served without recompute.
    pub ttl: Duration,
    /// Quiet period that must pass after the last raw change event before
    /// an invalidation fires.
    pub debounce_window: Duration,
    /// Deadline for one record source load. `None` waits indefinitely.
    pub load_timeout: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            debounce_window: Duration::from_millis(100),
            load_timeout: None,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the snapshot TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the debounce quiet period.
    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window = window;
        self
    }

    /// Set a deadline for source loads.
    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = Some(timeout);
        self
    }

    /// Create CacheConfig from environment variables.
    ///
    /// Environment variables:
    /// - `TALLY_CACHE_TTL_MS`: snapshot TTL (default: 300000)
    /// - `TALLY_DEBOUNCE_MS`: debounce quiet period (default: 100)
    /// - `TALLY_LOAD_TIMEOUT_MS`: source load deadline (default: none)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            ttl: env_millis("TALLY_CACHE_TTL_MS")?.unwrap_or(defaults.ttl),
            debounce_window: env_millis("TALLY_DEBOUNCE_MS")?.unwrap_or(defaults.debounce_window),
            load_timeout: env_millis("TALLY_LOAD_TIMEOUT_MS")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject zero-length windows.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl.is_zero() {
            return Err(invalid("ttl", "0", "must be greater than zero"));
        }
        if self.debounce_window.is_zero() {
            return Err(invalid("debounce_window", "0", "must be greater than zero"));
        }
        if self.load_timeout.is_some_and(|t| t.is_zero()) {
            return Err(invalid("load_timeout", "0", "must be greater than zero"));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn env_millis(key: &str) -> Result<Option<Duration>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|e| invalid(key, &raw, &e.to_string())),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EnvVarGuard {
        key: &'static str,
        original: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let original = std::env::var(key).ok();
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
            Self { key, original }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.original.as_deref() {
                Some(v) => std::env::set_var(self.key, v),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn test_defaults_match_reference_behavior() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(300));
        assert_eq!(config.debounce_window, Duration::from_millis(100));
        assert_eq!(config.load_timeout, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cache_config_builder() {
        let config = CacheConfig::new()
            .with_ttl(Duration::from_secs(5))
            .with_debounce_window(Duration::from_millis(20))
            .with_load_timeout(Duration::from_secs(1));

        assert_eq!(config.ttl, Duration::from_secs(5));
        assert_eq!(config.debounce_window, Duration::from_millis(20));
        assert_eq!(config.load_timeout, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_validate_rejects_zero_windows() {
        assert!(CacheConfig::new().with_ttl(Duration::ZERO).validate().is_err());
        assert!(CacheConfig::new()
            .with_debounce_window(Duration::ZERO)
            .validate()
            .is_err());
    }

    // Env-var cases share one test so they never race each other.
    #[test]
    fn test_from_env() {
        let _ttl = EnvVarGuard::set("TALLY_CACHE_TTL_MS", Some("5000"));
        let _debounce = EnvVarGuard::set("TALLY_DEBOUNCE_MS", None);
        let _timeout = EnvVarGuard::set("TALLY_LOAD_TIMEOUT_MS", Some("750"));

        let config = CacheConfig::from_env().expect("valid env");
        assert_eq!(config.ttl, Duration::from_millis(5000));
        assert_eq!(config.debounce_window, Duration::from_millis(100));
        assert_eq!(config.load_timeout, Some(Duration::from_millis(750)));

        let _bad = EnvVarGuard::set("TALLY_DEBOUNCE_MS", Some("soon"));
        let err = CacheConfig::from_env().expect_err("invalid debounce");
        assert!(err.to_string().contains("TALLY_DEBOUNCE_MS"));
    }
}
