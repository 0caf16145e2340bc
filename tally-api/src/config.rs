//! API Configuration Module
//!
//! Server-level settings loaded from environment variables with defaults
//! suitable for local development. Cache tuning lives in
//! [`tally_storage::CacheConfig`].

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tally_storage::DEFAULT_POLL_INTERVAL;

use crate::error::{ApiError, ApiResult};

/// Default location of the record file.
pub const DEFAULT_DATA_PATH: &str = "data/items.json";

/// Default listen port.
pub const DEFAULT_PORT: u16 = 3001;

// ============================================================================
// API CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Path of the JSON record file.
    pub data_path: PathBuf,

    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    /// How often the record file's metadata is polled for changes.
    pub watch_poll_interval: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            cors_origins: Vec::new(),
            cors_max_age_secs: 86400,
            watch_poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `TALLY_DATA_PATH`: Record file path (default: data/items.json)
    /// - `TALLY_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `TALLY_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `TALLY_WATCH_POLL_MS`: File poll interval in milliseconds (default: 50)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let data_path = std::env::var("TALLY_DATA_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.data_path);

        let cors_origins = std::env::var("TALLY_CORS_ORIGINS")
            .ok()
            .map(|s| parse_origins(&s))
            .unwrap_or_default();

        let cors_max_age_secs = std::env::var("TALLY_CORS_MAX_AGE_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.cors_max_age_secs);

        let watch_poll_interval = std::env::var("TALLY_WATCH_POLL_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.watch_poll_interval);

        Self {
            data_path,
            cors_origins,
            cors_max_age_secs,
            watch_poll_interval,
        }
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o == origin)
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect()
}

/// Resolve the listen address from `TALLY_API_BIND` and `PORT` /
/// `TALLY_API_PORT`.
pub fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("TALLY_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("TALLY_API_PORT").ok());
    bind_addr(&host, port.as_deref())
}

fn bind_addr(host: &str, port: Option<&str>) -> ApiResult<SocketAddr> {
    let port = match port {
        Some(raw) => raw
            .parse::<u16>()
            .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", raw)))?,
        None => DEFAULT_PORT,
    };

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
}
