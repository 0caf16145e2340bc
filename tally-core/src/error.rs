//! Error types for Tally operations

use std::time::Duration;
use thiserror::Error;

/// Record source errors.
///
/// Both variants are recoverable from the cache's point of view: a stale
/// snapshot is served when one exists.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("Record source unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Record source malformed: {reason}")]
    Malformed { reason: String },
}

impl SourceError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    /// Load did not finish within the configured deadline.
    pub fn timed_out(after: Duration) -> Self {
        Self::Unavailable {
            reason: format!("load timed out after {}ms", after.as_millis()),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}

/// Change-watch errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WatchError {
    #[error("Change watching unsupported: {reason}")]
    Unsupported { reason: String },
}

impl WatchError {
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported {
            reason: reason.into(),
        }
    }
}

/// Aggregate cache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Recompute failed: {0}")]
    Source(#[from] SourceError),

    #[error("Cache state lock poisoned")]
    LockPoisoned,

    #[error("Recompute aborted before producing a result")]
    RecomputeAborted,
}

impl CacheError {
    /// The underlying source error, if this failure came from the source.
    pub fn source_error(&self) -> Option<&SourceError> {
        match self {
            Self::Source(err) => Some(err),
            _ => None,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

// =============================================================================
// TESTS
// =============================================================================
