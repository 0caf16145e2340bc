//! Tally API - REST layer over the aggregate cache
//!
//! Serves cached aggregate statistics for a JSON record collection and CRUD
//! endpoints for the records themselves. Writes through the CRUD routes and
//! external edits to the backing file both invalidate the cache.

pub mod config;
pub mod error;
pub mod macros;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod types;

// Re-export commonly used types
pub use config::{resolve_bind_addr, ApiConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use openapi::ApiDoc;
pub use routes::create_api_router;
pub use state::{AppState, SharedStore, WriteLock};
pub use types::*;
