//! HTTP API helpers shared by services
//!
//! Framework-independent: pure functions plus database access. Services
//! wrap these in their own middleware.

pub mod auth;

#[cfg(feature = "sqlx")]
pub use auth::{initialize_shared_secret, load_shared_secret};
pub use auth::{
    calculate_hash, sign, validate_hash, validate_request, validate_timestamp, ApiAuthError,
    AuthQuery,
};
