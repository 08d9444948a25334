//! # vcweb Common Library
//!
//! Shared code for the vcweb web tier including:
//! - Preference documents (schema, codec, validation, merging, storage)
//! - Database initialization
//! - API request authentication
//! - Configuration loading

pub mod api;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod prefs;

pub use error::{Error, Result};
