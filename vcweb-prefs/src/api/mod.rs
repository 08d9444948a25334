//! HTTP API handlers for vcweb-prefs

pub mod auth;
pub mod health;
pub mod prefs;

pub use auth::auth_middleware;
pub use health::health_routes;
pub use prefs::{add_venue, edit_prefs, get_prefs, get_schema, remove_venue, reset_prefs};
