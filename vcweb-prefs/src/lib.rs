//! vcweb-prefs library - user preference pages
//!
//! JSON API for viewing and editing a user's global and project
//! preferences, including per-venue overrides.

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod service;

pub use service::{Action, PreferenceService, PrefsView, ServiceError};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PreferenceService>,
    /// Request signing secret, 0 disables authentication
    pub shared_secret: i64,
}

impl AppState {
    pub fn new(service: PreferenceService, shared_secret: i64) -> Self {
        Self {
            service: Arc::new(service),
            shared_secret,
        }
    }
}

/// Build application router
///
/// `/health` is public; everything under `/api` requires authentication.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    let protected = Router::new()
        .route("/api/prefs/:subset/schema", get(api::get_schema))
        .route("/api/users/:user_id/prefs/:subset", get(api::get_prefs))
        .route("/api/users/:user_id/prefs/:subset/edit", post(api::edit_prefs))
        .route("/api/users/:user_id/prefs/:subset/venues/add", post(api::add_venue))
        .route(
            "/api/users/:user_id/prefs/:subset/venues/remove",
            post(api::remove_venue),
        )
        .route("/api/users/:user_id/prefs/:subset/reset", post(api::reset_prefs))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    let public = Router::new().merge(api::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
