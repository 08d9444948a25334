//! Integration tests for the vcweb-prefs API endpoints
//!
//! Most tests run with shared_secret = 0 against an in-memory store; the
//! last group uses a real SQLite file.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`
use vcweb_common::db::{create_user, init_database};
use vcweb_common::prefs::{
    MemoryPreferenceStore, PreferenceStore, SqlitePreferenceStore, Subset, VenueName,
};
use vcweb_prefs::{build_router, AppState, PreferenceService};

const USER: i64 = 42;

fn venues() -> Vec<VenueName> {
    ["home", "work", "school"]
        .iter()
        .map(|v| v.parse().unwrap())
        .collect()
}

async fn setup_memory_app() -> (Arc<MemoryPreferenceStore>, Router) {
    let store = Arc::new(MemoryPreferenceStore::new());
    store.add_user(USER).await;
    let service = PreferenceService::new(store.clone(), venues());
    (store, build_router(AppState::new(service, 0)))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

// =============================================================================
// Health and schema
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (_, app) = setup_memory_app().await;

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "vcweb-prefs");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_schema_endpoint() {
    let (_, app) = setup_memory_app().await;

    let response = app.oneshot(get("/api/prefs/global/schema")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["subset"], "global");
    let fields = body["fields"].as_array().unwrap();
    let max_cpu = fields
        .iter()
        .find(|f| f["name"] == "max_cpu_pct")
        .expect("max_cpu_pct in schema");
    assert_eq!(max_cpu["kind"]["type"], "integer");
    assert_eq!(max_cpu["kind"]["max"], 100);
    assert_eq!(max_cpu["default_value"], "100");
}

#[tokio::test]
async fn test_unknown_subset_is_404() {
    let (_, app) = setup_memory_app().await;

    let response = app.oneshot(get("/api/prefs/local/schema")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// View and edit
// =============================================================================

#[tokio::test]
async fn test_view_defaults_for_new_user() {
    let (_, app) = setup_memory_app().await;

    let response = app
        .oneshot(get(&format!("/api/users/{}/prefs/global", USER)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["state"], "no_overrides");
    assert_eq!(body["effective"]["max_cpu_pct"], 100);
    assert_eq!(body["effective"]["run_on_batteries"], false);
    assert_eq!(body["venue"], Value::Null);
    assert_eq!(body["venues"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_unknown_user_is_404() {
    let (_, app) = setup_memory_app().await;

    let response = app
        .oneshot(get("/api/users/7/prefs/project"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_venue_edit_then_view() {
    let (_, app) = setup_memory_app().await;
    let uri = format!("/api/users/{}/prefs/global", USER);

    let response = app
        .clone()
        .oneshot(post(
            &format!("{}/edit", uri),
            json!({"venue": "work", "fields": {"max_cpu_pct": 50}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["venue"], "work");
    assert_eq!(body["overrides"]["max_cpu_pct"], 50);

    let response = app
        .clone()
        .oneshot(get(&format!("{}?venue=work", uri)))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["state"], "has_overrides");
    assert_eq!(body["effective"]["max_cpu_pct"], 50);

    let response = app.oneshot(get(&uri)).await.unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["effective"]["max_cpu_pct"], 100);
}

#[tokio::test]
async fn test_validation_errors_are_422() {
    let (store, app) = setup_memory_app().await;

    let response = app
        .oneshot(post(
            &format!("/api/users/{}/prefs/global/edit", USER),
            json!({"fields": {"max_cpu_pct": "200", "idle_time_to_run": "soon", "run_on_batteries": true}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = extract_json(response.into_body()).await;
    let fields = body["fields"].as_array().unwrap();
    assert_eq!(fields.len(), 2);
    assert!(fields
        .iter()
        .any(|f| f["field"] == "max_cpu_pct" && f["reason"] == "value 200 out of range [1, 100]"));

    // Nothing was saved, not even the valid field
    assert_eq!(store.load(USER, Subset::Global).await.unwrap(), "");
}

#[tokio::test]
async fn test_base_only_field_rejected_for_venue() {
    let (_, app) = setup_memory_app().await;

    let response = app
        .oneshot(post(
            &format!("/api/users/{}/prefs/project/edit", USER),
            json!({"venue": "home", "fields": {"send_email": false}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["fields"][0]["reason"], "cannot be set per venue");
}

#[tokio::test]
async fn test_unconfigured_venue_is_400() {
    let (_, app) = setup_memory_app().await;

    let response = app
        .clone()
        .oneshot(get(&format!("/api/users/{}/prefs/global?venue=mars", USER)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(post(
            &format!("/api/users/{}/prefs/global/venues/add", USER),
            json!({"venue": "Not A Venue"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Venue management and reset
// =============================================================================

#[tokio::test]
async fn test_add_remove_venue() {
    let (_, app) = setup_memory_app().await;
    let uri = format!("/api/users/{}/prefs/project", USER);

    let response = app
        .clone()
        .oneshot(post(&format!("{}/venues/add", uri), json!({"venue": "school"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["overrides"]["resource_share"], 100);

    let response = app
        .clone()
        .oneshot(post(&format!("{}/venues/add", uri), json!({"venue": "school"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(post(&format!("{}/venues/remove", uri), json!({"venue": "school"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = extract_json(response.into_body()).await;
        assert_eq!(body["state"], "no_overrides");
    }
}

#[tokio::test]
async fn test_reset_restores_defaults() {
    let (_, app) = setup_memory_app().await;
    let uri = format!("/api/users/{}/prefs/global", USER);

    app.clone()
        .oneshot(post(
            &format!("{}/edit", uri),
            json!({"venue": "home", "fields": {"max_cpu_pct": "20"}}),
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(post(&format!("{}/reset", uri), json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["state"], "no_overrides");
    assert_eq!(body["base"]["max_cpu_pct"], 100);
}

#[tokio::test]
async fn test_store_write_failure_is_503() {
    let (store, app) = setup_memory_app().await;
    store.set_reject_writes(true);

    let response = app
        .oneshot(post(
            &format!("/api/users/{}/prefs/global/edit", USER),
            json!({"fields": {"max_cpu_pct": "60"}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"], "Couldn't update preferences. Try again later.");
}

// =============================================================================
// SQLite-backed
// =============================================================================

#[tokio::test]
async fn test_sqlite_edit_round_trip() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("vcweb.db")).await.unwrap();
    let user_id = create_user(&pool, "Cy", "cy@example.com").await.unwrap();
    let store = Arc::new(SqlitePreferenceStore::new(pool));
    let app = build_router(AppState::new(
        PreferenceService::new(store.clone(), venues()),
        0,
    ));

    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/users/{}/prefs/project/edit", user_id),
            json!({"fields": {"color_scheme": "Underwater", "no_cpu": "yes"}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stored = store.load(user_id, Subset::Project).await.unwrap();
    assert!(stored.starts_with("<project_preferences>"));
    assert!(stored.contains("<color_scheme>Underwater</color_scheme>"));
    assert!(stored.contains("<no_cpu>1</no_cpu>"));

    let response = app
        .oneshot(get(&format!("/api/users/{}/prefs/project", user_id)))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["effective"]["color_scheme"], "Underwater");
    assert_eq!(body["effective"]["no_cpu"], true);
    assert!(body["mod_time"].is_i64());
}
