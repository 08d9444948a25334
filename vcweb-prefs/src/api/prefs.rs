//! Preference endpoints
//!
//! All bodies are JSON. Form field values may be sent as strings, numbers
//! or booleans; they are validated as text the same way a form post is.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use vcweb_common::prefs::{FieldSpec, PrefsError, Schema, Subset, VenueName};

use crate::service::{Action, PrefsView, ServiceError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ViewQuery {
    pub venue: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EditRequest {
    pub venue: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct VenueRequest {
    pub venue: String,
}

#[derive(Debug, Serialize)]
pub struct SchemaResponse {
    pub subset: Subset,
    pub fields: &'static [FieldSpec],
}

/// GET /api/prefs/:subset/schema
pub async fn get_schema(Path(subset): Path<String>) -> Result<Json<SchemaResponse>, ServiceError> {
    let subset: Subset = subset.parse()?;
    Ok(Json(SchemaResponse {
        subset,
        fields: Schema::for_subset(subset).fields(),
    }))
}

/// GET /api/users/:user_id/prefs/:subset?venue=
pub async fn get_prefs(
    State(state): State<AppState>,
    Path((user_id, subset)): Path<(i64, String)>,
    Query(query): Query<ViewQuery>,
) -> Result<Json<PrefsView>, ServiceError> {
    let subset: Subset = subset.parse()?;
    let venue = parse_venue(query.venue.as_deref())?;
    let view = state
        .service
        .execute(user_id, subset, Action::View { venue })
        .await?;
    Ok(Json(view))
}

/// POST /api/users/:user_id/prefs/:subset/edit
pub async fn edit_prefs(
    State(state): State<AppState>,
    Path((user_id, subset)): Path<(i64, String)>,
    Json(request): Json<EditRequest>,
) -> Result<Json<PrefsView>, ServiceError> {
    let subset: Subset = subset.parse()?;
    let venue = parse_venue(request.venue.as_deref())?;
    let fields = request
        .fields
        .into_iter()
        .map(|(name, value)| (name, form_text(value)))
        .collect();
    let view = state
        .service
        .execute(user_id, subset, Action::Edit { venue, fields })
        .await?;
    Ok(Json(view))
}

/// POST /api/users/:user_id/prefs/:subset/venues/add
pub async fn add_venue(
    State(state): State<AppState>,
    Path((user_id, subset)): Path<(i64, String)>,
    Json(request): Json<VenueRequest>,
) -> Result<Json<PrefsView>, ServiceError> {
    let subset: Subset = subset.parse()?;
    let venue: VenueName = request.venue.parse()?;
    let view = state
        .service
        .execute(user_id, subset, Action::AddVenue { venue })
        .await?;
    Ok(Json(view))
}

/// POST /api/users/:user_id/prefs/:subset/venues/remove
pub async fn remove_venue(
    State(state): State<AppState>,
    Path((user_id, subset)): Path<(i64, String)>,
    Json(request): Json<VenueRequest>,
) -> Result<Json<PrefsView>, ServiceError> {
    let subset: Subset = subset.parse()?;
    let venue: VenueName = request.venue.parse()?;
    let view = state
        .service
        .execute(user_id, subset, Action::RemoveVenue { venue })
        .await?;
    Ok(Json(view))
}

/// POST /api/users/:user_id/prefs/:subset/reset
pub async fn reset_prefs(
    State(state): State<AppState>,
    Path((user_id, subset)): Path<(i64, String)>,
) -> Result<Json<PrefsView>, ServiceError> {
    let subset: Subset = subset.parse()?;
    let view = state
        .service
        .execute(user_id, subset, Action::ResetDefaults)
        .await?;
    Ok(Json(view))
}

/// Empty string means base, like an unset form select
fn parse_venue(raw: Option<&str>) -> Result<Option<VenueName>, PrefsError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(name) => name.parse().map(Some),
    }
}

/// Text a form would have submitted for this JSON value
fn form_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Bool(b) => if b { "1" } else { "0" }.to_string(),
        other => other.to_string(),
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::UserNotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Prefs(PrefsError::UnknownSubset(_)) => StatusCode::NOT_FOUND,
            ServiceError::Prefs(PrefsError::VenueExists(_)) => StatusCode::CONFLICT,
            ServiceError::Prefs(PrefsError::SubsetMismatch { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServiceError::Prefs(_) => StatusCode::BAD_REQUEST,
            ServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::StoreWrite => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match &self {
            ServiceError::Validation(errors) => json!({
                "error": self.to_string(),
                "fields": errors,
            }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
