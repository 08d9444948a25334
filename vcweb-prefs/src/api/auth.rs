//! Request authentication middleware
//!
//! GET requests carry `timestamp` and `hash` as query parameters, POST
//! requests as top-level fields of the JSON body. A shared secret of 0
//! lets everything through.

use axum::{
    body::Body,
    extract::{Query, Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tracing::{debug, warn};
use vcweb_common::api::auth::{
    validate_hash, validate_request, validate_timestamp, ApiAuthError, AuthQuery,
};

use crate::AppState;

/// Largest request body accepted on protected routes
const MAX_BODY_BYTES: usize = 1024 * 1024;

pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if state.shared_secret == 0 {
        return Ok(next.run(request).await);
    }

    let request = if *request.method() == Method::GET {
        check_query(&request, state.shared_secret)?;
        request
    } else if *request.method() == Method::POST {
        check_body(request, state.shared_secret).await?
    } else {
        return Err(AuthError::MethodNotAllowed);
    };

    Ok(next.run(request).await)
}

fn check_query(request: &Request, shared_secret: i64) -> Result<(), AuthError> {
    let Query(auth) = Query::<AuthQuery>::try_from_uri(request.uri())
        .map_err(|e| AuthError::MissingFields(e.body_text()))?;

    let signed = json!({
        "timestamp": auth.timestamp,
        "hash": &auth.hash,
    });
    validate_timestamp(auth.timestamp)?;
    validate_hash(&auth.hash, &signed, shared_secret)?;
    Ok(())
}

/// Validate the body and hand back a request with the body restored
async fn check_body(request: Request, shared_secret: i64) -> Result<Request, AuthError> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| AuthError::ParseError(format!("Failed to read body: {}", e)))?;

    let value: Value = serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::ParseError(format!("Invalid JSON: {}", e)))?;

    validate_request(&value, shared_secret)?;
    debug!("Authenticated {} {}", parts.method, parts.uri.path());

    Ok(Request::from_parts(parts, Body::from(bytes)))
}

#[derive(Debug)]
pub enum AuthError {
    InvalidTimestamp(String),
    InvalidHash,
    MissingFields(String),
    ParseError(String),
    MethodNotAllowed,
    Other(String),
}

impl From<ApiAuthError> for AuthError {
    fn from(e: ApiAuthError) -> Self {
        match e {
            ApiAuthError::InvalidTimestamp { reason, .. } => AuthError::InvalidTimestamp(reason),
            ApiAuthError::InvalidHash { provided, calculated } => {
                warn!(
                    "Hash validation failed: provided={}, calculated={}",
                    provided, calculated
                );
                AuthError::InvalidHash
            }
            ApiAuthError::MissingTimestamp | ApiAuthError::MissingHash => {
                AuthError::MissingFields(e.to_string())
            }
            ApiAuthError::ParseError(msg) => AuthError::ParseError(msg),
            ApiAuthError::DatabaseError(msg) => AuthError::Other(msg),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::InvalidTimestamp(reason) => {
                (StatusCode::UNAUTHORIZED, format!("Invalid timestamp: {}", reason))
            }
            AuthError::InvalidHash => (StatusCode::UNAUTHORIZED, "Invalid hash".to_string()),
            AuthError::MissingFields(msg) => {
                (StatusCode::BAD_REQUEST, format!("Missing required fields: {}", msg))
            }
            AuthError::ParseError(msg) => {
                (StatusCode::BAD_REQUEST, format!("Parse error: {}", msg))
            }
            AuthError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                "HTTP method not supported".to_string(),
            ),
            AuthError::Other(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Authentication error: {}", msg),
            ),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
