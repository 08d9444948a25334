//! Request signing with a shared secret
//!
//! Every protected request carries `timestamp` (Unix epoch milliseconds) and
//! `hash` (SHA-256, 64 hex chars): in the query string for GET requests, as
//! top-level fields of the JSON body for POST requests.
//!
//! The hash covers the canonical JSON of the request fields with `hash`
//! replaced by 64 zeros, followed by the shared secret in decimal. A shared
//! secret of 0 turns checking off.
//!
//! Only pure functions and settings-table access live here; the axum
//! middleware is in the service crate.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[cfg(feature = "sqlx")]
use sqlx::SqlitePool;

/// Settings key holding the shared secret
pub const SHARED_SECRET_KEY: &str = "api_shared_secret";

/// Oldest accepted request age
pub const MAX_PAST_MS: i64 = 1000;
/// Tolerated clock skew into the future
pub const MAX_FUTURE_MS: i64 = 1;

const DUMMY_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiAuthError {
    #[error("Invalid timestamp: {reason}")]
    InvalidTimestamp { timestamp: i64, now: i64, reason: String },

    #[error("Invalid hash")]
    InvalidHash { provided: String, calculated: String },

    #[error("Missing timestamp field")]
    MissingTimestamp,

    #[error("Missing hash field")]
    MissingHash,

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Auth fields of a GET request's query string
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthQuery {
    pub timestamp: i64,
    pub hash: String,
}

/// Shared secret from the settings table, generated on first use
#[cfg(feature = "sqlx")]
pub async fn load_shared_secret(db: &SqlitePool) -> Result<i64, ApiAuthError> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(SHARED_SECRET_KEY)
        .fetch_optional(db)
        .await
        .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    match row {
        Some((value,)) => value
            .trim()
            .parse::<i64>()
            .map_err(|e| ApiAuthError::DatabaseError(format!("{}: {}", SHARED_SECRET_KEY, e))),
        None => initialize_shared_secret(db).await,
    }
}

/// Store a fresh random non-zero secret
#[cfg(feature = "sqlx")]
pub async fn initialize_shared_secret(db: &SqlitePool) -> Result<i64, ApiAuthError> {
    use rand::Rng;

    let mut rng = rand::thread_rng();
    let secret: i64 = loop {
        let val = rng.gen::<i64>();
        if val != 0 {
            break val;
        }
    };

    sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)")
        .bind(SHARED_SECRET_KEY)
        .bind(secret.to_string())
        .execute(db)
        .await
        .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    Ok(secret)
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Check a request timestamp against the current clock
pub fn validate_timestamp(timestamp: i64) -> Result<(), ApiAuthError> {
    validate_timestamp_at(timestamp, now_millis())
}

/// Check a request timestamp against `now`
///
/// Accepted window is `[now - MAX_PAST_MS, now + MAX_FUTURE_MS]`.
pub fn validate_timestamp_at(timestamp: i64, now: i64) -> Result<(), ApiAuthError> {
    let Some(age) = now.checked_sub(timestamp) else {
        return Err(ApiAuthError::InvalidTimestamp {
            timestamp,
            now,
            reason: "Timestamp out of range".to_string(),
        });
    };

    if age > MAX_PAST_MS {
        return Err(ApiAuthError::InvalidTimestamp {
            timestamp,
            now,
            reason: format!("Timestamp {}ms too old (max {}ms past)", age, MAX_PAST_MS),
        });
    }
    if age < -MAX_FUTURE_MS {
        return Err(ApiAuthError::InvalidTimestamp {
            timestamp,
            now,
            reason: format!(
                "Timestamp {}ms in future (max {}ms future)",
                age.unsigned_abs(),
                MAX_FUTURE_MS
            ),
        });
    }
    Ok(())
}

/// SHA-256 over canonical JSON (with `hash` zeroed) plus the secret
///
/// ```
/// use vcweb_common::api::auth::calculate_hash;
/// use serde_json::json;
///
/// let body = json!({"venue": "work", "timestamp": 1730000000000i64, "hash": ""});
/// assert_eq!(calculate_hash(&body, 42).len(), 64);
/// ```
pub fn calculate_hash(json_value: &Value, shared_secret: i64) -> String {
    let mut value = json_value.clone();
    if let Some(obj) = value.as_object_mut() {
        obj.insert("hash".to_string(), Value::String(DUMMY_HASH.to_string()));
    }

    let mut hasher = Sha256::new();
    hasher.update(to_canonical_json(&value).as_bytes());
    hasher.update(shared_secret.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// JSON with object keys sorted and no whitespace
pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            let items: Vec<String> = pairs
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), to_canonical_json(v)))
                .collect();
            format!("{{{}}}", items.join(","))
        }
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        // Display of a scalar Value is its compact JSON text
        other => other.to_string(),
    }
}

pub fn validate_hash(
    provided_hash: &str,
    json_value: &Value,
    shared_secret: i64,
) -> Result<(), ApiAuthError> {
    let calculated = calculate_hash(json_value, shared_secret);
    if provided_hash != calculated {
        return Err(ApiAuthError::InvalidHash {
            provided: provided_hash.to_string(),
            calculated,
        });
    }
    Ok(())
}

/// Validate the `timestamp` and `hash` fields of a JSON object
///
/// Secret 0 accepts everything.
pub fn validate_request(value: &Value, shared_secret: i64) -> Result<(), ApiAuthError> {
    if shared_secret == 0 {
        return Ok(());
    }

    let timestamp = value
        .get("timestamp")
        .and_then(Value::as_i64)
        .ok_or(ApiAuthError::MissingTimestamp)?;
    let hash = value
        .get("hash")
        .and_then(Value::as_str)
        .ok_or(ApiAuthError::MissingHash)?;

    validate_timestamp(timestamp)?;
    validate_hash(hash, value, shared_secret)
}

/// Add `timestamp` and a matching `hash` to a JSON object
///
/// Client-side counterpart of `validate_request`.
pub fn sign(fields: Map<String, Value>, shared_secret: i64) -> Value {
    let mut value = Value::Object(fields);
    if let Some(obj) = value.as_object_mut() {
        obj.insert("timestamp".to_string(), Value::from(now_millis()));
    }
    let hash = calculate_hash(&value, shared_secret);
    if let Some(obj) = value.as_object_mut() {
        obj.insert("hash".to_string(), Value::String(hash));
    }
    value
}
