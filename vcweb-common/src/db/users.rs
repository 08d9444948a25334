//! User rows

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::{Error, Result};

/// A user account, without its preference blobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email_addr: String,
    pub create_time: i64,
}

pub async fn create_user(pool: &SqlitePool, name: &str, email_addr: &str) -> Result<i64> {
    let result = sqlx::query("INSERT INTO users (name, email_addr) VALUES (?, ?)")
        .bind(name)
        .bind(email_addr)
        .execute(pool)
        .await?;

    Ok(result.last_insert_rowid())
}

pub async fn get_user(pool: &SqlitePool, id: i64) -> Result<User> {
    sqlx::query_as::<_, User>(
        "SELECT id, name, email_addr, create_time FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("user {}", id)))
}
