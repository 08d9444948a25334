//! Persistence of encoded preference documents
//!
//! One text blob per user per subset. Load and save are independent calls;
//! there is no transaction spanning a read-modify-write.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::Subset;
use crate::{Error, Result};

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Encoded document for a user, empty when nothing was ever saved
    ///
    /// `Error::NotFound` if the user does not exist.
    async fn load(&self, user_id: i64, subset: Subset) -> Result<String>;

    /// Replace the encoded document; `Ok(false)` when no row was written
    async fn save(&self, user_id: i64, subset: Subset, text: &str) -> Result<bool>;
}

#[cfg(feature = "sqlx")]
pub use sqlite::SqlitePreferenceStore;

#[cfg(feature = "sqlx")]
mod sqlite {
    use sqlx::SqlitePool;
    use tracing::debug;

    use super::*;

    /// Preferences kept in the `global_prefs` / `project_prefs` columns of `users`
    #[derive(Debug, Clone)]
    pub struct SqlitePreferenceStore {
        pool: SqlitePool,
    }

    impl SqlitePreferenceStore {
        pub fn new(pool: SqlitePool) -> Self {
            Self { pool }
        }
    }

    fn column(subset: Subset) -> &'static str {
        match subset {
            Subset::Global => "global_prefs",
            Subset::Project => "project_prefs",
        }
    }

    #[async_trait]
    impl PreferenceStore for SqlitePreferenceStore {
        async fn load(&self, user_id: i64, subset: Subset) -> Result<String> {
            // Column name comes from a fixed match, never from input
            let sql = format!("SELECT {} FROM users WHERE id = ?", column(subset));
            let row: Option<(Option<String>,)> = sqlx::query_as(&sql)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

            match row {
                Some((text,)) => Ok(text.unwrap_or_default()),
                None => Err(Error::NotFound(format!("user {}", user_id))),
            }
        }

        async fn save(&self, user_id: i64, subset: Subset, text: &str) -> Result<bool> {
            let sql = format!("UPDATE users SET {} = ? WHERE id = ?", column(subset));
            let result = sqlx::query(&sql)
                .bind(text)
                .bind(user_id)
                .execute(&self.pool)
                .await?;

            debug!(
                "Saved {} preferences for user {} ({} bytes)",
                subset,
                user_id,
                text.len()
            );
            Ok(result.rows_affected() == 1)
        }
    }
}

/// In-process store for tests and tooling
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    docs: RwLock<HashMap<(i64, Subset), String>>,
    users: RwLock<Vec<i64>>,
    reject_writes: AtomicBool,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user_id: i64) {
        let mut users = self.users.write().await;
        if !users.contains(&user_id) {
            users.push(user_id);
        }
    }

    /// Seed a stored blob directly, bypassing the codec
    pub async fn put(&self, user_id: i64, subset: Subset, text: impl Into<String>) {
        self.add_user(user_id).await;
        self.docs.write().await.insert((user_id, subset), text.into());
    }

    /// Make every following `save` report that nothing was written
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn load(&self, user_id: i64, subset: Subset) -> Result<String> {
        if !self.users.read().await.contains(&user_id) {
            return Err(Error::NotFound(format!("user {}", user_id)));
        }
        Ok(self
            .docs
            .read()
            .await
            .get(&(user_id, subset))
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, user_id: i64, subset: Subset, text: &str) -> Result<bool> {
        if self.reject_writes.load(Ordering::SeqCst) || !self.users.read().await.contains(&user_id)
        {
            return Ok(false);
        }
        self.docs
            .write()
            .await
            .insert((user_id, subset), text.to_string());
        Ok(true)
    }
}
