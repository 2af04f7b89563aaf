use anyhow::Result;
use serde::{de::DeserializeOwned, Serialize};

use super::schema::Database;

impl Database {
    // ========================================================================
    // JSON Record Operations
    // ========================================================================

    /// Read the JSON record stored under `key`.
    ///
    /// A value that no longer parses as `T` is treated as absent: it is
    /// logged and `Ok(None)` is returned, so a corrupt record never takes
    /// the feed down. The next `set_json` overwrites it.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        let Some((raw,)) = row else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Stored record is corrupt, treating as absent");
                Ok(None)
            }
        }
    }

    /// Replace the record stored under `key` (UPSERT, last write wins).
    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set_raw(key, &raw).await
    }

    /// Store an already-encoded value under `key`.
    pub async fn set_raw(&self, key: &str, raw: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        )
        .bind(key)
        .bind(raw)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
