//! Key-value access
//!
//! Values are stored as JSON text, one document per key.

use crate::Result;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::SqlitePool;

/// Raw value for `key`
pub async fn get_value(db: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM kv_store WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;
    Ok(value)
}

/// Insert or overwrite the raw value for `key`
pub async fn set_value(db: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO kv_store (key, value, updated_at)
        VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(db)
    .await?;

    Ok(())
}

/// Remove `key`; absent keys are not an error
pub async fn delete_value(db: &SqlitePool, key: &str) -> Result<()> {
    sqlx::query("DELETE FROM kv_store WHERE key = ?")
        .bind(key)
        .execute(db)
        .await?;
    Ok(())
}

/// Decode the JSON document stored under `key`
pub async fn get_json<T: DeserializeOwned>(db: &SqlitePool, key: &str) -> Result<Option<T>> {
    match get_value(db, key).await? {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

/// Store `value` as JSON under `key`
pub async fn set_json<T: Serialize + ?Sized>(db: &SqlitePool, key: &str, value: &T) -> Result<()> {
    let text = serde_json::to_string(value)?;
    set_value(db, key, &text).await
}
