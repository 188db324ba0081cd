//! Settings database access
//!
//! Read/write settings from the settings table (key-value store).

use crate::{Error, Result};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use tracing::{info, warn};

/// Generic setting getter
///
/// Returns None if key doesn't exist in database.
/// Parses value from string using FromStr trait.
pub async fn get_setting<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    let value: Option<Option<String>> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    match value.flatten() {
        Some(s) => match s.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(Error::Config(format!(
                "Failed to parse setting '{}' value: {}",
                key, s
            ))),
        },
        None => Ok(None),
    }
}

/// Generic setting setter
///
/// Inserts or updates setting in database.
pub async fn set_setting<T: ToString>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()> {
    let value_str = value.to_string();

    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at)
        VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value_str)
    .execute(db)
    .await?;

    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// If the setting doesn't exist, it will be created with the default.
/// If the setting exists but has a NULL value, it will be reset to the default.
pub async fn ensure_setting(db: &Pool<Sqlite>, key: &str, default_value: &str) -> Result<()> {
    let value: Option<Option<String>> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    match value {
        None => {
            // INSERT OR IGNORE: another connection may have initialized it meanwhile
            sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(default_value)
                .execute(db)
                .await?;

            info!("Initialized setting '{}' with default value: {}", key, default_value);
        }
        Some(None) => {
            sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
                .bind(default_value)
                .bind(key)
                .execute(db)
                .await?;

            warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
        }
        Some(Some(_)) => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> Pool<Sqlite> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        crate::db::init::create_settings_table(&pool).await.unwrap();

        pool
    }

    #[tokio::test]
    async fn test_get_missing_setting_is_none() {
        let db = setup_test_db().await;
        let value: Option<f64> = get_setting(&db, "branch_tolerance").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_set_then_get_setting() {
        let db = setup_test_db().await;
        set_setting(&db, "branch_tolerance", 0.25).await.unwrap();
        let value: Option<f64> = get_setting(&db, "branch_tolerance").await.unwrap();
        assert_eq!(value, Some(0.25));

        // Overwrite keeps a single row
        set_setting(&db, "branch_tolerance", 0.5).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM settings")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_unparseable_setting_is_config_error() {
        let db = setup_test_db().await;
        set_setting(&db, "default_status_id", "abc").await.unwrap();
        let result: Result<Option<i64>> = get_setting(&db, "default_status_id").await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_ensure_setting_keeps_existing_value() {
        let db = setup_test_db().await;
        set_setting(&db, "default_status_id", 1).await.unwrap();
        ensure_setting(&db, "default_status_id", "2").await.unwrap();
        let value: Option<i64> = get_setting(&db, "default_status_id").await.unwrap();
        assert_eq!(value, Some(1));
    }

    #[tokio::test]
    async fn test_ensure_setting_resets_null() {
        let db = setup_test_db().await;
        sqlx::query("INSERT INTO settings (key, value) VALUES ('default_status_id', NULL)")
            .execute(&db)
            .await
            .unwrap();
        ensure_setting(&db, "default_status_id", "2").await.unwrap();
        let value: Option<i64> = get_setting(&db, "default_status_id").await.unwrap();
        assert_eq!(value, Some(2));
    }
}
