//! Tests for database initialization
//!
//! Covers automatic database creation, idempotent re-opening, catalog
//! seeding and default settings.

use fnet_common::db::init::init_database;
use fnet_common::db::settings::get_setting;
use fnet_common::db::DEFAULT_CONNECTION_STATUSES;
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("fnet.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("fnet.db");

    let pool1 = init_database(&db_path).await;
    assert!(pool1.is_ok());
    pool1.unwrap().close().await;

    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());
}

#[tokio::test]
async fn test_connection_statuses_seeded_once() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("fnet.db");

    init_database(&db_path).await.unwrap().close().await;
    let pool = init_database(&db_path).await.unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM connection_statuses")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, DEFAULT_CONNECTION_STATUSES.len() as i64);

    let planned: String = sqlx::query_scalar("SELECT name FROM connection_statuses WHERE id = 2")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(planned, "planned");
}

#[tokio::test]
async fn test_default_settings_initialized() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("fnet.db");
    let pool = init_database(&db_path).await.unwrap();

    let status: Option<i64> = get_setting(&pool, "default_status_id").await.unwrap();
    assert_eq!(status, Some(2));

    let tolerance: Option<f64> = get_setting(&pool, "branch_tolerance").await.unwrap();
    assert_eq!(tolerance, Some(0.1));
}

#[tokio::test]
async fn test_pairing_rows_must_be_normalized() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("fnet.db");
    let pool = init_database(&db_path).await.unwrap();

    sqlx::query("INSERT INTO conduit_subtypes (id, name) VALUES (1, 'test')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO conduits (id, subtype_id, tube_count) VALUES (1, 1, 2)")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO tubes (id, conduit_id, tube_number) VALUES (10, 1, 1), (11, 1, 2)")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO nodes (id, label) VALUES (1, 'N1')")
        .execute(&pool)
        .await
        .unwrap();

    // tube_a must be the smaller id
    let result = sqlx::query(
        "INSERT INTO tube_pairings (tube_a, tube_b, node_id, status_id) VALUES (11, 10, 1, 2)",
    )
    .execute(&pool)
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_every_pooled_connection_has_pragmas() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("fnet.db");
    let pool = init_database(&db_path).await.unwrap();

    // Hold two connections at once so the second one is freshly opened
    let mut first = pool.acquire().await.unwrap();
    let mut second = pool.acquire().await.unwrap();

    for conn in [&mut first, &mut second] {
        let foreign_keys: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&mut **conn)
            .await
            .unwrap();
        assert_eq!(foreign_keys, 1);

        let journal_mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(&mut **conn)
            .await
            .unwrap();
        assert_eq!(journal_mode.to_lowercase(), "wal");

        let busy_timeout: i64 = sqlx::query_scalar("PRAGMA busy_timeout")
            .fetch_one(&mut **conn)
            .await
            .unwrap();
        assert_eq!(busy_timeout, 5000);
    }
}
