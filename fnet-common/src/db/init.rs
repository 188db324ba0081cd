//! Database initialization
//!
//! Opens (creating on first run) the SQLite database and brings the schema
//! up to date. Every statement is idempotent so initialization can run on
//! each start.

use crate::db::models::{DEFAULT_BRANCH_TOLERANCE, DEFAULT_CONNECTION_STATUSES, DEFAULT_STATUS_ID};
use crate::db::settings::ensure_setting;
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Applied to every pooled connection, not just the first one
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5))
        .journal_mode(SqliteJournalMode::Wal);

    // Single operator, single session: a small pool is enough
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables, seed catalogs and default settings
///
/// Usable on any pool, including `sqlite::memory:` pools in tests.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // File pools already enable this per connection; memory pools need it here
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;

    create_settings_table(pool).await?;
    create_conduit_subtypes_table(pool).await?;
    create_conduits_table(pool).await?;
    create_nodes_table(pool).await?;
    create_tubes_table(pool).await?;
    create_catalog_tables(pool).await?;
    create_branch_attachments_table(pool).await?;
    create_tube_pairings_table(pool).await?;
    create_conduit_pairings_table(pool).await?;

    seed_connection_statuses(pool).await?;
    init_default_settings(pool).await?;

    Ok(())
}

/// Create the settings table
///
/// Stores engine configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_conduit_subtypes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conduit_subtypes (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_conduits_table(pool: &SqlitePool) -> Result<()> {
    // path: JSON array of [x, y] vertices, start of the conduit first
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conduits (
            id INTEGER PRIMARY KEY,
            subtype_id INTEGER NOT NULL REFERENCES conduit_subtypes(id),
            tube_count INTEGER NOT NULL CHECK (tube_count >= 0),
            path TEXT NOT NULL DEFAULT '[]',
            label TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_nodes_table(pool: &SqlitePool) -> Result<()> {
    // Virtual nodes carry the host conduit, the split fraction and the node
    // whose pairing session created them.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS nodes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            label TEXT,
            x REAL,
            y REAL,
            is_virtual INTEGER NOT NULL DEFAULT 0,
            host_conduit_id INTEGER REFERENCES conduits(id),
            position REAL CHECK (position IS NULL OR (position >= 0.0 AND position <= 1.0)),
            origin_node_id INTEGER REFERENCES nodes(id),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_tubes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tubes (
            id INTEGER PRIMARY KEY,
            conduit_id INTEGER NOT NULL REFERENCES conduits(id) ON DELETE CASCADE,
            tube_number INTEGER NOT NULL CHECK (tube_number >= 1),
            UNIQUE (conduit_id, tube_number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_catalog_tables(pool: &SqlitePool) -> Result<()> {
    // color_code: "#RRGGBB" or "#RRGGBB/#RRGGBB" for bicolor tubes
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tube_colors (
            subtype_id INTEGER NOT NULL,
            tube_number INTEGER NOT NULL,
            color_code TEXT NOT NULL,
            PRIMARY KEY (subtype_id, tube_number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS color_names (
            code TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS connection_statuses (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            color TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_branch_attachments_table(pool: &SqlitePool) -> Result<()> {
    // Either a point (x, y) or an already known fraction along the conduit
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS branch_attachments (
            id INTEGER PRIMARY KEY,
            conduit_id INTEGER NOT NULL REFERENCES conduits(id) ON DELETE CASCADE,
            x REAL,
            y REAL,
            fraction REAL,
            CHECK ((x IS NOT NULL AND y IS NOT NULL) OR fraction IS NOT NULL)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_tube_pairings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tube_pairings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tube_a INTEGER NOT NULL REFERENCES tubes(id) ON DELETE CASCADE,
            tube_b INTEGER NOT NULL REFERENCES tubes(id) ON DELETE CASCADE,
            node_id INTEGER NOT NULL REFERENCES nodes(id),
            status_id INTEGER NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (tube_a < tube_b),
            UNIQUE (tube_a, tube_b, node_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tube_pairings_node ON tube_pairings(node_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_conduit_pairings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conduit_pairings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            conduit_a INTEGER NOT NULL REFERENCES conduits(id) ON DELETE CASCADE,
            conduit_b INTEGER NOT NULL REFERENCES conduits(id) ON DELETE CASCADE,
            status_id INTEGER NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (conduit_a < conduit_b),
            UNIQUE (conduit_a, conduit_b)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn seed_connection_statuses(pool: &SqlitePool) -> Result<()> {
    for status in DEFAULT_CONNECTION_STATUSES {
        sqlx::query("INSERT OR IGNORE INTO connection_statuses (id, name, color) VALUES (?, ?, ?)")
            .bind(status.id)
            .bind(status.name)
            .bind(status.color)
            .execute(pool)
            .await?;
    }

    Ok(())
}

/// Initialize or update default settings
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, "default_status_id", &DEFAULT_STATUS_ID.to_string()).await?;
    ensure_setting(pool, "branch_tolerance", &DEFAULT_BRANCH_TOLERANCE.to_string()).await?;

    Ok(())
}
