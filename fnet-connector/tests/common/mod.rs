//! Shared fixtures for connector integration tests

use fnet_connector::{ConnectorSession, Store};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

/// Two 4-tube conduits meeting at node 1, plus a second node and a third conduit
pub const FIXTURE: &str = r#"
    INSERT INTO conduit_subtypes (id, name) VALUES (1, '4x 10/6');
    INSERT INTO conduits (id, subtype_id, tube_count, path) VALUES
        (10, 1, 4, '[[0,0],[10,0]]'),
        (20, 1, 4, '[[0,0],[0,10]]'),
        (30, 1, 4, '[[0,0],[-10,0]]');
    INSERT INTO tubes (id, conduit_id, tube_number) VALUES
        (101, 10, 1), (102, 10, 2), (103, 10, 3), (104, 10, 4),
        (201, 20, 1), (202, 20, 2), (203, 20, 3), (204, 20, 4),
        (301, 30, 1), (302, 30, 2), (303, 30, 3), (304, 30, 4);
    INSERT INTO nodes (id, label, x, y) VALUES (1, 'K1', 0.0, 0.0), (2, 'K2', 40.0, 0.0);
"#;

pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    fnet_common::db::create_schema(&pool).await.unwrap();
    sqlx::raw_sql(FIXTURE).execute(&pool).await.unwrap();
    pool
}

/// Session with node 1 selected and conduits 10 (left) / 20 (right) loaded
pub async fn loaded_session(pool: &SqlitePool) -> ConnectorSession {
    let mut session = ConnectorSession::open(Store::from_pool(pool.clone())).await.unwrap();
    session.select_node(fnet_connector::NodeId(1)).await.unwrap();
    session
        .load_conduits(fnet_connector::ConduitId(10), fnet_connector::ConduitId(20))
        .await
        .unwrap();
    session
}

/// Every row the commit can touch, rendered as JSON text
pub async fn dump(pool: &SqlitePool) -> Vec<String> {
    let queries = [
        "SELECT json_array(id, label, x, y, is_virtual, host_conduit_id, position, origin_node_id, created_at, updated_at) FROM nodes ORDER BY id",
        "SELECT json_array(id, tube_a, tube_b, node_id, status_id, created_at, updated_at) FROM tube_pairings ORDER BY id",
        "SELECT json_array(id, conduit_a, conduit_b, status_id, created_at, updated_at) FROM conduit_pairings ORDER BY id",
    ];

    let mut rows = Vec::new();
    for query in queries {
        let mut table: Vec<String> = sqlx::query_scalar(query).fetch_all(pool).await.unwrap();
        rows.append(&mut table);
        rows.push("--".to_string());
    }
    rows
}
