//! Tube and conduit pairing rows
//!
//! Reads return node-scoped tube pairings for one conduit pair. Writes take
//! the open commit transaction so they all succeed or fail together.

use crate::sync::{PairingRecord, SplitPoint};
use crate::types::{ConduitId, ConduitPairKey, NodeId, PairKey, StatusId, TubeId};
use fnet_common::Result;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

/// Persisted tube pairings at `node` between the two given conduits
pub async fn load_pairings(
    db: &SqlitePool,
    node: NodeId,
    left: ConduitId,
    right: ConduitId,
) -> Result<Vec<PairingRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT p.tube_a, p.tube_b, p.status_id,
               ta.conduit_id AS conduit_a, tb.conduit_id AS conduit_b
        FROM tube_pairings p
        JOIN tubes ta ON ta.id = p.tube_a
        JOIN tubes tb ON tb.id = p.tube_b
        WHERE p.node_id = ?
          AND ((ta.conduit_id = ? AND tb.conduit_id = ?)
            OR (ta.conduit_id = ? AND tb.conduit_id = ?))
        ORDER BY p.tube_a, p.tube_b
        "#,
    )
    .bind(node.0)
    .bind(left.0)
    .bind(right.0)
    .bind(right.0)
    .bind(left.0)
    .fetch_all(db)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| PairingRecord {
            key: PairKey::new(TubeId(row.get("tube_a")), TubeId(row.get("tube_b"))),
            conduits: ConduitPairKey::new(ConduitId(row.get("conduit_a")), ConduitId(row.get("conduit_b"))),
            status: StatusId(row.get("status_id")),
        })
        .collect())
}

/// Current conduit-level aggregate status, if a row exists
pub async fn conduit_pairing_status(db: &SqlitePool, key: ConduitPairKey) -> Result<Option<StatusId>> {
    let status: Option<i64> =
        sqlx::query_scalar("SELECT status_id FROM conduit_pairings WHERE conduit_a = ? AND conduit_b = ?")
            .bind(key.low.0)
            .bind(key.high.0)
            .fetch_optional(db)
            .await?;
    Ok(status.map(StatusId))
}

pub(crate) async fn insert_virtual_node(
    tx: &mut Transaction<'_, Sqlite>,
    split: &SplitPoint,
    origin: NodeId,
    timestamp: &str,
) -> std::result::Result<NodeId, sqlx::Error> {
    let label = format!("V{}@{:.4}", split.conduit, split.fraction);
    let result = sqlx::query(
        r#"
        INSERT INTO nodes (label, x, y, is_virtual, host_conduit_id, position, origin_node_id, created_at, updated_at)
        VALUES (?, ?, ?, 1, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(label)
    .bind(split.location.x)
    .bind(split.location.y)
    .bind(split.conduit.0)
    .bind(split.fraction)
    .bind(origin.0)
    .bind(timestamp)
    .bind(timestamp)
    .execute(&mut **tx)
    .await?;

    Ok(NodeId(result.last_insert_rowid()))
}

pub(crate) async fn delete_tube_pairing(
    tx: &mut Transaction<'_, Sqlite>,
    key: PairKey,
    node: NodeId,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM tube_pairings WHERE tube_a = ? AND tube_b = ? AND node_id = ?")
        .bind(key.low.0)
        .bind(key.high.0)
        .bind(node.0)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub(crate) async fn update_tube_pairing(
    tx: &mut Transaction<'_, Sqlite>,
    record: &PairingRecord,
    node: NodeId,
    timestamp: &str,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query("UPDATE tube_pairings SET status_id = ?, updated_at = ? WHERE tube_a = ? AND tube_b = ? AND node_id = ?")
        .bind(record.status.0)
        .bind(timestamp)
        .bind(record.key.low.0)
        .bind(record.key.high.0)
        .bind(node.0)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub(crate) async fn insert_tube_pairing(
    tx: &mut Transaction<'_, Sqlite>,
    record: &PairingRecord,
    node: NodeId,
    timestamp: &str,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO tube_pairings (tube_a, tube_b, node_id, status_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.key.low.0)
    .bind(record.key.high.0)
    .bind(node.0)
    .bind(record.status.0)
    .bind(timestamp)
    .bind(timestamp)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Statuses of every tube pairing between two conduits, at any node
pub(crate) async fn conduit_pair_statuses(
    tx: &mut Transaction<'_, Sqlite>,
    key: ConduitPairKey,
) -> std::result::Result<Vec<StatusId>, sqlx::Error> {
    let statuses: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT p.status_id
        FROM tube_pairings p
        JOIN tubes ta ON ta.id = p.tube_a
        JOIN tubes tb ON tb.id = p.tube_b
        WHERE (ta.conduit_id = ? AND tb.conduit_id = ?)
           OR (ta.conduit_id = ? AND tb.conduit_id = ?)
        "#,
    )
    .bind(key.low.0)
    .bind(key.high.0)
    .bind(key.high.0)
    .bind(key.low.0)
    .fetch_all(&mut **tx)
    .await?;

    Ok(statuses.into_iter().map(StatusId).collect())
}

pub(crate) async fn delete_conduit_pairing(
    tx: &mut Transaction<'_, Sqlite>,
    key: ConduitPairKey,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM conduit_pairings WHERE conduit_a = ? AND conduit_b = ?")
        .bind(key.low.0)
        .bind(key.high.0)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Insert the aggregate, or update it when the status changed
pub(crate) async fn upsert_conduit_pairing(
    tx: &mut Transaction<'_, Sqlite>,
    key: ConduitPairKey,
    status: StatusId,
    timestamp: &str,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO conduit_pairings (conduit_a, conduit_b, status_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(conduit_a, conduit_b) DO UPDATE
            SET status_id = excluded.status_id, updated_at = excluded.updated_at
            WHERE conduit_pairings.status_id != excluded.status_id
        "#,
    )
    .bind(key.low.0)
    .bind(key.high.0)
    .bind(status.0)
    .bind(timestamp)
    .bind(timestamp)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
