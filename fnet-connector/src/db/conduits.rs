//! Conduit, node and branch-attachment queries
//!
//! Read side of the node/conduit selection and branch lookup collaborators.

use crate::geometry::{AttachmentLocation, BranchAttachment, ConduitPath, Point};
use crate::types::{ConduitId, NodeId, SubtypeId};
use fnet_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

/// Conduit as seen by a pairing session
#[derive(Debug, Clone, PartialEq)]
pub struct ConduitDescriptor {
    pub id: ConduitId,
    pub subtype: SubtypeId,
    pub tube_count: u32,
    pub path: ConduitPath,
}

/// Check that a node row exists
pub async fn node_exists(db: &SqlitePool, node: NodeId) -> Result<bool> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM nodes WHERE id = ?)")
        .bind(node.0)
        .fetch_one(db)
        .await?;
    Ok(exists)
}

/// Nearest node within `radius` map units of `point`
///
/// Nodes without coordinates are never picked. Ties go to the lower id.
pub async fn node_at(db: &SqlitePool, point: Point, radius: f64) -> Result<Option<NodeId>> {
    let id: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT id FROM nodes
        WHERE x IS NOT NULL AND y IS NOT NULL
          AND (x - ?) * (x - ?) + (y - ?) * (y - ?) <= ?
        ORDER BY (x - ?) * (x - ?) + (y - ?) * (y - ?), id
        LIMIT 1
        "#,
    )
    .bind(point.x)
    .bind(point.x)
    .bind(point.y)
    .bind(point.y)
    .bind(radius * radius)
    .bind(point.x)
    .bind(point.x)
    .bind(point.y)
    .bind(point.y)
    .fetch_optional(db)
    .await?;

    Ok(id.map(NodeId))
}

/// Load a conduit for pairing at `context_node`
///
/// Fails with `NotFound` if either the conduit or the node is missing. An
/// unparseable path is tolerated as an empty (zero-length) path.
pub async fn select_conduit(
    db: &SqlitePool,
    conduit_id: ConduitId,
    context_node: NodeId,
) -> Result<ConduitDescriptor> {
    if !node_exists(db, context_node).await? {
        return Err(Error::NotFound(format!("node {}", context_node)));
    }

    let row = sqlx::query("SELECT id, subtype_id, tube_count, path FROM conduits WHERE id = ?")
        .bind(conduit_id.0)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| Error::NotFound(format!("conduit {}", conduit_id)))?;

    let tube_count: i64 = row.get("tube_count");
    let path_json: String = row.get("path");
    let path = ConduitPath::from_json(&path_json).unwrap_or_else(|e| {
        warn!(conduit = %conduit_id, "Unreadable conduit path, treating as empty: {}", e);
        ConduitPath::default()
    });

    debug!(conduit = %conduit_id, node = %context_node, tube_count, "Conduit selected");

    Ok(ConduitDescriptor {
        id: ConduitId(row.get("id")),
        subtype: SubtypeId(row.get("subtype_id")),
        tube_count: u32::try_from(tube_count).unwrap_or(0),
        path,
    })
}

/// Branch attachments recorded against a conduit
///
/// A stored fraction wins over the stored point.
pub async fn branch_attachments(db: &SqlitePool, conduit_id: ConduitId) -> Result<Vec<BranchAttachment>> {
    let rows = sqlx::query("SELECT id, x, y, fraction FROM branch_attachments WHERE conduit_id = ? ORDER BY id")
        .bind(conduit_id.0)
        .fetch_all(db)
        .await?;

    let mut attachments = Vec::with_capacity(rows.len());
    for row in rows {
        let id: i64 = row.get("id");
        let fraction: Option<f64> = row.get("fraction");
        let x: Option<f64> = row.get("x");
        let y: Option<f64> = row.get("y");

        let location = match (fraction, x, y) {
            (Some(f), _, _) => AttachmentLocation::Fraction(f),
            (None, Some(x), Some(y)) => AttachmentLocation::Point(Point::new(x, y)),
            _ => {
                warn!(conduit = %conduit_id, attachment = id, "Branch attachment without position skipped");
                continue;
            }
        };
        attachments.push(BranchAttachment { id, location });
    }

    Ok(attachments)
}
