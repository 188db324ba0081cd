//! Tube occupancy per node
//!
//! A tube is occupied at a node when at least one persisted tube pairing
//! scoped to that node references the tube's record on either side.
//! Pairings at other nodes do not count: tubes are consumed per node, so the
//! same tube can be spliced at distinct junctions along its length but never
//! twice at one location.

use crate::types::{ConduitId, NodeId, TubeId};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Occupancy {
    pub occupied: bool,
    pub tube_id: Option<TubeId>,
}

/// Occupancy of every tube number of a conduit
pub type OccupancyMap = BTreeMap<u32, Occupancy>;

/// Cached occupancy lookups keyed by (conduit, node)
///
/// The cache is dropped whenever the selected node changes and after every
/// commit, since both change what is persisted at the node.
#[derive(Debug, Default)]
pub struct OccupancyResolver {
    cache: HashMap<(ConduitId, NodeId), OccupancyMap>,
    node: Option<NodeId>,
}

impl OccupancyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the selected node, invalidating the cache if it changed
    pub fn set_node(&mut self, node: Option<NodeId>) {
        if self.node != node {
            self.invalidate();
            self.node = node;
        }
    }

    pub fn invalidate(&mut self) {
        if !self.cache.is_empty() {
            debug!(entries = self.cache.len(), "Occupancy cache invalidated");
        }
        self.cache.clear();
    }

    pub fn is_cached(&self, conduit: ConduitId, node: NodeId) -> bool {
        self.cache.contains_key(&(conduit, node))
    }

    /// Occupancy per tube number for `conduit` at `node`
    ///
    /// Tube numbers `1..=tube_count` are always present; numbers without a
    /// tube record report `tube_id: None`. A failed query yields an empty map
    /// which is not cached.
    pub async fn occupancy(
        &mut self,
        db: &SqlitePool,
        conduit: ConduitId,
        node: NodeId,
    ) -> OccupancyMap {
        if let Some(cached) = self.cache.get(&(conduit, node)) {
            return cached.clone();
        }

        match query_occupancy(db, conduit, node).await {
            Ok(map) => {
                self.cache.insert((conduit, node), map.clone());
                map
            }
            Err(e) => {
                warn!(conduit = %conduit, node = %node, "Occupancy query failed: {}", e);
                OccupancyMap::new()
            }
        }
    }
}

async fn query_occupancy(
    db: &SqlitePool,
    conduit: ConduitId,
    node: NodeId,
) -> Result<OccupancyMap, sqlx::Error> {
    let tube_count: Option<i64> = sqlx::query_scalar("SELECT tube_count FROM conduits WHERE id = ?")
        .bind(conduit.0)
        .fetch_optional(db)
        .await?;

    let mut map = OccupancyMap::new();
    for number in 1..=u32::try_from(tube_count.unwrap_or(0)).unwrap_or(0) {
        map.insert(number, Occupancy { occupied: false, tube_id: None });
    }

    let rows = sqlx::query(
        r#"
        SELECT t.id, t.tube_number,
               EXISTS(
                   SELECT 1 FROM tube_pairings p
                   WHERE p.node_id = ? AND (p.tube_a = t.id OR p.tube_b = t.id)
               ) AS occupied
        FROM tubes t
        WHERE t.conduit_id = ?
        ORDER BY t.tube_number
        "#,
    )
    .bind(node.0)
    .bind(conduit.0)
    .fetch_all(db)
    .await?;

    for row in rows {
        let number: i64 = row.get("tube_number");
        let Ok(number) = u32::try_from(number) else {
            continue;
        };
        map.insert(
            number,
            Occupancy {
                occupied: row.get("occupied"),
                tube_id: Some(TubeId(row.get("id"))),
            },
        );
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        fnet_common::db::create_schema(&pool).await.unwrap();

        // Conduit 1 has 4 tube positions but only 3 records
        sqlx::raw_sql(
            r#"
            INSERT INTO conduit_subtypes (id, name) VALUES (1, '4x');
            INSERT INTO conduits (id, subtype_id, tube_count) VALUES (1, 1, 4), (2, 1, 4);
            INSERT INTO tubes (id, conduit_id, tube_number) VALUES
                (11, 1, 1), (12, 1, 2), (13, 1, 3),
                (21, 2, 1), (22, 2, 2);
            INSERT INTO nodes (id, label) VALUES (100, 'A'), (200, 'B');
            INSERT INTO tube_pairings (tube_a, tube_b, node_id, status_id) VALUES (12, 21, 100, 2);
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        pool
    }

    #[tokio::test]
    async fn test_occupancy_at_node() {
        let db = setup_test_db().await;
        let mut resolver = OccupancyResolver::new();

        let map = resolver.occupancy(&db, ConduitId(1), NodeId(100)).await;
        assert_eq!(map.len(), 4);
        assert_eq!(map[&2], Occupancy { occupied: true, tube_id: Some(TubeId(12)) });
        assert_eq!(map[&1], Occupancy { occupied: false, tube_id: Some(TubeId(11)) });
        assert_eq!(map[&4], Occupancy { occupied: false, tube_id: None });

        // Occupied on the b side of the pairing as well
        let other = resolver.occupancy(&db, ConduitId(2), NodeId(100)).await;
        assert!(other[&1].occupied);
    }

    #[tokio::test]
    async fn test_occupancy_is_scoped_per_node() {
        let db = setup_test_db().await;
        let mut resolver = OccupancyResolver::new();

        let map = resolver.occupancy(&db, ConduitId(1), NodeId(200)).await;
        assert!(!map[&2].occupied);
    }

    #[tokio::test]
    async fn test_cache_and_invalidation_on_node_change() {
        let db = setup_test_db().await;
        let mut resolver = OccupancyResolver::new();
        resolver.set_node(Some(NodeId(100)));

        resolver.occupancy(&db, ConduitId(1), NodeId(100)).await;
        assert!(resolver.is_cached(ConduitId(1), NodeId(100)));

        // Same node keeps the cache
        resolver.set_node(Some(NodeId(100)));
        assert!(resolver.is_cached(ConduitId(1), NodeId(100)));

        resolver.set_node(Some(NodeId(200)));
        assert!(!resolver.is_cached(ConduitId(1), NodeId(100)));
    }

    #[tokio::test]
    async fn test_failed_query_yields_empty_map() {
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let mut resolver = OccupancyResolver::new();

        let map = resolver.occupancy(&db, ConduitId(1), NodeId(100)).await;
        assert!(map.is_empty());
        assert!(!resolver.is_cached(ConduitId(1), NodeId(100)));
    }
}
