//! End-to-end pairing sessions against a real database
//!
//! Covers the operator workflow from node selection to commit, the reload
//! of committed pairings, the conduit-level aggregate and virtual nodes.

mod common;

use common::{loaded_session, memory_pool};
use fnet_connector::db::pairings::conduit_pairing_status;
use fnet_connector::occupancy::OccupancyResolver;
use fnet_connector::types::{ConduitPairKey, PairKey};
use fnet_connector::{
    ConduitId, ConnectorSession, NodeId, SessionError, Side, StatusId, Store, SyncError, TubeId,
};
use std::collections::BTreeMap;
use tempfile::TempDir;

const ACTIVE: StatusId = StatusId(1);
const PLANNED: StatusId = StatusId(2);

fn conduit_key() -> ConduitPairKey {
    ConduitPairKey::new(ConduitId(10), ConduitId(20))
}

#[tokio::test]
async fn test_two_pairings_committed_as_planned() {
    let pool = memory_pool().await;
    let mut session = loaded_session(&pool).await;

    session.add_pairing(2, 3).unwrap();
    session.add_pairing(1, 1).unwrap();
    let report = session.commit().await.unwrap();

    assert_eq!(report.node, NodeId(1));
    assert_eq!(report.inserted, 2);
    assert!(report.virtual_nodes.is_empty());

    let loaded: BTreeMap<PairKey, StatusId> =
        session.loaded().iter().map(|r| (r.key, r.status)).collect();
    let expected: BTreeMap<PairKey, StatusId> = [
        (PairKey::new(TubeId(101), TubeId(201)), PLANNED),
        (PairKey::new(TubeId(102), TubeId(203)), PLANNED),
    ]
    .into_iter()
    .collect();
    assert_eq!(loaded, expected);

    assert_eq!(conduit_pairing_status(&pool, conduit_key()).await.unwrap(), Some(PLANNED));
}

#[tokio::test]
async fn test_second_commit_without_changes_is_empty() {
    let pool = memory_pool().await;
    let mut session = loaded_session(&pool).await;

    session.add_pairing(1, 1).unwrap();
    session.add_pairing(2, 2).unwrap();
    session.commit().await.unwrap();

    assert!(session.preview().is_empty());
    let second = session.commit().await.unwrap();
    assert_eq!((second.inserted, second.updated, second.deleted), (0, 0, 0));
}

#[tokio::test]
async fn test_status_change_is_an_update() {
    let pool = memory_pool().await;
    let mut session = loaded_session(&pool).await;

    let first = session.add_pairing(1, 1).unwrap();
    session.add_pairing(2, 2).unwrap();
    session.commit().await.unwrap();

    session.set_status(first, ACTIVE).unwrap();
    let plan = session.preview();
    assert_eq!(plan.to_update.len(), 1);
    assert!(plan.to_insert.is_empty() && plan.to_delete.is_empty());

    let report = session.commit().await.unwrap();
    assert_eq!(report.updated, 1);

    // Mixed statuses aggregate to the most restrictive one
    assert_eq!(conduit_pairing_status(&pool, conduit_key()).await.unwrap(), Some(ACTIVE));
}

#[tokio::test]
async fn test_removing_all_pairings_deletes_aggregate() {
    let pool = memory_pool().await;
    let mut session = loaded_session(&pool).await;

    session.add_pairing(1, 1).unwrap();
    session.commit().await.unwrap();
    assert!(conduit_pairing_status(&pool, conduit_key()).await.unwrap().is_some());

    session.remove_all();
    let report = session.commit().await.unwrap();

    assert_eq!(report.deleted, 1);
    assert_eq!(report.conduit_pairings.len(), 1);
    assert_eq!(report.conduit_pairings[0].status, None);
    assert_eq!(conduit_pairing_status(&pool, conduit_key()).await.unwrap(), None);
}

#[tokio::test]
async fn test_aggregate_includes_pairings_at_other_nodes() {
    let pool = memory_pool().await;
    sqlx::query("INSERT INTO tube_pairings (tube_a, tube_b, node_id, status_id) VALUES (104, 204, 2, 3)")
        .execute(&pool)
        .await
        .unwrap();

    let mut session = loaded_session(&pool).await;
    session.add_pairing(1, 1).unwrap();
    session.commit().await.unwrap();

    assert_eq!(conduit_pairing_status(&pool, conduit_key()).await.unwrap(), Some(PLANNED));

    // Reserved (3) at node 2 and planned (2) at node 1 aggregate to planned;
    // the pairing at node 2 does not block tube 4 at node 1
    let left = session.gallery(Side::Left);
    assert!(!left[3].occupied);
}

#[tokio::test]
async fn test_occupancy_is_scoped_to_the_node() {
    let pool = memory_pool().await;
    let mut session = loaded_session(&pool).await;
    session.add_pairing(3, 3).unwrap();
    session.commit().await.unwrap();

    let mut resolver = OccupancyResolver::new();
    let at_a = resolver.occupancy(&pool, ConduitId(10), NodeId(1)).await;
    let at_b = resolver.occupancy(&pool, ConduitId(10), NodeId(2)).await;

    assert!(at_a[&3].occupied);
    assert_eq!(at_a[&3].tube_id, Some(TubeId(103)));
    assert!(!at_b[&3].occupied);
    assert_eq!(at_b[&3].tube_id, Some(TubeId(103)));
}

#[tokio::test]
async fn test_committed_tubes_block_other_conduit_pairs() {
    let pool = memory_pool().await;
    let mut session = loaded_session(&pool).await;
    session.add_pairing(1, 1).unwrap();
    session.commit().await.unwrap();

    // Same node, left conduit now paired against conduit 30
    session.load_conduits(ConduitId(10), ConduitId(30)).await.unwrap();
    assert!(session.graph().is_empty());
    assert!(session.gallery(Side::Left)[0].occupied);
    assert!(matches!(session.add_pairing(1, 1), Err(SessionError::Pairing(_))));
    session.add_pairing(2, 1).unwrap();
}

#[tokio::test]
async fn test_split_points_become_virtual_nodes() {
    let pool = memory_pool().await;
    let mut session = loaded_session(&pool).await;

    session.add_pairing(1, 1).unwrap();
    session.fix_split(Side::Left, 0.25).unwrap();
    let report = session.commit().await.unwrap();

    assert_eq!(report.virtual_nodes.len(), 1);
    let (side, node) = report.virtual_nodes[0];
    assert_eq!(side, Side::Left);

    let (is_virtual, host, position, origin, x, y): (bool, i64, f64, i64, f64, f64) = sqlx::query_as(
        "SELECT is_virtual, host_conduit_id, position, origin_node_id, x, y FROM nodes WHERE id = ?",
    )
    .bind(node.0)
    .fetch_one(&pool)
    .await
    .unwrap();

    assert!(is_virtual);
    assert_eq!(host, 10);
    assert!((position - 0.25).abs() < 1e-9);
    assert_eq!(origin, 1);
    assert!((x - 2.5).abs() < 1e-9);
    assert_eq!(y, 0.0);

    // Split points are consumed by the commit
    assert!(session.split_point(Side::Left).is_none());
    assert!(session.commit().await.unwrap().virtual_nodes.is_empty());
}

#[tokio::test]
async fn test_remove_all_keeps_fixed_split_points() {
    let pool = memory_pool().await;
    let mut session = loaded_session(&pool).await;

    session.add_pairing(1, 1).unwrap();
    session.add_pairing(2, 2).unwrap();
    session.commit().await.unwrap();

    session.fix_split(Side::Right, 0.5).unwrap();
    session.remove_all();
    assert!(session.split_point(Side::Right).is_some());

    let report = session.commit().await.unwrap();
    assert_eq!((report.inserted, report.deleted), (0, 2));
    assert_eq!(report.virtual_nodes.len(), 1);
    assert_eq!(report.virtual_nodes[0].0, Side::Right);
    assert_eq!(conduit_pairing_status(&pool, conduit_key()).await.unwrap(), None);
}

#[tokio::test]
async fn test_commit_without_node_fails() {
    let pool = memory_pool().await;
    let mut session = ConnectorSession::open(Store::from_pool(pool.clone())).await.unwrap();

    let result = session.commit().await;
    assert!(matches!(result, Err(SessionError::Sync(SyncError::NoNodeSelected))));
}

#[tokio::test]
async fn test_session_on_database_file() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("fnet.db");

    // The file database starts empty apart from schema and catalogs
    let pool = fnet_common::db::init_database(&db_path).await.unwrap();
    sqlx::raw_sql(common::FIXTURE).execute(&pool).await.unwrap();
    pool.close().await;

    let store = Store::new(db_path.clone());
    assert!(!store.is_open());
    let mut session = ConnectorSession::open(store).await.unwrap();
    session.select_node(NodeId(1)).await.unwrap();
    session.load_conduits(ConduitId(20), ConduitId(10)).await.unwrap();
    session.auto_pair().unwrap();
    let report = session.commit().await.unwrap();
    assert_eq!(report.inserted, 4);
    session.close().await;

    let mut session = ConnectorSession::open(Store::new(db_path)).await.unwrap();
    session.select_node(NodeId(1)).await.unwrap();
    session.load_conduits(ConduitId(10), ConduitId(20)).await.unwrap();
    assert_eq!(session.graph().len(), 4);
    assert!(session.preview().is_empty());
    session.close().await;
}
