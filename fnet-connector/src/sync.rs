//! Reconciliation of the working set against persisted state
//!
//! A commit diffs the in-memory pairings against the set loaded for the same
//! node, then writes within one transaction:
//! 1. virtual nodes for every fixed split point
//! 2. tube pairing deletes, updates, inserts (in that order)
//! 3. the conduit-level aggregate of every conduit pair touched by either set
//!
//! Any failure drops the transaction, so storage is left exactly as it was.

use crate::db::pairings;
use crate::error::SyncError;
use crate::geometry::Point;
use crate::types::{ConduitId, ConduitPairKey, NodeId, PairKey, Side, StatusId};
use chrono::{DateTime, Utc};
use fnet_common::time;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// One tube pairing as persisted (or to be persisted) at the context node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PairingRecord {
    pub key: PairKey,
    pub conduits: ConduitPairKey,
    pub status: StatusId,
}

/// Position fixed for a new junction on one session conduit
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SplitPoint {
    pub side: Side,
    pub conduit: ConduitId,
    pub fraction: f64,
    pub location: Point,
}

/// Net change between working and loaded set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    pub to_insert: Vec<PairingRecord>,
    pub to_update: Vec<PairingRecord>,
    pub to_delete: Vec<PairingRecord>,
    /// Conduit pairs referenced by either set, whose aggregate is recomputed
    pub conduit_pairs: BTreeSet<ConduitPairKey>,
}

impl SyncPlan {
    pub fn compute(working: &[PairingRecord], loaded: &[PairingRecord]) -> Self {
        let working_by_key: BTreeMap<PairKey, &PairingRecord> =
            working.iter().map(|r| (r.key, r)).collect();
        let loaded_by_key: BTreeMap<PairKey, &PairingRecord> =
            loaded.iter().map(|r| (r.key, r)).collect();

        let mut plan = SyncPlan::default();
        for (key, record) in &working_by_key {
            match loaded_by_key.get(key) {
                None => plan.to_insert.push(**record),
                Some(previous) if previous.status != record.status => plan.to_update.push(**record),
                Some(_) => {}
            }
        }
        for (key, record) in &loaded_by_key {
            if !working_by_key.contains_key(key) {
                plan.to_delete.push(**record);
            }
        }

        plan.conduit_pairs = working
            .iter()
            .chain(loaded.iter())
            .map(|r| r.conduits)
            .collect();

        plan
    }

    /// True when no tube pairing row would change
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }
}

/// Conduit-level status for a set of tube pairing statuses
///
/// The common status when all agree, otherwise the most restrictive
/// (numerically smallest). `None` when there are no tube pairings.
pub fn aggregate_status(statuses: &[StatusId]) -> Option<StatusId> {
    let first = *statuses.first()?;
    if statuses.iter().all(|s| *s == first) {
        Some(first)
    } else {
        statuses.iter().min().copied()
    }
}

/// Outcome for one conduit pair aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConduitPairingOutcome {
    pub conduits: ConduitPairKey,
    /// `None` when the aggregate row was deleted
    pub status: Option<StatusId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitReport {
    pub node: NodeId,
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub virtual_nodes: Vec<(Side, NodeId)>,
    pub conduit_pairings: Vec<ConduitPairingOutcome>,
    pub committed_at: DateTime<Utc>,
}

/// Inputs of one commit
#[derive(Debug, Clone, Copy)]
pub struct CommitRequest<'a> {
    pub node: Option<NodeId>,
    pub working: &'a [PairingRecord],
    pub loaded: &'a [PairingRecord],
    pub split_points: &'a [SplitPoint],
}

/// Persist the net change of `request` atomically
///
/// On success the caller replaces its loaded set with the working set.
pub async fn commit(db: &SqlitePool, request: CommitRequest<'_>) -> Result<CommitReport, SyncError> {
    let node = request.node.ok_or(SyncError::NoNodeSelected)?;
    let plan = SyncPlan::compute(request.working, request.loaded);

    let committed_at = time::now();
    let stamp = time::to_sqlite_timestamp(committed_at);

    debug!(
        node = %node,
        inserts = plan.to_insert.len(),
        updates = plan.to_update.len(),
        deletes = plan.to_delete.len(),
        splits = request.split_points.len(),
        "Committing pairing changes"
    );

    let mut tx = db.begin().await.map_err(SyncError::backend("beginning transaction"))?;

    let mut virtual_nodes = Vec::with_capacity(request.split_points.len());
    for split in request.split_points {
        let created = pairings::insert_virtual_node(&mut tx, split, node, &stamp)
            .await
            .map_err(|source| SyncError::VirtualNodeFailed { side: split.side, source })?;
        virtual_nodes.push((split.side, created));
    }

    for record in &plan.to_delete {
        pairings::delete_tube_pairing(&mut tx, record.key, node)
            .await
            .map_err(SyncError::backend("deleting tube pairing"))?;
    }
    for record in &plan.to_update {
        pairings::update_tube_pairing(&mut tx, record, node, &stamp)
            .await
            .map_err(SyncError::backend("updating tube pairing"))?;
    }
    for record in &plan.to_insert {
        pairings::insert_tube_pairing(&mut tx, record, node, &stamp)
            .await
            .map_err(SyncError::backend("inserting tube pairing"))?;
    }

    let mut conduit_pairings = Vec::with_capacity(plan.conduit_pairs.len());
    for key in &plan.conduit_pairs {
        let statuses = pairings::conduit_pair_statuses(&mut tx, *key)
            .await
            .map_err(SyncError::backend("reading conduit pair statuses"))?;

        let status = aggregate_status(&statuses);
        match status {
            Some(status) => pairings::upsert_conduit_pairing(&mut tx, *key, status, &stamp)
                .await
                .map_err(SyncError::backend("writing conduit pairing"))?,
            None => pairings::delete_conduit_pairing(&mut tx, *key)
                .await
                .map_err(SyncError::backend("deleting conduit pairing"))?,
        }
        conduit_pairings.push(ConduitPairingOutcome { conduits: *key, status });
    }

    tx.commit().await.map_err(SyncError::backend("committing transaction"))?;

    let report = CommitReport {
        node,
        inserted: plan.to_insert.len(),
        updated: plan.to_update.len(),
        deleted: plan.to_delete.len(),
        virtual_nodes,
        conduit_pairings,
        committed_at,
    };

    info!(
        node = %node,
        inserted = report.inserted,
        updated = report.updated,
        deleted = report.deleted,
        virtual_nodes = report.virtual_nodes.len(),
        "Pairing commit complete"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TubeId;

    fn record(a: i64, b: i64, status: i64) -> PairingRecord {
        PairingRecord {
            key: PairKey::new(TubeId(a), TubeId(b)),
            conduits: ConduitPairKey::new(ConduitId(1), ConduitId(2)),
            status: StatusId(status),
        }
    }

    #[test]
    fn test_plan_insert_update_delete() {
        let loaded = [record(1, 11, 2), record(2, 12, 2), record(3, 13, 2)];
        let working = [record(1, 11, 2), record(12, 2, 1), record(4, 14, 2)];

        let plan = SyncPlan::compute(&working, &loaded);
        assert_eq!(plan.to_insert, vec![record(4, 14, 2)]);
        assert_eq!(plan.to_update, vec![record(2, 12, 1)]);
        assert_eq!(plan.to_delete, vec![record(3, 13, 2)]);
        assert_eq!(plan.conduit_pairs.len(), 1);
    }

    #[test]
    fn test_plan_of_identical_sets_is_empty() {
        let set = [record(1, 11, 2), record(2, 12, 1)];
        let plan = SyncPlan::compute(&set, &set);
        assert!(plan.is_empty());
        // Aggregates are still recomputed for the touched pair
        assert_eq!(plan.conduit_pairs.len(), 1);
    }

    #[test]
    fn test_plan_touches_pairs_from_both_sets() {
        let mut other = record(5, 25, 2);
        other.conduits = ConduitPairKey::new(ConduitId(3), ConduitId(1));
        let plan = SyncPlan::compute(&[record(1, 11, 2)], &[other]);

        assert_eq!(plan.conduit_pairs.len(), 2);
        assert!(plan.conduit_pairs.contains(&ConduitPairKey::new(ConduitId(1), ConduitId(3))));
    }

    #[test]
    fn test_aggregate_status() {
        assert_eq!(aggregate_status(&[]), None);
        assert_eq!(aggregate_status(&[StatusId(2), StatusId(2)]), Some(StatusId(2)));
        assert_eq!(aggregate_status(&[StatusId(2), StatusId(1)]), Some(StatusId(1)));
        assert_eq!(
            aggregate_status(&[StatusId(3), StatusId(2), StatusId(3)]),
            Some(StatusId(2))
        );
    }
}
