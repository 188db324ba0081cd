//! Pairing session for one context node and one conduit pair
//!
//! The session owns everything the operator works on between selecting a
//! node and committing: the tube arena, the pairing graph, the loaded
//! baseline, pending split points and the interaction state. Catalogs and the
//! occupancy cache live here too and are warmed explicitly when a conduit
//! pair is loaded.

use crate::catalog::{ColorCatalog, StatusCatalog, TubeColor};
use crate::db::{conduits, ConduitDescriptor, EngineSettings, Store};
use crate::error::{Result, SessionError};
use crate::geometry::{Point, SplitGeometry, SplitMarker};
use crate::interaction::{Action, InteractionEvent, InteractionState};
use crate::occupancy::{Occupancy, OccupancyResolver};
use crate::pairing::{auto_pair, PairingGraph, PairingId, TubeIdx, TubeSlot};
use crate::sync::{self, CommitReport, CommitRequest, PairingRecord, SplitPoint, SyncPlan};
use crate::types::{ConduitId, NodeId, Side, StatusId, TubeId};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// One tube as the gallery of a side shows it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TubeView {
    pub index: TubeIdx,
    pub number: u32,
    pub tube_id: Option<TubeId>,
    pub color: TubeColor,
    pub color_name: String,
    /// Committed at this node by a pairing outside the working set
    pub occupied: bool,
    /// Referenced by a pairing of the working set
    pub used: bool,
    pub pairing: Option<PairingId>,
}

pub struct ConnectorSession {
    store: Store,
    settings: EngineSettings,
    statuses: StatusCatalog,
    colors: ColorCatalog,
    occupancy: OccupancyResolver,
    node: Option<NodeId>,
    conduits: Option<[ConduitDescriptor; 2]>,
    graph: PairingGraph,
    loaded: Vec<PairingRecord>,
    split_geometry: [Option<SplitGeometry>; 2],
    split_markers: [Option<SplitMarker>; 2],
    split_points: [Option<SplitPoint>; 2],
    interaction: InteractionState,
}

impl ConnectorSession {
    /// Open a session on `store`, loading engine settings and the status catalog
    pub async fn open(store: Store) -> Result<Self> {
        let db = store.pool().await?;
        let settings = EngineSettings::load(db).await;
        let statuses = StatusCatalog::load(db).await;

        if !statuses.contains(settings.default_status) {
            warn!(status = %settings.default_status, "Default status is not in the status catalog");
        }

        Ok(Self {
            graph: PairingGraph::new(settings.default_status),
            store,
            settings,
            statuses,
            colors: ColorCatalog::new(),
            occupancy: OccupancyResolver::new(),
            node: None,
            conduits: None,
            loaded: Vec::new(),
            split_geometry: [None, None],
            split_markers: [None, None],
            split_points: [None, None],
            interaction: InteractionState::Idle,
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn statuses(&self) -> &StatusCatalog {
        &self.statuses
    }

    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    pub fn conduit(&self, side: Side) -> Option<&ConduitDescriptor> {
        self.conduits.as_ref().map(|c| &c[side.index()])
    }

    pub fn graph(&self) -> &PairingGraph {
        &self.graph
    }

    /// Persisted baseline the next commit diffs against
    pub fn loaded(&self) -> &[PairingRecord] {
        &self.loaded
    }

    pub fn interaction(&self) -> InteractionState {
        self.interaction
    }

    pub fn split_marker(&self, side: Side) -> Option<&SplitMarker> {
        self.split_markers[side.index()].as_ref()
    }

    pub fn split_point(&self, side: Side) -> Option<&SplitPoint> {
        self.split_points[side.index()].as_ref()
    }

    /// Drop the working set, pending splits and the loaded conduit pair
    fn discard(&mut self) {
        if !self.graph.is_empty() || self.split_points.iter().any(Option::is_some) {
            debug!(pairings = self.graph.len(), "Discarding unsaved working set");
        }
        self.graph = PairingGraph::new(self.graph.default_status());
        self.loaded.clear();
        self.conduits = None;
        self.split_geometry = [None, None];
        self.split_markers = [None, None];
        self.split_points = [None, None];
        self.interaction = InteractionState::Idle;
    }

    /// Make `node` the context node
    ///
    /// Any unsaved work for the previous node is discarded.
    pub async fn select_node(&mut self, node: NodeId) -> Result<()> {
        let db = self.store.pool().await?;
        if !conduits::node_exists(db, node).await? {
            return Err(fnet_common::Error::NotFound(format!("node {}", node)).into());
        }

        self.discard();
        self.node = Some(node);
        self.occupancy.set_node(self.node);
        info!(node = %node, "Node selected");
        Ok(())
    }

    /// Select the node nearest to a map position, if one lies within `radius`
    pub async fn select_node_at(&mut self, point: Point, radius: f64) -> Result<Option<NodeId>> {
        let db = self.store.pool().await?;
        let Some(node) = conduits::node_at(db, point, radius).await? else {
            return Ok(None);
        };
        self.select_node(node).await?;
        Ok(Some(node))
    }

    /// Load a conduit pair at the context node and rebuild the working set
    ///
    /// Persisted pairings between the two conduits at this node become the
    /// loaded baseline and are restored into the graph. Tubes committed at
    /// this node to any other conduit stay blocked.
    pub async fn load_conduits(&mut self, left: ConduitId, right: ConduitId) -> Result<()> {
        let node = self.node.ok_or(SessionError::NoNodeSelected)?;
        if left == right {
            return Err(SessionError::SameConduit(left));
        }

        let descriptors = [
            self.store.select_conduit(left, node).await?,
            self.store.select_conduit(right, node).await?,
        ];
        let db = self.store.pool().await?;

        self.colors
            .warm(db, &[descriptors[0].subtype, descriptors[1].subtype])
            .await;

        let persisted = self.store.load_pairings(node, left, right).await?;
        let paired_here: HashSet<TubeId> = persisted
            .iter()
            .flat_map(|r| [r.key.low, r.key.high])
            .collect();

        let mut graph = PairingGraph::new(self.graph.default_status());
        let mut split_geometry = [None, None];

        for side in Side::BOTH {
            let descriptor = &descriptors[side.index()];
            let occupancy = self.occupancy.occupancy(db, descriptor.id, node).await;

            for number in 1..=descriptor.tube_count {
                let entry = occupancy.get(&number).copied().unwrap_or(Occupancy {
                    occupied: false,
                    tube_id: None,
                });
                let occupied_elsewhere =
                    entry.occupied && entry.tube_id.is_some_and(|id| !paired_here.contains(&id));

                graph.push_tube(TubeSlot {
                    conduit: descriptor.id,
                    side,
                    number,
                    tube_id: entry.tube_id,
                    color: self.colors.color_for(descriptor.subtype, number),
                    occupied_elsewhere,
                    used: false,
                });
            }

            let attachments = self.store.branch_attachments(descriptor.id).await?;
            split_geometry[side.index()] = Some(SplitGeometry::new(
                descriptor.path.clone(),
                &attachments,
                self.settings.branch_tolerance,
            ));
        }

        let slots: HashMap<TubeId, TubeIdx> = graph
            .tubes()
            .filter_map(|(idx, slot)| slot.tube_id.map(|id| (id, idx)))
            .collect();

        // Only restorable pairings form the baseline, so a commit never
        // deletes rows the session could not show
        let mut loaded = Vec::with_capacity(persisted.len());
        for record in persisted {
            let restored = match (slots.get(&record.key.low), slots.get(&record.key.high)) {
                (Some(a), Some(b)) => graph.restore_pairing(*a, *b, record.status).is_ok(),
                _ => false,
            };
            if restored {
                loaded.push(record);
            } else {
                warn!(tube_a = %record.key.low, tube_b = %record.key.high, "Persisted pairing could not be restored");
            }
        }

        debug!(
            node = %node,
            left = %left,
            right = %right,
            tubes = graph.tubes().count(),
            loaded = loaded.len(),
            "Conduit pair loaded"
        );

        self.conduits = Some(descriptors);
        self.graph = graph;
        self.loaded = loaded;
        self.split_geometry = split_geometry;
        self.split_markers = [None, None];
        self.split_points = [None, None];
        self.interaction = InteractionState::Idle;

        Ok(())
    }

    /// Tubes of one side, ordered by tube number
    pub fn gallery(&self, side: Side) -> Vec<TubeView> {
        let mut views: Vec<TubeView> = self
            .graph
            .tubes()
            .filter(|(_, slot)| slot.side == side)
            .map(|(index, slot)| TubeView {
                index,
                number: slot.number,
                tube_id: slot.tube_id,
                color: slot.color.clone(),
                color_name: self.colors.display_name(&slot.color),
                occupied: slot.occupied_elsewhere,
                used: slot.used,
                pairing: self.graph.pairing_of(index).map(|p| p.id),
            })
            .collect();
        views.sort_by_key(|v| v.number);
        views
    }

    fn require_conduits(&self) -> Result<()> {
        if self.node.is_none() {
            return Err(SessionError::NoNodeSelected);
        }
        if self.conduits.is_none() {
            return Err(SessionError::NoConduitPair);
        }
        Ok(())
    }

    fn tube_index(&self, side: Side, number: u32) -> Result<TubeIdx> {
        self.graph
            .find_tube(side, number)
            .ok_or(SessionError::UnknownTubeNumber { side, number })
    }

    fn require_status(&self, status: StatusId) -> Result<()> {
        if self.statuses.contains(status) {
            Ok(())
        } else {
            Err(SessionError::UnknownStatus(status))
        }
    }

    /// Pair left tube `left` with right tube `right` by tube number
    pub fn add_pairing(&mut self, left: u32, right: u32) -> Result<PairingId> {
        self.require_conduits()?;
        let a = self.tube_index(Side::Left, left)?;
        let b = self.tube_index(Side::Right, right)?;
        self.pair_tubes(a, b)
    }

    /// Pair two arena slots, which must lie on opposite sides
    pub fn pair_tubes(&mut self, a: TubeIdx, b: TubeIdx) -> Result<PairingId> {
        self.require_conduits()?;
        let side_a = self.graph.tube(a).map(|s| s.side);
        let side_b = self.graph.tube(b).map(|s| s.side);
        if side_a.is_some() && side_a == side_b {
            return Err(SessionError::IncompatibleSide(a, b));
        }
        Ok(self.graph.add_pairing(a, b)?)
    }

    /// Pair `tube` with the tube selected by an earlier click
    pub fn pair_with_selection(&mut self, tube: TubeIdx) -> Result<PairingId> {
        let InteractionState::AwaitingSecondTube(first) = self.interaction else {
            return Err(SessionError::NoTubeSelected);
        };
        let id = self.pair_tubes(first, tube)?;
        self.interaction = InteractionState::Idle;
        Ok(id)
    }

    /// Sequentially pair all free tubes of both sides
    pub fn auto_pair(&mut self) -> Result<Vec<PairingId>> {
        self.require_conduits()?;
        let pairs = auto_pair(
            &self.graph.free_numbers(Side::Left),
            &self.graph.free_numbers(Side::Right),
        );

        let mut created = Vec::with_capacity(pairs.len());
        for (left, right) in pairs {
            created.push(self.add_pairing(left, right)?);
        }
        debug!(count = created.len(), "Auto-pairing applied");
        Ok(created)
    }

    pub fn set_status(&mut self, id: PairingId, status: StatusId) -> Result<()> {
        self.require_status(status)?;
        Ok(self.graph.set_status(id, status)?)
    }

    pub fn apply_status_to_all(&mut self, status: StatusId) -> Result<()> {
        self.require_status(status)?;
        self.graph.apply_status_to_all(status);
        Ok(())
    }

    /// Status given to pairings created from now on
    pub fn set_default_status(&mut self, status: StatusId) -> Result<()> {
        self.require_status(status)?;
        self.graph.set_default_status(status);
        Ok(())
    }

    pub fn remove_pairing(&mut self, id: PairingId) -> Result<()> {
        self.graph.remove_pairing(id)?;
        Ok(())
    }

    /// Drop every pairing at the node
    ///
    /// Fixed split points stay; `clear_split` cancels them.
    pub fn remove_all(&mut self) {
        self.graph.remove_all();
    }

    /// Fix the split point of `side` at a fraction of its conduit path
    ///
    /// The fraction is snapped out of forbidden intervals first.
    pub fn fix_split(&mut self, side: Side, fraction: f64) -> Result<SplitPoint> {
        self.require_conduits()?;
        let geometry = self.split_geometry[side.index()]
            .as_ref()
            .ok_or(SessionError::NoConduitPair)?;
        let marker = geometry.resolve(fraction);
        Ok(self.store_split(side, marker))
    }

    pub fn clear_split(&mut self, side: Side) {
        self.split_markers[side.index()] = None;
        self.split_points[side.index()] = None;
    }

    fn store_split(&mut self, side: Side, marker: SplitMarker) -> SplitPoint {
        let conduit = self.conduit(side).map(|c| c.id).unwrap_or(ConduitId(0));
        let split = SplitPoint {
            side,
            conduit,
            fraction: marker.fraction,
            location: marker.point,
        };
        if marker.snapped {
            debug!(side = %side, fraction = marker.fraction, "Split point snapped out of branch zone");
        }
        self.split_markers[side.index()] = Some(marker);
        self.split_points[side.index()] = Some(split);
        split
    }

    /// Feed one UI event through the interaction state machine
    ///
    /// Returns the action that was carried out. A rejected pairing leaves the
    /// working set unchanged and the state machine idle.
    pub fn handle(&mut self, event: InteractionEvent) -> Result<Action> {
        if let InteractionEvent::StartSplitPick(_) = event {
            self.require_conduits()?;
        }

        let graph = &self.graph;
        let (state, action) = self
            .interaction
            .next(event, |idx| graph.tube(idx).map(|slot| slot.side));
        self.interaction = state;

        match action {
            Action::None | Action::SelectTube(_) | Action::ClearSelection => {}
            Action::PairTubes(a, b) => {
                self.pair_tubes(a, b)?;
            }
            Action::TrackSplit(side, pointer) => {
                let marker = self.split_geometry[side.index()]
                    .as_ref()
                    .map(|g| g.track(pointer));
                self.split_markers[side.index()] = marker;
            }
            Action::FixSplit(side, pointer) => {
                if let Some(marker) = self.split_geometry[side.index()]
                    .as_ref()
                    .map(|g| g.track(pointer))
                {
                    self.store_split(side, marker);
                }
            }
            Action::CancelSplit(side) => {
                // Only the live marker goes; a previously fixed point stays
                self.split_markers[side.index()] = self.split_points[side.index()].map(|p| SplitMarker {
                    fraction: p.fraction,
                    point: p.location,
                    snapped: false,
                });
            }
        }

        Ok(action)
    }

    /// Changes the next commit would write
    pub fn preview(&self) -> SyncPlan {
        SyncPlan::compute(&self.graph.records(), &self.loaded)
    }

    /// Persist the working set and pending split points atomically
    ///
    /// On success the working set becomes the new baseline. On failure
    /// nothing changes, in storage or in the session.
    pub async fn commit(&mut self) -> Result<CommitReport> {
        let db = self.store.pool().await?;
        let working = self.graph.records();
        let split_points: Vec<SplitPoint> = self.split_points.iter().flatten().copied().collect();

        let report = sync::commit(
            db,
            CommitRequest {
                node: self.node,
                working: &working,
                loaded: &self.loaded,
                split_points: &split_points,
            },
        )
        .await?;

        self.loaded = working;
        self.graph.mark_committed();
        self.split_markers = [None, None];
        self.split_points = [None, None];
        self.occupancy.invalidate();

        Ok(report)
    }

    /// Discard unsaved work and close the storage connection
    pub async fn close(mut self) {
        self.discard();
        self.store.close().await;
    }
}
