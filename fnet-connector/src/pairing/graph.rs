//! Working set of tube-to-tube connections for one node and conduit pair

use crate::catalog::TubeColor;
use crate::error::PairingError;
use crate::sync::PairingRecord;
use crate::types::{ConduitId, ConduitPairKey, PairKey, Side, StatusId, TubeId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Index of a tube slot in the session arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TubeIdx(pub usize);

impl fmt::Display for TubeIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PairingId(pub u64);

impl fmt::Display for PairingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One tube of a session conduit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TubeSlot {
    pub conduit: ConduitId,
    pub side: Side,
    pub number: u32,
    pub tube_id: Option<TubeId>,
    pub color: TubeColor,
    /// Persisted pairing at this node that is not part of the working set
    pub occupied_elsewhere: bool,
    /// Referenced by a pairing of the working set
    pub used: bool,
}

impl TubeSlot {
    pub fn is_free(&self) -> bool {
        !self.used && !self.occupied_elsewhere && self.tube_id.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Provenance {
    New,
    /// Loaded from storage, with the status it had at load time
    Existing { loaded_status: StatusId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TubePairing {
    pub id: PairingId,
    pub a: TubeIdx,
    pub b: TubeIdx,
    pub key: PairKey,
    pub conduits: ConduitPairKey,
    pub status: StatusId,
    pub provenance: Provenance,
}

impl TubePairing {
    /// Status differs from the value it was loaded with
    pub fn is_modified(&self) -> bool {
        match self.provenance {
            Provenance::New => true,
            Provenance::Existing { loaded_status } => loaded_status != self.status,
        }
    }
}

/// Tube arena plus the active pairings between its slots
///
/// Invariant: every slot is referenced by at most one pairing, and a slot's
/// `used` flag is set exactly when such a pairing exists.
#[derive(Debug, Clone)]
pub struct PairingGraph {
    tubes: Vec<TubeSlot>,
    pairings: BTreeMap<PairingId, TubePairing>,
    next_id: u64,
    default_status: StatusId,
}

impl PairingGraph {
    pub fn new(default_status: StatusId) -> Self {
        Self {
            tubes: Vec::new(),
            pairings: BTreeMap::new(),
            next_id: 1,
            default_status,
        }
    }

    pub fn default_status(&self) -> StatusId {
        self.default_status
    }

    pub fn set_default_status(&mut self, status: StatusId) {
        self.default_status = status;
    }

    /// Add a tube to the arena
    pub fn push_tube(&mut self, mut slot: TubeSlot) -> TubeIdx {
        slot.used = false;
        self.tubes.push(slot);
        TubeIdx(self.tubes.len() - 1)
    }

    pub fn tube(&self, idx: TubeIdx) -> Option<&TubeSlot> {
        self.tubes.get(idx.0)
    }

    pub fn tubes(&self) -> impl Iterator<Item = (TubeIdx, &TubeSlot)> {
        self.tubes.iter().enumerate().map(|(i, slot)| (TubeIdx(i), slot))
    }

    /// Slot of tube `number` on `side`
    pub fn find_tube(&self, side: Side, number: u32) -> Option<TubeIdx> {
        self.tubes
            .iter()
            .position(|slot| slot.side == side && slot.number == number)
            .map(TubeIdx)
    }

    /// Tube numbers on `side` that can still be paired, ascending
    pub fn free_numbers(&self, side: Side) -> Vec<u32> {
        let mut numbers: Vec<u32> = self
            .tubes
            .iter()
            .filter(|slot| slot.side == side && slot.is_free())
            .map(|slot| slot.number)
            .collect();
        numbers.sort_unstable();
        numbers
    }

    pub fn pairing(&self, id: PairingId) -> Option<&TubePairing> {
        self.pairings.get(&id)
    }

    pub fn pairings(&self) -> impl Iterator<Item = &TubePairing> {
        self.pairings.values()
    }

    /// Pairing that references `idx`, if any
    pub fn pairing_of(&self, idx: TubeIdx) -> Option<&TubePairing> {
        self.pairings.values().find(|p| p.a == idx || p.b == idx)
    }

    pub fn len(&self) -> usize {
        self.pairings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairings.is_empty()
    }

    /// Connect two tubes with the current default status
    pub fn add_pairing(&mut self, a: TubeIdx, b: TubeIdx) -> Result<PairingId, PairingError> {
        let status = self.default_status;
        self.insert(a, b, status, Provenance::New)
    }

    /// Re-create a pairing loaded from storage
    pub fn restore_pairing(
        &mut self,
        a: TubeIdx,
        b: TubeIdx,
        status: StatusId,
    ) -> Result<PairingId, PairingError> {
        self.insert(a, b, status, Provenance::Existing { loaded_status: status })
    }

    fn insert(
        &mut self,
        a: TubeIdx,
        b: TubeIdx,
        status: StatusId,
        provenance: Provenance,
    ) -> Result<PairingId, PairingError> {
        let slot_a = self.tubes.get(a.0).ok_or(PairingError::UnknownTube(a))?;
        let slot_b = self.tubes.get(b.0).ok_or(PairingError::UnknownTube(b))?;

        if slot_a.conduit == slot_b.conduit {
            return Err(PairingError::SameConduit(slot_a.conduit));
        }
        for (idx, slot) in [(a, slot_a), (b, slot_b)] {
            if slot.used || slot.occupied_elsewhere {
                return Err(PairingError::TubeAlreadyUsed(idx));
            }
        }
        let tube_a = slot_a.tube_id.ok_or(PairingError::MissingTubeRecord(a))?;
        let tube_b = slot_b.tube_id.ok_or(PairingError::MissingTubeRecord(b))?;

        let id = PairingId(self.next_id);
        self.next_id += 1;

        let pairing = TubePairing {
            id,
            a,
            b,
            key: PairKey::new(tube_a, tube_b),
            conduits: ConduitPairKey::new(slot_a.conduit, slot_b.conduit),
            status,
            provenance,
        };

        self.tubes[a.0].used = true;
        self.tubes[b.0].used = true;
        debug!(pairing = %id, tube_a = %tube_a, tube_b = %tube_b, status = %status, "Pairing added");
        self.pairings.insert(id, pairing);

        Ok(id)
    }

    pub fn set_status(&mut self, id: PairingId, status: StatusId) -> Result<(), PairingError> {
        let pairing = self
            .pairings
            .get_mut(&id)
            .ok_or(PairingError::UnknownPairing(id))?;
        pairing.status = status;
        Ok(())
    }

    /// Set the status of every pairing in the working set
    pub fn apply_status_to_all(&mut self, status: StatusId) {
        for pairing in self.pairings.values_mut() {
            pairing.status = status;
        }
    }

    /// Remove one pairing and free both of its tubes
    pub fn remove_pairing(&mut self, id: PairingId) -> Result<TubePairing, PairingError> {
        let pairing = self
            .pairings
            .remove(&id)
            .ok_or(PairingError::UnknownPairing(id))?;
        self.tubes[pairing.a.0].used = false;
        self.tubes[pairing.b.0].used = false;
        Ok(pairing)
    }

    /// Clear the working set and every used flag
    ///
    /// Tubes occupied by pairings outside the working set stay blocked.
    pub fn remove_all(&mut self) {
        self.pairings.clear();
        for slot in &mut self.tubes {
            slot.used = false;
        }
    }

    /// Treat every pairing as persisted with its current status
    pub fn mark_committed(&mut self) {
        for pairing in self.pairings.values_mut() {
            pairing.provenance = Provenance::Existing {
                loaded_status: pairing.status,
            };
        }
    }

    /// Working set in the form the reconciliation engine diffs
    pub fn records(&self) -> Vec<PairingRecord> {
        self.pairings
            .values()
            .map(|p| PairingRecord {
                key: p.key,
                conduits: p.conduits,
                status: p.status,
            })
            .collect()
    }
}
