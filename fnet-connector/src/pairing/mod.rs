//! In-memory pairing graph and auto-pairing
//!
//! Tubes of the current session live in an arena owned by the graph and are
//! referenced by [`TubeIdx`]; pairings never hold pointers back into the
//! session.

mod auto;
mod graph;

pub use auto::auto_pair;
pub use graph::{PairingGraph, PairingId, Provenance, TubeIdx, TubePairing, TubeSlot};
