//! Error types for fnet-connector
//!
//! Pairing-graph errors are recovered locally and never corrupt the working
//! set. Sync errors always come with a full rollback. Session errors cover
//! rejected operator input on top of both.

use crate::pairing::{PairingId, TubeIdx};
use crate::types::{ConduitId, Side, StatusId};
use thiserror::Error;

/// Invariant violations inside the pairing graph
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PairingError {
    /// The tube already has an active pairing (or is occupied at this node)
    #[error("Tube {0} is already used")]
    TubeAlreadyUsed(TubeIdx),

    #[error("Unknown pairing: {0}")]
    UnknownPairing(PairingId),

    #[error("Unknown tube slot: {0}")]
    UnknownTube(TubeIdx),

    /// The tube exists in the conduit layout but has no database record
    #[error("Tube {0} has no tube record")]
    MissingTubeRecord(TubeIdx),

    /// Both tubes belong to the same conduit
    #[error("Tubes belong to the same conduit {0}")]
    SameConduit(ConduitId),
}

/// Failures of the reconciliation commit
#[derive(Error, Debug)]
pub enum SyncError {
    /// No context node; nothing was written
    #[error("No node selected")]
    NoNodeSelected,

    /// Storage failure; the transaction was rolled back
    #[error("Backend error while {context}: {source}")]
    Backend {
        context: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// A split point could not be written; no pairing rows were touched
    #[error("Virtual node for {side} conduit could not be created: {source}")]
    VirtualNodeFailed {
        side: Side,
        #[source]
        source: sqlx::Error,
    },
}

impl SyncError {
    pub(crate) fn backend(context: &'static str) -> impl FnOnce(sqlx::Error) -> SyncError {
        move |source| SyncError::Backend { context, source }
    }
}

/// Operator-level errors of a pairing session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No node selected")]
    NoNodeSelected,

    #[error("No conduit pair loaded")]
    NoConduitPair,

    #[error("No tube selected")]
    NoTubeSelected,

    /// Both tubes of a requested pairing are on the same side
    #[error("Tubes {0} and {1} are on the same side")]
    IncompatibleSide(TubeIdx, TubeIdx),

    #[error("No tube {number} on the {side} conduit")]
    UnknownTubeNumber { side: Side, number: u32 },

    #[error("Unknown connection status: {0}")]
    UnknownStatus(StatusId),

    #[error("Left and right conduit are identical: {0}")]
    SameConduit(ConduitId),

    #[error(transparent)]
    Pairing(#[from] PairingError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Common(#[from] fnet_common::Error),
}

/// Convenience Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
