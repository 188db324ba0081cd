//! # FNET Conduit Connector
//!
//! Engine for connecting the tubes of two conduits at a network node:
//! - Occupancy of tubes per node
//! - Tube color and connection status catalogs
//! - Split-point placement along a conduit path
//! - The in-memory pairing graph and sequential auto-pairing
//! - Atomic reconciliation of the working set with the database
//!
//! A [`ConnectorSession`] ties these together for one operator session.

pub mod catalog;
pub mod db;
pub mod error;
pub mod geometry;
pub mod interaction;
pub mod occupancy;
pub mod pairing;
pub mod session;
pub mod sync;
pub mod types;

pub use db::Store;
pub use error::{PairingError, Result, SessionError, SyncError};
pub use session::{ConnectorSession, TubeView};
pub use sync::{CommitReport, PairingRecord, SyncPlan};
pub use types::{ConduitId, NodeId, Side, StatusId, SubtypeId, TubeId};
