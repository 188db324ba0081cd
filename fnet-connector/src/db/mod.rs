//! Database access layer
//!
//! The [`Store`] owns the SQLite connection for one session. The pool is
//! opened lazily on first use, reused by every read and by the commit
//! transaction, and closed on teardown.

pub mod conduits;
pub mod pairings;
pub mod settings;

use crate::geometry::BranchAttachment;
use crate::sync::PairingRecord;
use crate::types::{ConduitId, NodeId};
use fnet_common::db::init_database;
use fnet_common::{Error, Result};
use sqlx::SqlitePool;
use std::path::PathBuf;
use tokio::sync::OnceCell;
use tracing::info;

pub use conduits::ConduitDescriptor;
pub use settings::EngineSettings;

pub struct Store {
    db_path: Option<PathBuf>,
    pool: OnceCell<SqlitePool>,
}

impl Store {
    /// Store backed by a database file, opened on first use
    pub fn new(db_path: PathBuf) -> Self {
        Self {
            db_path: Some(db_path),
            pool: OnceCell::new(),
        }
    }

    /// Store around an already open pool
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            db_path: None,
            pool: OnceCell::new_with(Some(pool)),
        }
    }

    /// The shared connection pool, opening it if necessary
    pub async fn pool(&self) -> Result<&SqlitePool> {
        self.pool
            .get_or_try_init(|| async {
                let path = self
                    .db_path
                    .as_ref()
                    .ok_or_else(|| Error::Config("No database configured".to_string()))?;
                init_database(path).await
            })
            .await
    }

    pub fn is_open(&self) -> bool {
        self.pool.initialized()
    }

    pub async fn select_conduit(&self, conduit: ConduitId, context_node: NodeId) -> Result<ConduitDescriptor> {
        conduits::select_conduit(self.pool().await?, conduit, context_node).await
    }

    pub async fn branch_attachments(&self, conduit: ConduitId) -> Result<Vec<BranchAttachment>> {
        conduits::branch_attachments(self.pool().await?, conduit).await
    }

    /// Persisted pairings at `node` between `left` and `right`
    pub async fn load_pairings(&self, node: NodeId, left: ConduitId, right: ConduitId) -> Result<Vec<PairingRecord>> {
        pairings::load_pairings(self.pool().await?, node, left, right).await
    }

    /// Close the pool if it was ever opened
    pub async fn close(self) {
        if let Some(pool) = self.pool.into_inner() {
            pool.close().await;
            info!("Database connection closed");
        }
    }
}
