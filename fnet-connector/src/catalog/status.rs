//! Connection status catalog
//!
//! Lower ids are more restrictive; the conduit-level aggregate picks the
//! minimum when tube statuses disagree.

use crate::types::StatusId;
use fnet_common::db::DEFAULT_CONNECTION_STATUSES;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub id: StatusId,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone)]
pub struct StatusCatalog {
    statuses: Vec<ConnectionStatus>,
    from_fallback: bool,
}

impl StatusCatalog {
    /// Built-in status set used when the catalog table is unreachable
    pub fn fallback() -> Self {
        let statuses = DEFAULT_CONNECTION_STATUSES
            .iter()
            .map(|seed| ConnectionStatus {
                id: StatusId(seed.id),
                name: seed.name.to_string(),
                color: seed.color.to_string(),
            })
            .collect();

        Self {
            statuses,
            from_fallback: true,
        }
    }

    /// Load the catalog; never fails
    ///
    /// A read error or an empty table yields [`StatusCatalog::fallback`].
    pub async fn load(db: &SqlitePool) -> Self {
        let rows: Result<Vec<(i64, String, String)>, sqlx::Error> =
            sqlx::query_as("SELECT id, name, color FROM connection_statuses ORDER BY id")
                .fetch_all(db)
                .await;

        match rows {
            Ok(rows) if !rows.is_empty() => {
                debug!(count = rows.len(), "Connection statuses loaded");
                Self {
                    statuses: rows
                        .into_iter()
                        .map(|(id, name, color)| ConnectionStatus {
                            id: StatusId(id),
                            name,
                            color,
                        })
                        .collect(),
                    from_fallback: false,
                }
            }
            Ok(_) => {
                warn!("Connection status catalog is empty, using built-in statuses");
                Self::fallback()
            }
            Err(e) => {
                warn!("Connection status catalog unavailable, using built-in statuses: {}", e);
                Self::fallback()
            }
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.from_fallback
    }

    pub fn get(&self, id: StatusId) -> Option<&ConnectionStatus> {
        self.statuses.iter().find(|s| s.id == id)
    }

    pub fn contains(&self, id: StatusId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConnectionStatus> {
        self.statuses.iter()
    }
}
