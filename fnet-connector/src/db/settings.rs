//! Engine parameters stored in the settings table

use crate::types::StatusId;
use fnet_common::db::settings::get_setting;
use fnet_common::db::{DEFAULT_BRANCH_TOLERANCE, DEFAULT_STATUS_ID};
use sqlx::SqlitePool;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    /// Status given to newly created pairings
    pub default_status: StatusId,
    /// Absolute distance around branch attachments where no split may go
    pub branch_tolerance: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_status: StatusId(DEFAULT_STATUS_ID),
            branch_tolerance: DEFAULT_BRANCH_TOLERANCE,
        }
    }
}

impl EngineSettings {
    /// Load settings; unreadable or invalid values fall back to defaults
    pub async fn load(db: &SqlitePool) -> Self {
        let defaults = Self::default();

        let default_status = match get_setting::<i64>(db, "default_status_id").await {
            Ok(Some(id)) => StatusId(id),
            Ok(None) => defaults.default_status,
            Err(e) => {
                warn!("Invalid default_status_id, using {}: {}", defaults.default_status, e);
                defaults.default_status
            }
        };

        let branch_tolerance = match get_setting::<f64>(db, "branch_tolerance").await {
            Ok(Some(t)) if t.is_finite() && t >= 0.0 => t,
            Ok(None) => defaults.branch_tolerance,
            Ok(Some(t)) => {
                warn!("branch_tolerance {} out of range, using {}", t, defaults.branch_tolerance);
                defaults.branch_tolerance
            }
            Err(e) => {
                warn!("Invalid branch_tolerance, using {}: {}", defaults.branch_tolerance, e);
                defaults.branch_tolerance
            }
        };

        Self {
            default_status,
            branch_tolerance,
        }
    }
}
