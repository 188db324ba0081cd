//! Database models

/// Seed row for the `connection_statuses` catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSeed {
    pub id: i64,
    pub name: &'static str,
    pub color: &'static str,
}

/// Connection statuses written on first run
///
/// Lower ids are more restrictive. The connector falls back to the same set
/// when the catalog table cannot be read.
pub const DEFAULT_CONNECTION_STATUSES: [StatusSeed; 3] = [
    StatusSeed { id: 1, name: "active", color: "#2E7D32" },
    StatusSeed { id: 2, name: "planned", color: "#F9A825" },
    StatusSeed { id: 3, name: "reserved", color: "#1565C0" },
];

/// Status id assigned to new pairings unless configured otherwise
pub const DEFAULT_STATUS_ID: i64 = 2;

/// Distance around a branch attachment where no split may be placed
pub const DEFAULT_BRANCH_TOLERANCE: f64 = 0.10;
