//! Package Model

use serde::{Deserialize, Serialize};
use shared::status::PackageStatus;
use sqlx::types::Json;
use validator::Validate;

/// One immutable entry in an entity's status ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: u8,
    /// Unix millis at append time
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub updated_by: String,
}

/// Package entity with embedded status ledger
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Package {
    pub id: i64,
    pub tracking_number: String,
    pub control_number: Option<String>,
    /// Partner-side id
    pub external_id: Option<String>,
    pub customer_id: Option<i64>,
    /// Set when a partner upsert referenced a customer we could not resolve
    pub customer_unresolved: bool,
    pub manifest_id: Option<i64>,
    #[sqlx(try_from = "i64")]
    pub status: PackageStatus,
    /// Append-only; current `status` always equals the last entry's status
    pub status_history: Json<Vec<StatusHistoryEntry>>,
    pub description: Option<String>,
    pub weight: f64,
    pub pieces: i64,
    pub shipper: Option<String>,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Package {
    /// Deletion is disallowed once the package reached a terminal state
    pub fn is_deletable(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Create package payload (warehouse intake)
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PackageCreate {
    #[validate(length(min = 1, max = 64))]
    pub tracking_number: String,
    #[validate(length(min = 1, max = 64))]
    pub control_number: Option<String>,
    pub external_id: Option<String>,
    pub customer_id: Option<i64>,
    /// Initial status ordinal, defaults to Registered
    pub status: Option<u8>,
    pub description: Option<String>,
    #[validate(range(min = 0.0))]
    pub weight: Option<f64>,
    #[validate(range(min = 1))]
    pub pieces: Option<i64>,
    pub shipper: Option<String>,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
}

/// Update package payload (all optional — absence leaves the field unchanged)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageUpdate {
    pub control_number: Option<String>,
    pub external_id: Option<String>,
    pub customer_id: Option<i64>,
    pub description: Option<String>,
    pub weight: Option<f64>,
    pub pieces: Option<i64>,
    pub shipper: Option<String>,
    pub origin: Option<String>,
    pub destination: Option<String>,
}
