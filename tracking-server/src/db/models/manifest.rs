//! Manifest Model

use serde::{Deserialize, Serialize};
use shared::status::ManifestStatus;
use sqlx::types::Json;
use validator::Validate;

use super::package::StatusHistoryEntry;

/// Manifest entity with embedded status ledger
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Manifest {
    pub id: i64,
    pub manifest_code: String,
    /// Partner-side id
    pub external_id: Option<String>,
    #[sqlx(try_from = "i64")]
    pub status: ManifestStatus,
    pub status_history: Json<Vec<StatusHistoryEntry>>,
    pub carrier: Option<String>,
    pub vessel: Option<String>,
    pub departure_date: Option<i64>,
    pub arrival_date: Option<i64>,
    pub notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Manifest {
    pub fn is_deletable(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Create manifest payload
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ManifestCreate {
    #[validate(length(min = 1, max = 64))]
    pub manifest_code: String,
    pub external_id: Option<String>,
    pub status: Option<u8>,
    pub carrier: Option<String>,
    pub vessel: Option<String>,
    pub departure_date: Option<i64>,
    pub arrival_date: Option<i64>,
    pub notes: Option<String>,
}

/// Update manifest payload (all optional)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestUpdate {
    pub external_id: Option<String>,
    pub carrier: Option<String>,
    pub vessel: Option<String>,
    pub departure_date: Option<i64>,
    pub arrival_date: Option<i64>,
    pub notes: Option<String>,
}
