//! Status history ledger
//!
//! Per-entity append-only log of status transitions — the source of truth
//! for current status. Every transition, whether it originates from the
//! operator API or from partner reconciliation, goes through here.
//!
//! The ledger mutates the entity in memory only; persisting the append is
//! the caller's repository write. Append and event propagation are
//! deliberately decoupled so bulk updates can batch many appends before
//! one downstream event.
//!
//! Invariants:
//! - `status` always equals the last history entry's status
//! - history is append-only, entries are never mutated or removed
//! - a repeated identical status is an idempotent no-op

use shared::status::{ManifestStatus, PackageStatus};
use shared::util::now_millis;

use crate::db::models::{Manifest, Package, StatusHistoryEntry};
use crate::utils::AppResult;

/// Build the single bootstrap entry every entity starts its life with
pub fn bootstrap_entry(
    status: u8,
    location: Option<String>,
    notes: Option<String>,
    actor: &str,
) -> StatusHistoryEntry {
    StatusHistoryEntry {
        status,
        timestamp: now_millis(),
        location,
        notes,
        updated_by: actor.to_string(),
    }
}

/// Append a status transition to a package.
///
/// Returns `true` when a new entry was appended, `false` for the
/// idempotent same-status no-op. An out-of-set status is rejected with a
/// validation error and nothing is touched.
pub fn append_package_transition(
    package: &mut Package,
    new_status: u8,
    location: Option<String>,
    notes: Option<String>,
    actor: &str,
) -> AppResult<bool> {
    let status = PackageStatus::try_from(new_status)?;

    if status == package.status {
        return Ok(false);
    }

    let entry = StatusHistoryEntry {
        status: new_status,
        timestamp: now_millis(),
        location,
        notes,
        updated_by: actor.to_string(),
    };
    package.status_history.0.push(entry);
    package.status = status;
    package.updated_at = now_millis();
    Ok(true)
}

/// Append a status transition to a manifest. Same contract as
/// [`append_package_transition`].
pub fn append_manifest_transition(
    manifest: &mut Manifest,
    new_status: u8,
    location: Option<String>,
    notes: Option<String>,
    actor: &str,
) -> AppResult<bool> {
    let status = ManifestStatus::try_from(new_status)?;

    if status == manifest.status {
        return Ok(false);
    }

    let entry = StatusHistoryEntry {
        status: new_status,
        timestamp: now_millis(),
        location,
        notes,
        updated_by: actor.to_string(),
    };
    manifest.status_history.0.push(entry);
    manifest.status = status;
    manifest.updated_at = now_millis();
    Ok(true)
}

/// Dwell time in the current status, derived from the last entry
pub fn millis_in_current_status(history: &[StatusHistoryEntry]) -> Option<i64> {
    history.last().map(|entry| now_millis() - entry.timestamp)
}

/// Debug-time check of the ledger invariant
pub fn invariant_holds(status: u8, history: &[StatusHistoryEntry]) -> bool {
    history.last().map(|entry| entry.status) == Some(status)
}
