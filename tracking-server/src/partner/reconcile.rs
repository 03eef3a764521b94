//! Idempotent reconciliation of partner records onto local entities
//!
//! Resolution tries an explicit ordered list of natural keys — internal id
//! first, then tracking number, then control number, then the partner's
//! external id — and the first hit short-circuits the rest. The order is
//! load-bearing: a malformed payload can match different local records on
//! different keys, and the internal id always wins.
//!
//! Merging applies only the fields present in the incoming payload;
//! absence never blanks a field. Racing creates on the same natural key
//! are resolved by the storage-level unique index: a violation means
//! "someone else just created it" and triggers a re-resolve-and-merge.

use sqlx::SqlitePool;

use crate::db::models::{Manifest, ManifestUpdate, Package, PackageUpdate};
use crate::db::repository::{RepoError, customer, manifest, package};
use crate::ledger;
use crate::utils::{AppError, AppResult};
use shared::partner::{PartnerManifestRecord, PartnerPackageRecord};
use shared::status::PackageStatus;
use shared::util::{now_millis, snowflake_id};
use sqlx::types::Json;

/// One natural-key candidate, evaluated in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateKey {
    InternalId(i64),
    TrackingNumber(String),
    ControlNumber(String),
    ExternalId(String),
}

/// Fixed-priority candidate list for a partner package record
pub fn package_candidate_keys(record: &PartnerPackageRecord) -> Vec<CandidateKey> {
    let mut keys = Vec::new();
    if let Some(tn) = record.tracking_number.as_deref()
        && !tn.is_empty()
    {
        keys.push(CandidateKey::TrackingNumber(tn.to_string()));
    }
    if let Some(cn) = record.control_number.as_deref()
        && !cn.is_empty()
    {
        keys.push(CandidateKey::ControlNumber(cn.to_string()));
    }
    if let Some(ext) = record.package_id.as_deref()
        && !ext.is_empty()
    {
        keys.push(CandidateKey::ExternalId(ext.to_string()));
    }
    keys
}

/// Resolve a package by the first matching candidate key
pub async fn resolve_package(
    pool: &SqlitePool,
    keys: &[CandidateKey],
) -> AppResult<Option<Package>> {
    for key in keys {
        let found = match key {
            CandidateKey::InternalId(id) => package::find_by_id(pool, *id).await?,
            CandidateKey::TrackingNumber(tn) => {
                package::find_by_tracking_number(pool, tn).await?
            }
            CandidateKey::ControlNumber(cn) => package::find_by_control_number(pool, cn).await?,
            CandidateKey::ExternalId(ext) => package::find_by_external_id(pool, ext).await?,
        };
        if found.is_some() {
            return Ok(found);
        }
    }
    Ok(None)
}

/// Outcome of a package upsert, with the detail callers need to fan out
/// aggregate recomputes and events
#[derive(Debug)]
pub struct PackageUpsertOutcome {
    pub package: Package,
    pub created: bool,
    pub status_changed: bool,
    /// Customer before the merge, when it differs from the new one
    pub prior_customer_id: Option<i64>,
}

/// Idempotent upsert of a partner package record.
///
/// Resolves by natural keys; merges onto the match or creates a new
/// package. An unresolvable `UserCode` never fails the call — the package
/// is flagged for manual triage instead.
pub async fn upsert_package(
    pool: &SqlitePool,
    record: &PartnerPackageRecord,
    actor: &str,
) -> AppResult<PackageUpsertOutcome> {
    if record.has_no_key() {
        return Err(AppError::validation(
            "Record carries no PackageID, TrackingNumber or ControlNumber",
        ));
    }

    let keys = package_candidate_keys(record);
    if let Some(existing) = resolve_package(pool, &keys).await? {
        return merge_package(pool, existing, record, actor).await;
    }

    match create_package_from_record(pool, record, actor).await {
        Ok(outcome) => Ok(outcome),
        Err(AppError::Conflict(_)) => {
            // Lost the create race — the unique index is the real guard.
            // Whoever won holds the row now; merge onto it.
            let existing = resolve_package(pool, &keys).await?.ok_or_else(|| {
                AppError::internal("Duplicate key reported but no record resolves")
            })?;
            merge_package(pool, existing, record, actor).await
        }
        Err(e) => Err(e),
    }
}

async fn create_package_from_record(
    pool: &SqlitePool,
    record: &PartnerPackageRecord,
    actor: &str,
) -> AppResult<PackageUpsertOutcome> {
    let tracking_number = record
        .tracking_number
        .clone()
        .ok_or_else(|| AppError::validation("TrackingNumber is required to create a package"))?;

    let status = match record.package_status {
        Some(value) => u8::from(PackageStatus::try_from(value)?),
        None => u8::from(PackageStatus::Registered),
    };

    // Unresolvable customer: create anyway, flag for manual triage
    let (customer_id, unresolved) = match record.user_code.as_deref() {
        Some(code) if !code.is_empty() => match customer::find_by_user_code(pool, code).await? {
            Some(c) => (Some(c.id), false),
            None => {
                tracing::warn!(user_code = code, tracking_number = %tracking_number,
                    "Partner record references unknown customer, flagging");
                (None, true)
            }
        },
        _ => (None, false),
    };

    let now = now_millis();
    let row = Package {
        id: snowflake_id(),
        tracking_number,
        control_number: record.control_number.clone(),
        external_id: record.package_id.clone(),
        customer_id,
        customer_unresolved: unresolved,
        manifest_id: None,
        status: PackageStatus::try_from(status)?,
        status_history: Json(vec![ledger::bootstrap_entry(
            status,
            record.location.clone(),
            record.notes.clone(),
            actor,
        )]),
        description: record.description.clone(),
        weight: record.weight.unwrap_or(0.0),
        pieces: record.pieces.unwrap_or(1),
        shipper: record.shipper.clone(),
        origin: record.origin.clone(),
        destination: record.destination.clone(),
        created_at: now,
        updated_at: now,
    };

    // Duplicate surfaces as AppError::Conflict; the caller re-resolves
    let package = package::insert(pool, &row).await?;
    Ok(PackageUpsertOutcome {
        package,
        created: true,
        status_changed: true,
        prior_customer_id: None,
    })
}

async fn merge_package(
    pool: &SqlitePool,
    existing: Package,
    record: &PartnerPackageRecord,
    actor: &str,
) -> AppResult<PackageUpsertOutcome> {
    let mut package = existing;
    let prior_customer_id = package.customer_id;

    // Field-by-field merge: only fields present in the payload are applied
    let update = PackageUpdate {
        control_number: record.control_number.clone(),
        external_id: record.package_id.clone(),
        customer_id: None, // handled below via user_code resolution
        description: record.description.clone(),
        weight: record.weight,
        pieces: record.pieces,
        shipper: record.shipper.clone(),
        origin: record.origin.clone(),
        destination: record.destination.clone(),
    };
    package = package::update_fields(pool, package.id, &update, now_millis()).await?;

    if let Some(code) = record.user_code.as_deref()
        && !code.is_empty()
    {
        match customer::find_by_user_code(pool, code).await? {
            Some(c) => {
                package::set_customer(pool, package.id, Some(c.id), false, now_millis()).await?;
            }
            None => {
                tracing::warn!(user_code = code, package_id = package.id,
                    "Partner record references unknown customer, flagging");
                package::set_customer(
                    pool,
                    package.id,
                    package.customer_id,
                    true,
                    now_millis(),
                )
                .await?;
            }
        }
        package = package::find_by_id(pool, package.id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Package {} not found", package.id)))?;
    }

    // Status difference goes through the ledger like any other transition
    let mut status_changed = false;
    if let Some(new_status) = record.package_status {
        status_changed = ledger::append_package_transition(
            &mut package,
            new_status,
            record.location.clone(),
            record.notes.clone(),
            actor,
        )?;
        if status_changed {
            package::persist_status(
                pool,
                package.id,
                u8::from(package.status),
                &package.status_history,
                package.updated_at,
            )
            .await?;
        }
    }

    let prior = if package.customer_id != prior_customer_id {
        prior_customer_id
    } else {
        None
    };

    Ok(PackageUpsertOutcome {
        package,
        created: false,
        status_changed,
        prior_customer_id: prior,
    })
}

/// Outcome of a manifest upsert
#[derive(Debug)]
pub struct ManifestUpsertOutcome {
    pub manifest: Manifest,
    pub created: bool,
    pub status_changed: bool,
    /// Packages associated to the manifest by this call
    pub associated: usize,
}

/// Idempotent upsert of a partner manifest record, associating the listed
/// packages as a side effect.
pub async fn upsert_manifest(
    pool: &SqlitePool,
    record: &PartnerManifestRecord,
    collection_codes: &[String],
    package_awbs: &[String],
    actor: &str,
) -> AppResult<ManifestUpsertOutcome> {
    let existing = match record.manifest_code.as_deref() {
        Some(code) if !code.is_empty() => manifest::find_by_code(pool, code).await?,
        _ => None,
    };
    let existing = match existing {
        Some(m) => Some(m),
        None => match record.manifest_id.as_deref() {
            Some(ext) if !ext.is_empty() => manifest::find_by_external_id(pool, ext).await?,
            _ => None,
        },
    };

    let (mut manifest, created) = match existing {
        Some(m) => (m, false),
        None => {
            let code = record.manifest_code.clone().ok_or_else(|| {
                AppError::validation("ManifestCode is required to create a manifest")
            })?;
            let status = record.status.unwrap_or(0);
            let now = now_millis();
            let row = Manifest {
                id: snowflake_id(),
                manifest_code: code,
                external_id: record.manifest_id.clone(),
                status: shared::status::ManifestStatus::try_from(status)?,
                status_history: Json(vec![ledger::bootstrap_entry(status, None, None, actor)]),
                carrier: record.carrier.clone(),
                vessel: record.vessel.clone(),
                departure_date: record.departure_date,
                arrival_date: record.arrival_date,
                notes: record.notes.clone(),
                created_at: now,
                updated_at: now,
            };
            match manifest::insert(pool, &row).await {
                Ok(m) => (m, true),
                Err(RepoError::Duplicate(_)) => {
                    let m = manifest::find_by_code(pool, &row.manifest_code)
                        .await?
                        .ok_or_else(|| {
                            AppError::internal("Duplicate key reported but no manifest resolves")
                        })?;
                    (m, false)
                }
                Err(e) => return Err(AppError::from(e)),
            }
        }
    };

    let mut status_changed = created;
    if !created {
        let update = ManifestUpdate {
            external_id: record.manifest_id.clone(),
            carrier: record.carrier.clone(),
            vessel: record.vessel.clone(),
            departure_date: record.departure_date,
            arrival_date: record.arrival_date,
            notes: record.notes.clone(),
        };
        manifest = manifest::update_fields(pool, manifest.id, &update, now_millis()).await?;

        if let Some(new_status) = record.status {
            status_changed =
                ledger::append_manifest_transition(&mut manifest, new_status, None, None, actor)?;
            if status_changed {
                manifest::persist_status(
                    pool,
                    manifest.id,
                    u8::from(manifest.status),
                    &manifest.status_history,
                    manifest.updated_at,
                )
                .await?;
            }
        }
    }

    // Associate matched packages: control numbers first, then AWBs
    let mut associated = 0usize;
    for code in collection_codes {
        if let Some(p) = package::find_by_control_number(pool, code).await?
            && p.manifest_id != Some(manifest.id)
        {
            package::set_manifest(pool, p.id, Some(manifest.id), now_millis()).await?;
            associated += 1;
        }
    }
    for awb in package_awbs {
        if let Some(p) = package::find_by_tracking_number(pool, awb).await?
            && p.manifest_id != Some(manifest.id)
        {
            package::set_manifest(pool, p.id, Some(manifest.id), now_millis()).await?;
            associated += 1;
        }
    }

    Ok(ManifestUpsertOutcome {
        manifest,
        created,
        status_changed,
        associated,
    })
}

/// Resolve a package for deletion by any one of the partner keys.
///
/// Terminal (claimed) packages are refused with a conflict so batch
/// callers can collect the rejection per item.
pub async fn resolve_for_delete(
    pool: &SqlitePool,
    package_id: Option<&str>,
    tracking_number: Option<&str>,
    control_number: Option<&str>,
) -> AppResult<Package> {
    let mut keys = Vec::new();
    // A numeric PackageID is tried as our own id before anything else
    if let Some(raw) = package_id
        && let Ok(id) = raw.parse::<i64>()
    {
        keys.push(CandidateKey::InternalId(id));
    }
    if let Some(tn) = tracking_number
        && !tn.is_empty()
    {
        keys.push(CandidateKey::TrackingNumber(tn.to_string()));
    }
    if let Some(cn) = control_number
        && !cn.is_empty()
    {
        keys.push(CandidateKey::ControlNumber(cn.to_string()));
    }
    if let Some(ext) = package_id
        && !ext.is_empty()
    {
        keys.push(CandidateKey::ExternalId(ext.to_string()));
    }
    if keys.is_empty() {
        return Err(AppError::validation("No key provided for delete"));
    }

    let package = resolve_package(pool, &keys)
        .await?
        .ok_or_else(|| AppError::not_found("Package not found for delete"))?;

    if !package.is_deletable() {
        return Err(AppError::conflict(format!(
            "Package {} is {} and cannot be deleted",
            package.tracking_number,
            package.status.display_name()
        )));
    }
    Ok(package)
}
