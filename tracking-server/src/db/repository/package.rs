//! Package Repository

use super::{RepoError, RepoResult};
use crate::db::models::{Package, PackageUpdate, StatusHistoryEntry};
use sqlx::SqlitePool;
use sqlx::types::Json;

const COLUMNS: &str = "id, tracking_number, control_number, external_id, customer_id, \
     customer_unresolved, manifest_id, status, status_history, description, \
     weight, pieces, shipper, origin, destination, created_at, updated_at";

/// Filters for package listing
#[derive(Debug, Clone, Default)]
pub struct PackageFilter {
    pub status: Option<u8>,
    pub customer_id: Option<i64>,
    pub manifest_id: Option<i64>,
    pub limit: i64,
    pub offset: i64,
}

pub async fn find_page(pool: &SqlitePool, filter: &PackageFilter) -> RepoResult<(Vec<Package>, i64)> {
    let mut where_sql = String::from(" WHERE 1=1");
    if filter.status.is_some() {
        where_sql.push_str(" AND status = ?");
    }
    if filter.customer_id.is_some() {
        where_sql.push_str(" AND customer_id = ?");
    }
    if filter.manifest_id.is_some() {
        where_sql.push_str(" AND manifest_id = ?");
    }

    let list_sql = format!(
        "SELECT {COLUMNS} FROM package{where_sql} ORDER BY created_at DESC LIMIT ? OFFSET ?"
    );
    let count_sql = format!("SELECT COUNT(*) FROM package{where_sql}");

    let mut list_query = sqlx::query_as::<_, Package>(&list_sql);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(status) = filter.status {
        list_query = list_query.bind(status as i64);
        count_query = count_query.bind(status as i64);
    }
    if let Some(customer_id) = filter.customer_id {
        list_query = list_query.bind(customer_id);
        count_query = count_query.bind(customer_id);
    }
    if let Some(manifest_id) = filter.manifest_id {
        list_query = list_query.bind(manifest_id);
        count_query = count_query.bind(manifest_id);
    }

    let limit = if filter.limit <= 0 { 50 } else { filter.limit };
    let packages = list_query
        .bind(limit)
        .bind(filter.offset.max(0))
        .fetch_all(pool)
        .await?;
    let total = count_query.fetch_one(pool).await?;
    Ok((packages, total))
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Package>> {
    let package = sqlx::query_as::<_, Package>(&format!(
        "SELECT {COLUMNS} FROM package WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(package)
}

pub async fn find_by_tracking_number(
    pool: &SqlitePool,
    tracking_number: &str,
) -> RepoResult<Option<Package>> {
    let package = sqlx::query_as::<_, Package>(&format!(
        "SELECT {COLUMNS} FROM package WHERE tracking_number = ? LIMIT 1"
    ))
    .bind(tracking_number)
    .fetch_optional(pool)
    .await?;
    Ok(package)
}

pub async fn find_by_control_number(
    pool: &SqlitePool,
    control_number: &str,
) -> RepoResult<Option<Package>> {
    let package = sqlx::query_as::<_, Package>(&format!(
        "SELECT {COLUMNS} FROM package WHERE control_number = ? LIMIT 1"
    ))
    .bind(control_number)
    .fetch_optional(pool)
    .await?;
    Ok(package)
}

pub async fn find_by_external_id(
    pool: &SqlitePool,
    external_id: &str,
) -> RepoResult<Option<Package>> {
    let package = sqlx::query_as::<_, Package>(&format!(
        "SELECT {COLUMNS} FROM package WHERE external_id = ? LIMIT 1"
    ))
    .bind(external_id)
    .fetch_optional(pool)
    .await?;
    Ok(package)
}

/// All packages referencing a customer (projector input)
pub async fn find_by_customer(pool: &SqlitePool, customer_id: i64) -> RepoResult<Vec<Package>> {
    let packages = sqlx::query_as::<_, Package>(&format!(
        "SELECT {COLUMNS} FROM package WHERE customer_id = ? ORDER BY created_at"
    ))
    .bind(customer_id)
    .fetch_all(pool)
    .await?;
    Ok(packages)
}

/// Insert a fully-built package row.
///
/// A unique-index violation surfaces as `RepoError::Duplicate` so the
/// reconciliation layer can re-resolve instead of failing.
pub async fn insert(pool: &SqlitePool, package: &Package) -> RepoResult<Package> {
    sqlx::query(
        "INSERT INTO package (id, tracking_number, control_number, external_id, customer_id, \
         customer_unresolved, manifest_id, status, status_history, description, \
         weight, pieces, shipper, origin, destination, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(package.id)
    .bind(&package.tracking_number)
    .bind(&package.control_number)
    .bind(&package.external_id)
    .bind(package.customer_id)
    .bind(package.customer_unresolved)
    .bind(package.manifest_id)
    .bind(u8::from(package.status) as i64)
    .bind(&package.status_history)
    .bind(&package.description)
    .bind(package.weight)
    .bind(package.pieces)
    .bind(&package.shipper)
    .bind(&package.origin)
    .bind(&package.destination)
    .bind(package.created_at)
    .bind(package.updated_at)
    .execute(pool)
    .await?;

    find_by_id(pool, package.id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create package".into()))
}

/// Partial field update. Absent fields keep their current value.
pub async fn update_fields(
    pool: &SqlitePool,
    id: i64,
    data: &PackageUpdate,
    now: i64,
) -> RepoResult<Package> {
    let rows = sqlx::query(
        "UPDATE package SET \
         control_number = COALESCE(?1, control_number), \
         external_id = COALESCE(?2, external_id), \
         customer_id = COALESCE(?3, customer_id), \
         description = COALESCE(?4, description), \
         weight = COALESCE(?5, weight), \
         pieces = COALESCE(?6, pieces), \
         shipper = COALESCE(?7, shipper), \
         origin = COALESCE(?8, origin), \
         destination = COALESCE(?9, destination), \
         updated_at = ?10 \
         WHERE id = ?11",
    )
    .bind(&data.control_number)
    .bind(&data.external_id)
    .bind(data.customer_id)
    .bind(&data.description)
    .bind(data.weight)
    .bind(data.pieces)
    .bind(&data.shipper)
    .bind(&data.origin)
    .bind(&data.destination)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Package {id} not found")));
    }
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Package {id} not found")))
}

/// Persist a ledger append: status column and embedded history together
pub async fn persist_status(
    pool: &SqlitePool,
    id: i64,
    status: u8,
    history: &Json<Vec<StatusHistoryEntry>>,
    now: i64,
) -> RepoResult<()> {
    let rows = sqlx::query(
        "UPDATE package SET status = ?, status_history = ?, updated_at = ? WHERE id = ?",
    )
    .bind(status as i64)
    .bind(history)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Package {id} not found")));
    }
    Ok(())
}

/// Set or clear the customer reference without touching other fields
pub async fn set_customer(
    pool: &SqlitePool,
    id: i64,
    customer_id: Option<i64>,
    unresolved: bool,
    now: i64,
) -> RepoResult<()> {
    sqlx::query(
        "UPDATE package SET customer_id = ?, customer_unresolved = ?, updated_at = ? WHERE id = ?",
    )
    .bind(customer_id)
    .bind(unresolved)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Associate a package with a manifest
pub async fn set_manifest(
    pool: &SqlitePool,
    id: i64,
    manifest_id: Option<i64>,
    now: i64,
) -> RepoResult<()> {
    sqlx::query("UPDATE package SET manifest_id = ?, updated_at = ? WHERE id = ?")
        .bind(manifest_id)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete(pool: &SqlitePool, id: i64) -> RepoResult<bool> {
    let rows = sqlx::query("DELETE FROM package WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(rows.rows_affected() > 0)
}
