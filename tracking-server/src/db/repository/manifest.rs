//! Manifest Repository

use super::{RepoError, RepoResult};
use crate::db::models::{Manifest, ManifestUpdate, StatusHistoryEntry};
use sqlx::SqlitePool;
use sqlx::types::Json;

const COLUMNS: &str = "id, manifest_code, external_id, status, status_history, carrier, \
     vessel, departure_date, arrival_date, notes, created_at, updated_at";

pub async fn find_page(
    pool: &SqlitePool,
    status: Option<u8>,
    limit: i64,
    offset: i64,
) -> RepoResult<(Vec<Manifest>, i64)> {
    let mut where_sql = String::from(" WHERE 1=1");
    if status.is_some() {
        where_sql.push_str(" AND status = ?");
    }

    let list_sql = format!(
        "SELECT {COLUMNS} FROM manifest{where_sql} ORDER BY created_at DESC LIMIT ? OFFSET ?"
    );
    let count_sql = format!("SELECT COUNT(*) FROM manifest{where_sql}");

    let mut list_query = sqlx::query_as::<_, Manifest>(&list_sql);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(status) = status {
        list_query = list_query.bind(status as i64);
        count_query = count_query.bind(status as i64);
    }

    let limit = if limit <= 0 { 50 } else { limit };
    let manifests = list_query
        .bind(limit)
        .bind(offset.max(0))
        .fetch_all(pool)
        .await?;
    let total = count_query.fetch_one(pool).await?;
    Ok((manifests, total))
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Manifest>> {
    let manifest = sqlx::query_as::<_, Manifest>(&format!(
        "SELECT {COLUMNS} FROM manifest WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(manifest)
}

pub async fn find_by_code(pool: &SqlitePool, code: &str) -> RepoResult<Option<Manifest>> {
    let manifest = sqlx::query_as::<_, Manifest>(&format!(
        "SELECT {COLUMNS} FROM manifest WHERE manifest_code = ? LIMIT 1"
    ))
    .bind(code)
    .fetch_optional(pool)
    .await?;
    Ok(manifest)
}

pub async fn find_by_external_id(
    pool: &SqlitePool,
    external_id: &str,
) -> RepoResult<Option<Manifest>> {
    let manifest = sqlx::query_as::<_, Manifest>(&format!(
        "SELECT {COLUMNS} FROM manifest WHERE external_id = ? LIMIT 1"
    ))
    .bind(external_id)
    .fetch_optional(pool)
    .await?;
    Ok(manifest)
}

pub async fn insert(pool: &SqlitePool, manifest: &Manifest) -> RepoResult<Manifest> {
    sqlx::query(
        "INSERT INTO manifest (id, manifest_code, external_id, status, status_history, \
         carrier, vessel, departure_date, arrival_date, notes, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(manifest.id)
    .bind(&manifest.manifest_code)
    .bind(&manifest.external_id)
    .bind(u8::from(manifest.status) as i64)
    .bind(&manifest.status_history)
    .bind(&manifest.carrier)
    .bind(&manifest.vessel)
    .bind(manifest.departure_date)
    .bind(manifest.arrival_date)
    .bind(&manifest.notes)
    .bind(manifest.created_at)
    .bind(manifest.updated_at)
    .execute(pool)
    .await?;

    find_by_id(pool, manifest.id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create manifest".into()))
}

/// Partial field update. Absent fields keep their current value.
pub async fn update_fields(
    pool: &SqlitePool,
    id: i64,
    data: &ManifestUpdate,
    now: i64,
) -> RepoResult<Manifest> {
    let rows = sqlx::query(
        "UPDATE manifest SET \
         external_id = COALESCE(?1, external_id), \
         carrier = COALESCE(?2, carrier), \
         vessel = COALESCE(?3, vessel), \
         departure_date = COALESCE(?4, departure_date), \
         arrival_date = COALESCE(?5, arrival_date), \
         notes = COALESCE(?6, notes), \
         updated_at = ?7 \
         WHERE id = ?8",
    )
    .bind(&data.external_id)
    .bind(&data.carrier)
    .bind(&data.vessel)
    .bind(data.departure_date)
    .bind(data.arrival_date)
    .bind(&data.notes)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Manifest {id} not found")));
    }
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Manifest {id} not found")))
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
        "UPDATE manifest SET status = ?, status_history = ?, updated_at = ? WHERE id = ?",
    )
    .bind(status as i64)
    .bind(history)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Manifest {id} not found")));
    }
    Ok(())
}

pub async fn delete(pool: &SqlitePool, id: i64) -> RepoResult<bool> {
    let rows = sqlx::query("DELETE FROM manifest WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(rows.rows_affected() > 0)
}
