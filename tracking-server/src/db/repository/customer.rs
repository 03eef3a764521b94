//! Customer Repository

use super::{RepoError, RepoResult};
use crate::db::models::{Customer, CustomerAggregate, CustomerCreate};
use shared::util::{now_millis, snowflake_id};
use sqlx::SqlitePool;

const COLUMNS: &str = "id, user_code, name, email, total_packages, pending_packages, \
     delivered_packages, total_weight, last_package_date, created_at, updated_at";

pub async fn find_all(pool: &SqlitePool) -> RepoResult<Vec<Customer>> {
    let customers = sqlx::query_as::<_, Customer>(&format!(
        "SELECT {COLUMNS} FROM customer ORDER BY user_code"
    ))
    .fetch_all(pool)
    .await?;
    Ok(customers)
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Customer>> {
    let customer = sqlx::query_as::<_, Customer>(&format!(
        "SELECT {COLUMNS} FROM customer WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(customer)
}

pub async fn find_by_user_code(pool: &SqlitePool, user_code: &str) -> RepoResult<Option<Customer>> {
    let customer = sqlx::query_as::<_, Customer>(&format!(
        "SELECT {COLUMNS} FROM customer WHERE user_code = ? LIMIT 1"
    ))
    .bind(user_code)
    .fetch_optional(pool)
    .await?;
    Ok(customer)
}

pub async fn create(pool: &SqlitePool, data: CustomerCreate) -> RepoResult<Customer> {
    // Check duplicate user code
    if find_by_user_code(pool, &data.user_code).await?.is_some() {
        return Err(RepoError::Duplicate(format!(
            "Customer '{}' already exists",
            data.user_code
        )));
    }

    let id = snowflake_id();
    let now = now_millis();
    sqlx::query(
        "INSERT INTO customer (id, user_code, name, email, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(&data.user_code)
    .bind(&data.name)
    .bind(&data.email)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create customer".into()))
}

/// Overwrite the derived aggregate snapshot wholesale
pub async fn write_aggregate(
    pool: &SqlitePool,
    id: i64,
    aggregate: &CustomerAggregate,
) -> RepoResult<bool> {
    let rows = sqlx::query(
        "UPDATE customer SET total_packages = ?, pending_packages = ?, \
         delivered_packages = ?, total_weight = ?, last_package_date = ?, \
         updated_at = ? WHERE id = ?",
    )
    .bind(aggregate.total_packages)
    .bind(aggregate.pending_packages)
    .bind(aggregate.delivered_packages)
    .bind(aggregate.total_weight)
    .bind(aggregate.last_package_date)
    .bind(now_millis())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(rows.rows_affected() > 0)
}
