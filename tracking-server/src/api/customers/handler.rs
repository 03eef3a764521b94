//! Customer API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use validator::Validate;

use crate::api::{PageQuery, PageResponse};
use crate::core::ServerState;
use crate::db::models::{Customer, CustomerCreate, Package};
use crate::db::repository::{customer, package};
use crate::stats;
use crate::utils::{AppError, AppResult};

/// GET /api/customers - 获取所有客户
pub async fn list(State(state): State<ServerState>) -> AppResult<Json<Vec<Customer>>> {
    let customers = customer::find_all(state.pool()).await?;
    Ok(Json(customers))
}

/// GET /api/customers/:id - 获取单个客户（含聚合快照）
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Customer>> {
    let customer = customer::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Customer {id}")))?;
    Ok(Json(customer))
}

/// GET /api/customers/:id/packages - 客户名下的包裹
pub async fn list_packages(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<PageResponse<Package>>> {
    if customer::find_by_id(state.pool(), id).await?.is_none() {
        return Err(AppError::not_found(format!("Customer {id}")));
    }
    let filter = package::PackageFilter {
        customer_id: Some(id),
        limit: query.limit(),
        offset: query.offset(),
        ..Default::default()
    };
    let (packages, total) = package::find_page(state.pool(), &filter).await?;
    Ok(Json(PageResponse::new(packages, total, query.page, query.limit())))
}

/// POST /api/customers - 建档
pub async fn create(
    State(state): State<ServerState>,
    Json(payload): Json<CustomerCreate>,
) -> AppResult<Json<Customer>> {
    payload
        .validate()
        .map_err(|e| AppError::validation(e.to_string()))?;
    let customer = customer::create(state.pool(), payload).await?;
    Ok(Json(customer))
}

/// POST /api/customers/:id/recompute - 手动重投影聚合快照
///
/// 投影是全量重算，重复调用无漂移，运维可放心触发。
pub async fn recompute(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Customer>> {
    stats::recompute(state.pool(), id).await?;
    let customer = customer::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Customer {id}")))?;
    Ok(Json(customer))
}
