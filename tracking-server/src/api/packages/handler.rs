//! Package API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use sqlx::types::Json as SqlJson;
use validator::Validate;

use crate::api::PageResponse;
use crate::core::ServerState;
use crate::db::models::{Package, PackageCreate, PackageUpdate, StatusHistoryEntry};
use crate::db::repository::{customer, package};
use crate::events;
use crate::ledger;
use crate::stats;
use crate::utils::{AppError, AppResult, ok_with_message};
use shared::event::EventType;
use shared::status::PackageStatus;
use shared::util::{now_millis, snowflake_id};

/// 操作员触发的写入在台账中的署名
const ACTOR_OPERATOR: &str = "operator";

#[derive(Debug, Deserialize)]
pub struct PackageListQuery {
    pub status: Option<u8>,
    pub customer_id: Option<i64>,
    pub manifest_id: Option<i64>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    50
}

/// GET /api/packages - 分页列出包裹
pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<PackageListQuery>,
) -> AppResult<Json<PageResponse<Package>>> {
    let page_size = query.page_size.clamp(1, 500);
    let filter = package::PackageFilter {
        status: query.status,
        customer_id: query.customer_id,
        manifest_id: query.manifest_id,
        limit: page_size,
        offset: (query.page.max(1) - 1) * page_size,
    };
    let (packages, total) = package::find_page(state.pool(), &filter).await?;
    Ok(Json(PageResponse::new(packages, total, query.page, page_size)))
}

/// GET /api/packages/:id - 获取单个包裹
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Package>> {
    let package = package::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Package {id}")))?;
    Ok(Json(package))
}

/// GET /api/packages/by-tracking/:tracking_number - 按运单号获取
pub async fn get_by_tracking(
    State(state): State<ServerState>,
    Path(tracking_number): Path<String>,
) -> AppResult<Json<Package>> {
    let package = package::find_by_tracking_number(state.pool(), &tracking_number)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Package {tracking_number}")))?;
    Ok(Json(package))
}

#[derive(Debug, Serialize)]
pub struct PackageHistoryResponse {
    pub entries: Vec<StatusHistoryEntry>,
    /// 当前状态已停留的毫秒数
    pub millis_in_current_status: Option<i64>,
}

/// GET /api/packages/:id/history - 状态台账
pub async fn history(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<PackageHistoryResponse>> {
    let package = package::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Package {id}")))?;
    let millis_in_current_status = ledger::millis_in_current_status(&package.status_history.0);
    Ok(Json(PackageHistoryResponse {
        entries: package.status_history.0,
        millis_in_current_status,
    }))
}

/// POST /api/packages - 入库登记
pub async fn create(
    State(state): State<ServerState>,
    Json(payload): Json<PackageCreate>,
) -> AppResult<Json<Package>> {
    payload
        .validate()
        .map_err(|e| AppError::validation(e.to_string()))?;

    // 指定的客户必须存在；合作方入站的"未知客户仍创建"规则不适用于操作员
    if let Some(customer_id) = payload.customer_id
        && customer::find_by_id(state.pool(), customer_id)
            .await?
            .is_none()
    {
        return Err(AppError::validation(format!(
            "Customer {customer_id} does not exist"
        )));
    }

    let status = match payload.status {
        Some(value) => PackageStatus::try_from(value)?,
        None => PackageStatus::Registered,
    };

    let now = now_millis();
    let row = Package {
        id: snowflake_id(),
        tracking_number: payload.tracking_number,
        control_number: payload.control_number,
        external_id: payload.external_id,
        customer_id: payload.customer_id,
        customer_unresolved: false,
        manifest_id: None,
        status,
        status_history: SqlJson(vec![ledger::bootstrap_entry(
            u8::from(status),
            payload.location,
            payload.notes,
            ACTOR_OPERATOR,
        )]),
        description: payload.description,
        weight: payload.weight.unwrap_or(0.0),
        pieces: payload.pieces.unwrap_or(1),
        shipper: payload.shipper,
        origin: payload.origin,
        destination: payload.destination,
        created_at: now,
        updated_at: now,
    };

    let package = package::insert(state.pool(), &row).await?;
    stats::recompute_soft(state.pool(), package.customer_id).await;
    events::package_event(&state, EventType::PackageCreated, &package, true);

    Ok(Json(package))
}

/// PUT /api/packages/:id - 部分更新（缺省字段保持不变）
pub async fn update(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(payload): Json<PackageUpdate>,
) -> AppResult<Json<Package>> {
    let existing = package::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Package {id}")))?;

    if let Some(customer_id) = payload.customer_id
        && customer::find_by_id(state.pool(), customer_id)
            .await?
            .is_none()
    {
        return Err(AppError::validation(format!(
            "Customer {customer_id} does not exist"
        )));
    }

    let package = package::update_fields(state.pool(), id, &payload, now_millis()).await?;

    // 客户变更时新旧两边都要重投影
    if package.customer_id != existing.customer_id {
        stats::recompute_soft(state.pool(), existing.customer_id).await;
    }
    stats::recompute_soft(state.pool(), package.customer_id).await;
    events::package_event(&state, EventType::PackageUpdated, &package, true);

    Ok(Json(package))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: u8,
    pub location: Option<String>,
    pub notes: Option<String>,
}

/// POST /api/packages/:id/status - 追加状态变更
///
/// 与当前状态相同的更新是幂等空操作，直接返回实体。
pub async fn update_status(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(payload): Json<StatusUpdateRequest>,
) -> AppResult<Json<Package>> {
    let mut package = package::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Package {id}")))?;

    let changed = ledger::append_package_transition(
        &mut package,
        payload.status,
        payload.location,
        payload.notes,
        ACTOR_OPERATOR,
    )?;
    if !changed {
        return Ok(Json(package));
    }

    package::persist_status(
        state.pool(),
        package.id,
        u8::from(package.status),
        &package.status_history,
        package.updated_at,
    )
    .await?;

    stats::recompute_soft(state.pool(), package.customer_id).await;
    events::package_event(&state, EventType::PackageStatusChanged, &package, true);

    Ok(Json(package))
}

/// DELETE /api/packages/:id - 删除包裹
///
/// 终态（已取件）包裹拒绝删除。
pub async fn delete(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<crate::utils::AppResponse<()>>> {
    let package = package::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Package {id}")))?;

    if !package.is_deletable() {
        return Err(AppError::conflict(format!(
            "Package {} is {} and cannot be deleted",
            package.tracking_number,
            package.status.display_name()
        )));
    }

    package::delete(state.pool(), id).await?;
    stats::recompute_soft(state.pool(), package.customer_id).await;
    events::package_deleted_event(&state, &package);

    Ok(ok_with_message((), "Package deleted"))
}
