//! Manifest API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use sqlx::types::Json as SqlJson;
use validator::Validate;

use crate::api::{PageQuery, PageResponse};
use crate::core::ServerState;
use crate::db::models::{Manifest, ManifestCreate, ManifestUpdate, Package};
use crate::db::repository::{manifest, package};
use crate::events;
use crate::ledger;
use crate::utils::{AppError, AppResult, ok_with_message};
use shared::event::EventType;
use shared::status::ManifestStatus;
use shared::util::{now_millis, snowflake_id};

const ACTOR_OPERATOR: &str = "operator";

#[derive(Debug, Deserialize)]
pub struct ManifestListQuery {
    pub status: Option<u8>,
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

/// GET /api/manifests - 分页列出清单
pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<ManifestListQuery>,
) -> AppResult<Json<PageResponse<Manifest>>> {
    let page_size = query.page_size.clamp(1, 500);
    let offset = (query.page.max(1) - 1) * page_size;
    let (manifests, total) =
        manifest::find_page(state.pool(), query.status, page_size, offset).await?;
    Ok(Json(PageResponse::new(manifests, total, query.page, page_size)))
}

/// GET /api/manifests/:id - 获取单个清单
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Manifest>> {
    let manifest = manifest::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Manifest {id}")))?;
    Ok(Json(manifest))
}

/// GET /api/manifests/:id/packages - 清单下的包裹
pub async fn list_packages(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<PageResponse<Package>>> {
    if manifest::find_by_id(state.pool(), id).await?.is_none() {
        return Err(AppError::not_found(format!("Manifest {id}")));
    }
    let filter = package::PackageFilter {
        manifest_id: Some(id),
        limit: query.limit(),
        offset: query.offset(),
        ..Default::default()
    };
    let (packages, total) = package::find_page(state.pool(), &filter).await?;
    Ok(Json(PageResponse::new(packages, total, query.page, query.limit())))
}

/// POST /api/manifests - 建立清单
pub async fn create(
    State(state): State<ServerState>,
    Json(payload): Json<ManifestCreate>,
) -> AppResult<Json<Manifest>> {
    payload
        .validate()
        .map_err(|e| AppError::validation(e.to_string()))?;

    let status = match payload.status {
        Some(value) => ManifestStatus::try_from(value)?,
        None => ManifestStatus::Draft,
    };

    let now = now_millis();
    let row = Manifest {
        id: snowflake_id(),
        manifest_code: payload.manifest_code,
        external_id: payload.external_id,
        status,
        status_history: SqlJson(vec![ledger::bootstrap_entry(
            u8::from(status),
            None,
            None,
            ACTOR_OPERATOR,
        )]),
        carrier: payload.carrier,
        vessel: payload.vessel,
        departure_date: payload.departure_date,
        arrival_date: payload.arrival_date,
        notes: payload.notes,
        created_at: now,
        updated_at: now,
    };

    let manifest = manifest::insert(state.pool(), &row).await?;
    events::manifest_event(&state, EventType::ManifestCreated, &manifest, true);

    Ok(Json(manifest))
}

/// PUT /api/manifests/:id - 部分更新
pub async fn update(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(payload): Json<ManifestUpdate>,
) -> AppResult<Json<Manifest>> {
    let manifest = manifest::update_fields(state.pool(), id, &payload, now_millis()).await?;
    events::manifest_event(&state, EventType::ManifestUpdated, &manifest, true);
    Ok(Json(manifest))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: u8,
    pub location: Option<String>,
    pub notes: Option<String>,
}

/// POST /api/manifests/:id/status - 追加状态变更
pub async fn update_status(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(payload): Json<StatusUpdateRequest>,
) -> AppResult<Json<Manifest>> {
    let mut manifest = manifest::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Manifest {id}")))?;

    let changed = ledger::append_manifest_transition(
        &mut manifest,
        payload.status,
        payload.location,
        payload.notes,
        ACTOR_OPERATOR,
    )?;
    if !changed {
        return Ok(Json(manifest));
    }

    manifest::persist_status(
        state.pool(),
        manifest.id,
        u8::from(manifest.status),
        &manifest.status_history,
        manifest.updated_at,
    )
    .await?;

    events::manifest_event(&state, EventType::ManifestStatusChanged, &manifest, true);

    Ok(Json(manifest))
}

/// DELETE /api/manifests/:id - 删除清单
///
/// 终态（已结算）清单拒绝删除；仍挂着包裹的清单拒绝删除。
pub async fn delete(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<crate::utils::AppResponse<()>>> {
    let manifest = manifest::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Manifest {id}")))?;

    if !manifest.is_deletable() {
        return Err(AppError::conflict(format!(
            "Manifest {} is {} and cannot be deleted",
            manifest.manifest_code,
            manifest.status.display_name()
        )));
    }

    let filter = package::PackageFilter {
        manifest_id: Some(id),
        limit: 1,
        ..Default::default()
    };
    let (_, attached) = package::find_page(state.pool(), &filter).await?;
    if attached > 0 {
        return Err(AppError::business_rule(format!(
            "Manifest {} still has {attached} package(s) attached",
            manifest.manifest_code
        )));
    }

    manifest::delete(state.pool(), id).await?;
    Ok(ok_with_message((), "Manifest deleted"))
}
