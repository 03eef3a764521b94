//! 合作方入站同步 Handlers
//!
//! 批量接口逐条收集错误：一条坏记录只失败它自己，不拖垮整批。

use axum::{Json, extract::State, http::HeaderMap};
use serde::Serialize;
use serde_json::{Value, json};

use crate::auth::{token_from_headers, token_matches};
use crate::core::ServerState;
use crate::events;
use crate::partner::reconcile::{self, PackageUpsertOutcome};
use crate::partner::{manifest_to_record, package_to_record};
use crate::stats;
use crate::utils::{AppError, AppResult};
use shared::event::EventType;
use shared::partner::{
    OneOrMany, PartnerDeleteKey, PartnerManifestUpdate, PartnerPackageRecord, SyncItemResult,
};

/// 合作方入站写入在台账中的署名
const ACTOR_PARTNER: &str = "partner-sync";

/// POST /api/partner/packages - 新增/更新包裹（单条或数组）
pub async fn sync_packages(
    State(state): State<ServerState>,
    Json(payload): Json<OneOrMany<PartnerPackageRecord>>,
) -> AppResult<Json<Vec<SyncItemResult>>> {
    let records = payload.into_vec();
    let mut results = Vec::with_capacity(records.len());

    for record in records {
        let tracking_number = record.tracking_number.clone();
        match sync_one_package(&state, &record).await {
            Ok(outcome) => {
                results.push(SyncItemResult::ok(
                    Some(outcome.package.tracking_number.clone()),
                    package_to_record(&outcome.package),
                ));
            }
            Err(e) => {
                tracing::warn!(
                    tracking_number = tracking_number.as_deref().unwrap_or("?"),
                    error = %e,
                    "partner package sync item failed"
                );
                results.push(SyncItemResult::failed(tracking_number, e.to_string()));
            }
        }
    }

    Ok(Json(results))
}

async fn sync_one_package(
    state: &ServerState,
    record: &PartnerPackageRecord,
) -> AppResult<PackageUpsertOutcome> {
    let outcome = reconcile::upsert_package(state.pool(), record, ACTOR_PARTNER).await?;

    // 客户重挂时旧客户也要重投影
    if let Some(prior) = outcome.prior_customer_id {
        stats::recompute_soft(state.pool(), Some(prior)).await;
    }
    stats::recompute_soft(state.pool(), outcome.package.customer_id).await;

    let event_type = if outcome.created {
        EventType::PackageCreated
    } else if outcome.status_changed {
        EventType::PackageStatusChanged
    } else {
        EventType::PackageUpdated
    };
    // 合作方自己发来的变更不回推合作方
    events::package_event(state, event_type, &outcome.package, false);

    Ok(outcome)
}

/// 清单同步响应
#[derive(Debug, Serialize)]
pub struct ManifestSyncResponse {
    #[serde(rename = "Success")]
    pub success: bool,
    #[serde(rename = "Manifest")]
    pub manifest: Value,
    /// 本次调用关联到清单的包裹数
    #[serde(rename = "Associated")]
    pub associated: usize,
}

/// POST /api/partner/manifest - 更新清单并关联包裹
pub async fn update_manifest(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(payload): Json<PartnerManifestUpdate>,
) -> AppResult<Json<ManifestSyncResponse>> {
    let provided = payload
        .api_token
        .as_deref()
        .or_else(|| token_from_headers(&headers));
    if !token_matches(&state.config, provided) {
        tracing::warn!("manifest sync rejected: bad token");
        return Err(AppError::Unauthorized);
    }

    let outcome = reconcile::upsert_manifest(
        state.pool(),
        &payload.manifest,
        &payload.collection_codes,
        &payload.package_awbs,
        ACTOR_PARTNER,
    )
    .await?;

    let event_type = if outcome.created {
        EventType::ManifestCreated
    } else if outcome.status_changed {
        EventType::ManifestStatusChanged
    } else {
        EventType::ManifestUpdated
    };
    events::manifest_event(&state, event_type, &outcome.manifest, false);

    Ok(Json(ManifestSyncResponse {
        success: true,
        manifest: serde_json::to_value(manifest_to_record(&outcome.manifest))
            .unwrap_or_else(|_| json!({})),
        associated: outcome.associated,
    }))
}

/// POST /api/partner/packages/delete - 删除包裹（单条或数组）
///
/// 终态（已取件）包裹逐条拒绝，不影响同批其他条目。
pub async fn delete_packages(
    State(state): State<ServerState>,
    Json(payload): Json<OneOrMany<PartnerDeleteKey>>,
) -> AppResult<Json<Vec<SyncItemResult>>> {
    let keys = payload.into_vec();
    let mut results = Vec::with_capacity(keys.len());

    for key in keys {
        let label = key
            .tracking_number
            .clone()
            .or_else(|| key.control_number.clone())
            .or_else(|| key.package_id.clone());
        match delete_one_package(&state, &key).await {
            Ok(record) => {
                results.push(SyncItemResult::ok(label, record));
            }
            Err(e) => {
                tracing::warn!(
                    key = label.as_deref().unwrap_or("?"),
                    error = %e,
                    "partner package delete item failed"
                );
                results.push(SyncItemResult::failed(label, e.to_string()));
            }
        }
    }

    Ok(Json(results))
}

async fn delete_one_package(
    state: &ServerState,
    key: &PartnerDeleteKey,
) -> AppResult<PartnerPackageRecord> {
    let package = reconcile::resolve_for_delete(
        state.pool(),
        key.package_id.as_deref(),
        key.tracking_number.as_deref(),
        key.control_number.as_deref(),
    )
    .await?;

    crate::db::repository::package::delete(state.pool(), package.id).await?;
    stats::recompute_soft(state.pool(), package.customer_id).await;
    events::package_deleted_event(state, &package);

    Ok(package_to_record(&package))
}
