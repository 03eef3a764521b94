//! 投递队列运维 Handlers
//!
//! 队列是内存态的运行时结构；这些接口给运维一个观察窗口和两个
//! 干预手段：手动重试与撤销。

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;

use crate::core::ServerState;
use crate::delivery::QueueItem;
use crate::utils::{AppError, AppResult, ok_with_message};

/// GET /api/deliveries - 队列快照（按入队时间排序）
pub async fn list(State(state): State<ServerState>) -> AppResult<Json<Vec<QueueItem>>> {
    Ok(Json(state.queue.snapshot()))
}

/// GET /api/deliveries/:id - 单个投递项
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<QueueItem>> {
    let item = state
        .queue
        .get(&id)
        .ok_or_else(|| AppError::not_found(format!("Delivery item {id}")))?;
    Ok(Json(item))
}

#[derive(Debug, Default, Deserialize)]
pub struct RetryRequest {
    /// 只重试这个端点；缺省重试该项所有可重试端点
    pub endpoint_url: Option<String>,
}

/// POST /api/deliveries/:id/retry - 手动重试
///
/// 跳过退避等待但不重置尝试计数；达到上限的端点拒绝重试。
pub async fn retry(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    payload: Option<Json<RetryRequest>>,
) -> AppResult<Json<crate::utils::AppResponse<usize>>> {
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    let reset = state.queue.retry(&id, request.endpoint_url.as_deref())?;
    state.nudge_delivery();
    Ok(ok_with_message(reset, format!("{reset} endpoint(s) reset")))
}

/// DELETE /api/deliveries/:id - 撤销投递项
///
/// 进行中的尝试会完成，下个排空周期才观察到撤销。
pub async fn cancel(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<crate::utils::AppResponse<()>>> {
    state.queue.cancel(&id)?;
    Ok(ok_with_message((), "Delivery item cancelled"))
}
