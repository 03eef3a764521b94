//! 合作方入站同步 API 模块
//!
//! | 路径 | 方法 | 认证 |
//! |------|------|------|
//! | /api/partner/packages | POST | 令牌头 |
//! | /api/partner/packages/delete | POST | 令牌头 |
//! | /api/partner/manifest | POST | 令牌头或请求体 APIToken |

mod handler;

use axum::{Router, middleware, routing::post};

use crate::auth::require_api_token;
use crate::core::ServerState;

pub fn router(state: ServerState) -> Router<ServerState> {
    // 清单接口在 handler 内校验令牌（合作方历史格式把令牌放在请求体）
    let guarded = Router::new()
        .route("/packages", post(handler::sync_packages))
        .route("/packages/delete", post(handler::delete_packages))
        .layer(middleware::from_fn_with_state(state, require_api_token));

    let open = Router::new().route("/manifest", post(handler::update_manifest));

    Router::new().nest("/api/partner", guarded.merge(open))
}
