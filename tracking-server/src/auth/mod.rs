//! 认证中间件
//!
//! 入站合作方接口使用单一 API 令牌：`X-Api-Token` 头或
//! `Authorization: Bearer <token>`。清单更新接口额外接受请求体内的
//! `APIToken` 字段（合作方历史格式），在 handler 内校验。

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::core::{Config, ServerState};
use crate::utils::AppError;

/// 校验提供的令牌是否与配置一致
///
/// 未配置 API_TOKEN 时一律拒绝。
pub fn token_matches(config: &Config, provided: Option<&str>) -> bool {
    match (&config.api_token, provided) {
        (Some(expected), Some(token)) => expected == token,
        _ => false,
    }
}

/// 从请求头提取令牌：`X-Api-Token` 优先，其次 `Authorization: Bearer`
pub fn token_from_headers(headers: &HeaderMap) -> Option<&str> {
    if let Some(token) = headers.get("X-Api-Token").and_then(|h| h.to_str().ok()) {
        return Some(token);
    }
    headers
        .get(http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// 认证中间件 - 入站合作方接口必须携带有效令牌
///
/// # 错误处理
///
/// | 错误 | HTTP 状态码 |
/// |------|------------|
/// | 缺少或错误的令牌 | 401 Unauthorized |
pub async fn require_api_token(
    State(state): State<ServerState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    // 允许 CORS 预检的 OPTIONS 请求 (跳过认证)
    if req.method() == http::Method::OPTIONS {
        return Ok(next.run(req).await);
    }

    let provided = token_from_headers(req.headers());
    if !token_matches(&state.config, provided) {
        tracing::warn!(uri = %req.uri(), "inbound partner request rejected: bad token");
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_token(token: Option<&str>) -> Config {
        let mut config = Config::with_overrides("/tmp/tracking-test", 0);
        config.api_token = token.map(String::from);
        config
    }

    #[test]
    fn matches_only_configured_token() {
        let config = config_with_token(Some("secret"));
        assert!(token_matches(&config, Some("secret")));
        assert!(!token_matches(&config, Some("wrong")));
        assert!(!token_matches(&config, None));
    }

    #[test]
    fn unset_token_rejects_everything() {
        let config = config_with_token(None);
        assert!(!token_matches(&config, Some("anything")));
        assert!(!token_matches(&config, None));
    }

    #[test]
    fn header_extraction_prefers_api_token() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Api-Token", "alpha".parse().unwrap());
        headers.insert(http::header::AUTHORIZATION, "Bearer beta".parse().unwrap());
        assert_eq!(token_from_headers(&headers), Some("alpha"));

        headers.remove("X-Api-Token");
        assert_eq!(token_from_headers(&headers), Some("beta"));

        headers.remove(http::header::AUTHORIZATION);
        assert_eq!(token_from_headers(&headers), None);
    }
}
