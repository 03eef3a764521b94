use crate::utils::{AppError, AppResult};

/// 服务器配置 - 追踪节点的所有配置项
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | /var/lib/tracking | 工作目录 |
/// | HTTP_PORT | 3000 | HTTP 服务端口 |
/// | API_TOKEN | (无) | 合作方入站接口令牌 |
/// | PARTNER_BASE_URL | http://localhost:9100/api | 合作方 API 地址 |
/// | PARTNER_API_TOKEN | (空) | 合作方出站令牌 |
/// | WEBHOOK_ENDPOINTS | (空) | 逗号分隔的 webhook 回调地址 |
/// | WEBHOOK_SECRET | dev-secret | 事件签名密钥 |
/// | DELIVERY_MAX_ATTEMPTS | 5 | 单端点最大投递次数 |
/// | DELIVERY_BACKOFF_MS | 1000,5000,15000,60000,300000 | 重试退避(毫秒，严格递增) |
/// | DELIVERY_TIMEOUT_MS | 10000 | 单次投递超时(毫秒) |
/// | DRAIN_INTERVAL_MS | 30000 | 队列排空周期(毫秒) |
/// | DELIVER_ON_ENQUEUE | true | 入队后立即触发排空 |
/// | ENVIRONMENT | development | 运行环境 |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_DIR | (无) | 设置后启用按日滚动的文件日志 |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/tracking HTTP_PORT=8080 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存储数据库、日志等文件
    pub work_dir: String,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// 运行环境: development | staging | production
    pub environment: String,

    // === 合作方接入配置 ===
    /// 入站令牌：合作方调用同步接口时必须携带；未设置时入站接口全部拒绝
    pub api_token: Option<String>,
    /// 合作方 API 基地址 (出站推送)
    pub partner_base_url: String,
    /// 出站推送所用令牌
    pub partner_api_token: String,

    // === 事件投递配置 ===
    /// Webhook 回调地址列表
    pub webhook_endpoints: Vec<String>,
    /// 事件信封 HMAC 签名密钥
    pub webhook_secret: String,
    /// 单端点最大投递次数，超限后终态失败
    pub delivery_max_attempts: u32,
    /// 重试退避序列(毫秒)，按尝试次数索引，必须严格递增
    pub delivery_backoff_ms: Vec<u64>,
    /// 单次投递的网络超时(毫秒)
    pub delivery_timeout_ms: u64,
    /// 周期性排空间隔(毫秒)
    pub drain_interval_ms: u64,
    /// 入队后是否立即触发一次排空
    pub deliver_on_enqueue: bool,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/tracking".into()),
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),

            api_token: std::env::var("API_TOKEN").ok().filter(|t| !t.is_empty()),
            partner_base_url: std::env::var("PARTNER_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:9100/api".into()),
            partner_api_token: std::env::var("PARTNER_API_TOKEN").unwrap_or_default(),

            webhook_endpoints: std::env::var("WEBHOOK_ENDPOINTS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            webhook_secret: std::env::var("WEBHOOK_SECRET")
                .unwrap_or_else(|_| "dev-secret".into()),
            delivery_max_attempts: std::env::var("DELIVERY_MAX_ATTEMPTS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5),
            delivery_backoff_ms: std::env::var("DELIVERY_BACKOFF_MS")
                .ok()
                .and_then(|v| {
                    v.split(',')
                        .map(|s| s.trim().parse::<u64>())
                        .collect::<Result<Vec<_>, _>>()
                        .ok()
                })
                .unwrap_or_else(|| vec![1_000, 5_000, 15_000, 60_000, 300_000]),
            delivery_timeout_ms: std::env::var("DELIVERY_TIMEOUT_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(10_000),
            drain_interval_ms: std::env::var("DRAIN_INTERVAL_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(30_000),
            deliver_on_enqueue: std::env::var("DELIVER_ON_ENQUEUE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
        }
    }

    /// 校验配置的硬性约束
    ///
    /// 退避序列必须非空且严格递增。
    pub fn validate(&self) -> AppResult<()> {
        if self.delivery_max_attempts == 0 {
            return Err(AppError::validation("DELIVERY_MAX_ATTEMPTS must be at least 1"));
        }
        if self.delivery_backoff_ms.is_empty() {
            return Err(AppError::validation("DELIVERY_BACKOFF_MS must not be empty"));
        }
        if !self.delivery_backoff_ms.windows(2).all(|w| w[0] < w[1]) {
            return Err(AppError::validation(
                "DELIVERY_BACKOFF_MS must be strictly increasing",
            ));
        }
        if self.is_production() && self.api_token.is_none() {
            tracing::warn!("API_TOKEN not set: inbound partner sync endpoints will reject all requests");
        }
        Ok(())
    }

    /// 使用自定义值覆盖部分配置
    ///
    /// 常用于测试场景
    pub fn with_overrides(work_dir: impl Into<String>, http_port: u16) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config.http_port = http_port;
        config
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            work_dir: "/tmp/tracking-test".into(),
            http_port: 0,
            environment: "development".into(),
            api_token: Some("token".into()),
            partner_base_url: "http://localhost:9100/api".into(),
            partner_api_token: String::new(),
            webhook_endpoints: vec![],
            webhook_secret: "dev-secret".into(),
            delivery_max_attempts: 3,
            delivery_backoff_ms: vec![100, 200, 400],
            delivery_timeout_ms: 1_000,
            drain_interval_ms: 1_000,
            deliver_on_enqueue: true,
        }
    }

    #[test]
    fn validate_accepts_increasing_backoff() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_backoff() {
        let mut config = base_config();
        config.delivery_backoff_ms = vec![100, 100];
        assert!(config.validate().is_err());

        config.delivery_backoff_ms = vec![];
        assert!(config.validate().is_err());

        config.delivery_backoff_ms = vec![100];
        config.delivery_max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
