//! API 路由模块
//!
//! # 结构
//!
//! - [`health`] - 健康检查接口
//! - [`packages`] - 包裹管理接口
//! - [`manifests`] - 清单管理接口
//! - [`customers`] - 客户管理接口
//! - [`partner_sync`] - 合作方入站同步接口
//! - [`deliveries`] - 投递队列运维接口

pub mod customers;
pub mod deliveries;
pub mod health;
pub mod manifests;
pub mod packages;
pub mod partner_sync;

use serde::{Deserialize, Serialize};

// Re-export common types for handlers
pub use crate::utils::{AppResponse, AppResult};

/// Paged listing query, shared by list endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct PageQuery {
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

impl PageQuery {
    pub fn limit(&self) -> i64 {
        self.page_size.clamp(1, 500)
    }

    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1) * self.limit()
    }
}

/// Paged listing response
#[derive(Debug, Serialize)]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

impl<T> PageResponse<T> {
    pub fn new(items: Vec<T>, total: i64, page: i64, page_size: i64) -> Self {
        Self {
            items,
            total,
            page: page.max(1),
            page_size,
        }
    }
}
