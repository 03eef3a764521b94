//! Tracking Server - 包裹追踪与合作方同步节点
//!
//! # 架构概述
//!
//! 本模块是追踪节点的主入口，提供以下核心功能：
//!
//! - **状态台账** (`ledger`): 包裹/清单的追加式状态历史
//! - **聚合投影** (`stats`): 客户维度的派生计数快照
//! - **合作方对账** (`partner`): 入站幂等 upsert 与出站推送
//! - **投递队列** (`delivery`): 至少一次的出站事件投递
//! - **实时推送** (`realtime`): 尽力而为的频道广播
//! - **HTTP API** (`api`): RESTful API 接口
//!
//! # 模块结构
//!
//! ```text
//! tracking-server/src/
//! ├── core/          # 配置、状态、服务器、后台任务
//! ├── auth/          # 入站令牌校验
//! ├── api/           # HTTP 路由和处理器
//! ├── routes/        # 路由装配与中间件
//! ├── db/            # 数据库层 (SQLite)
//! ├── ledger/        # 状态台账
//! ├── stats/         # 聚合投影
//! ├── partner/       # 合作方对账与推送
//! ├── delivery/      # 投递队列与 worker
//! ├── realtime/      # 实时广播
//! └── utils/         # 错误、日志
//! ```

pub mod api;
pub mod auth;
pub mod core;
pub mod db;
pub mod delivery;
pub mod events;
pub mod ledger;
pub mod partner;
pub mod realtime;
pub mod routes;
pub mod stats;
pub mod utils;

// Re-export 公共类型
pub use core::{Config, Server, ServerState};
pub use utils::{AppError, AppResponse, AppResult};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

/// 设置运行环境 (dotenv, 日志)
pub fn setup_environment() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    let log_dir = std::env::var("LOG_DIR").ok();
    let log_level = std::env::var("LOG_LEVEL").ok();
    if log_dir.is_some() {
        init_logger_with_file(log_level.as_deref(), log_dir.as_deref());
    } else {
        init_logger();
    }
    Ok(())
}

pub fn print_banner() {
    println!(
        r#"
  ______                __   _
 /_  __/________ ______/ /__(_)___  ____ _
  / / / ___/ __ `/ ___/ //_/ / __ \/ __ `/
 / / / /  / /_/ / /__/ ,< / / / / / /_/ /
/_/ /_/   \__,_/\___/_/|_/_/_/ /_/\__, /
                                 /____/
    "#
    );
}
