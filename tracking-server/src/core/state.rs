use serde_json::{Value, json};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use shared::event::{EventEnvelope, EventType};

use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::core::Config;
use crate::db::DbService;
use crate::delivery::{DeliveryQueue, DeliveryTarget, DeliveryWorker, HttpDeliverer};
use crate::partner::client::PartnerClient;
use crate::realtime::RealtimePublisher;
use crate::utils::AppResult;

/// 服务器状态 - 持有所有服务的单例引用
///
/// ServerState 是追踪节点的核心数据结构，持有所有服务的共享引用。
/// 使用 Arc 实现浅拷贝，所有权成本极低。
///
/// | 字段 | 类型 | 说明 |
/// |------|------|------|
/// | config | Config | 配置项 (不可变) |
/// | db | DbService | SQLite 连接池 |
/// | queue | Arc<DeliveryQueue> | 出站投递队列 |
/// | publisher | Arc<RealtimePublisher> | 实时推送 |
/// | partner | Arc<PartnerClient> | 合作方出站客户端 |
#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    pub db: DbService,
    pub queue: Arc<DeliveryQueue>,
    pub publisher: Arc<RealtimePublisher>,
    pub partner: Arc<PartnerClient>,
    /// 入队后唤醒投递 worker
    nudge_tx: mpsc::Sender<()>,
}

impl ServerState {
    /// 初始化服务器状态
    ///
    /// 返回状态与投递 worker 的唤醒通道接收端；接收端交给
    /// [`ServerState::start_background_tasks`]。
    pub async fn initialize(config: &Config) -> AppResult<(Self, mpsc::Receiver<()>)> {
        config.validate()?;

        let work_dir = PathBuf::from(&config.work_dir);
        std::fs::create_dir_all(&work_dir).map_err(|e| {
            crate::utils::AppError::internal(format!("Failed to create work dir: {e}"))
        })?;

        let db_path = work_dir.join("tracking.db");
        let db = DbService::new(&db_path.to_string_lossy()).await?;

        Self::with_db(config, db)
    }

    /// 基于内存数据库初始化（测试用）
    pub async fn initialize_in_memory(config: &Config) -> AppResult<(Self, mpsc::Receiver<()>)> {
        config.validate()?;
        let db = DbService::open_in_memory().await?;
        Self::with_db(config, db)
    }

    fn with_db(config: &Config, db: DbService) -> AppResult<(Self, mpsc::Receiver<()>)> {
        let queue = Arc::new(DeliveryQueue::new(
            config.delivery_max_attempts,
            config.delivery_backoff_ms.clone(),
        )?);
        let publisher = Arc::new(RealtimePublisher::new());
        let partner = Arc::new(PartnerClient::new(
            config.partner_base_url.clone(),
            config.partner_api_token.clone(),
            config.delivery_timeout_ms,
        )?);
        let (nudge_tx, nudge_rx) = mpsc::channel(16);

        let state = Self {
            config: config.clone(),
            db,
            queue,
            publisher,
            partner,
            nudge_tx,
        };
        Ok((state, nudge_rx))
    }

    /// 启动后台任务（目前只有投递 worker）
    pub fn start_background_tasks(
        &self,
        tasks: &mut BackgroundTasks,
        nudge_rx: mpsc::Receiver<()>,
    ) -> AppResult<()> {
        let deliverer = Arc::new(HttpDeliverer::new(
            self.partner.clone(),
            self.config.delivery_timeout_ms,
        )?);
        let worker = DeliveryWorker::new(
            self.queue.clone(),
            deliverer,
            nudge_rx,
            self.config.drain_interval_ms,
            tasks.shutdown_token(),
        );
        tasks.spawn("delivery_worker", TaskKind::Periodic, worker.run());
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db.pool
    }

    /// 请求投递 worker 尽快跑一轮排空
    ///
    /// 通道已满说明一轮排空已在路上，丢弃即可。
    pub fn nudge_delivery(&self) {
        let _ = self.nudge_tx.try_send(());
    }

    /// 发出一个领域事件：签名、入队、实时广播。
    ///
    /// 出站传播永远不反作用于触发它的请求 —— 任何入队失败只记日志。
    /// `partner_push` 为 `(路径, 合作方载荷)`，存在时多挂一个合作方端点。
    /// `channels` 为实时广播的 `(频道, 载荷)` 列表。
    pub fn emit_event(
        &self,
        event_type: EventType,
        data: Value,
        partner_push: Option<(String, Value)>,
        channels: &[(String, Value)],
    ) {
        let envelope = EventEnvelope::build(
            event_type,
            data,
            json!({"source": "tracking-server"}),
            self.config.webhook_secret.as_bytes(),
        );

        let mut targets: Vec<DeliveryTarget> = self
            .config
            .webhook_endpoints
            .iter()
            .map(DeliveryTarget::webhook)
            .collect();

        let (partner_path, partner_payload) = match partner_push {
            Some((path, payload)) => {
                targets.push(DeliveryTarget::partner(format!(
                    "{}{}",
                    self.config.partner_base_url, path
                )));
                (Some(path), Some(payload))
            }
            None => (None, None),
        };

        // 状态变更与删除比普通字段更新先投递
        let priority = match event_type {
            EventType::PackageStatusChanged
            | EventType::PackageDeleted
            | EventType::ManifestStatusChanged => 1,
            _ => 0,
        };

        if !targets.is_empty() {
            match self.queue.enqueue_with_priority(
                envelope,
                targets,
                partner_payload,
                partner_path,
                priority,
            ) {
                Ok(item_id) => {
                    tracing::debug!(item_id = %item_id, event = event_type.as_str(), "event queued");
                    if self.config.deliver_on_enqueue {
                        self.nudge_delivery();
                    }
                }
                Err(e) => {
                    tracing::warn!(event = event_type.as_str(), error = %e, "event enqueue failed");
                }
            }
        }

        for (channel, payload) in channels {
            self.publisher.publish(channel, payload.clone());
        }
    }
}
