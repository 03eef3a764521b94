//! At-least-once outbound delivery
//!
//! 事件投递：签名信封进入 [`queue::DeliveryQueue`]，由
//! [`worker::DeliveryWorker`] 周期性排空，经 [`deliverer::HttpDeliverer`]
//! 发往 webhook 与合作方端点。重试退避有界，超限后终态失败。
//!
//! Best-effort realtime publishing lives elsewhere; this module is the
//! durable half of event propagation.

pub mod deliverer;
pub mod queue;
pub mod worker;

pub use deliverer::{AttemptOutcome, Deliver, FailureReason, HttpDeliverer};
pub use queue::{DeliveryQueue, DeliveryStatus, DeliveryTarget, DueAttempt, EndpointKind, QueueItem};
pub use worker::{run_pass, DeliveryWorker};
