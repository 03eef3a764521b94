//! 投递全流程测试 - 入队 → 排空 → 重试 → 终态
//!
//! 用桩投递器驱动 run_pass，验证退避调度、终态失败与手动重试

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use tracking_server::delivery::{
    run_pass, AttemptOutcome, Deliver, DeliveryQueue, DeliveryStatus, DeliveryTarget, DueAttempt,
    FailureReason,
};
use tracking_server::utils::AppError;

use shared::event::{EventEnvelope, EventType};
use shared::util::now_millis;

/// 桩投递器：命中 fail_urls 的端点返回 502，其余成功
struct StubDeliverer {
    fail_urls: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl StubDeliverer {
    fn new(fail_urls: &[&str]) -> Self {
        Self {
            fail_urls: fail_urls.iter().map(|s| s.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Deliver for StubDeliverer {
    async fn deliver(&self, attempt: &DueAttempt) -> AttemptOutcome {
        self.calls.lock().unwrap().push(attempt.target.url.clone());
        if self.fail_urls.contains(&attempt.target.url) {
            AttemptOutcome::Failed(FailureReason::RemoteError(502))
        } else {
            AttemptOutcome::Delivered("202 Accepted".into())
        }
    }
}

fn envelope() -> EventEnvelope {
    EventEnvelope::build(
        EventType::PackageStatusChanged,
        json!({"tracking_number": "AWB-9001", "status": 2}),
        json!({}),
        b"integration-secret",
    )
}

fn queue() -> DeliveryQueue {
    DeliveryQueue::new(3, vec![50, 150, 400]).expect("valid schedule")
}

#[tokio::test]
async fn mixed_endpoints_settle_independently() {
    let queue = queue();
    let stub = StubDeliverer::new(&["http://hooks.test/bad"]);

    let id = queue
        .enqueue(
            envelope(),
            vec![
                DeliveryTarget::webhook("http://hooks.test/ok"),
                DeliveryTarget::webhook("http://hooks.test/bad"),
            ],
            None,
            None,
        )
        .expect("enqueue");

    run_pass(&queue, &stub).await;

    let item = queue.get(&id).expect("item");
    assert_eq!(item.endpoints[0].status, DeliveryStatus::Success);
    assert_eq!(item.endpoints[1].status, DeliveryStatus::Retrying);
    assert_eq!(item.endpoints[1].attempts, 1);
    assert!(item.endpoints[1].next_retry.is_some());
}

#[tokio::test]
async fn endpoint_goes_terminal_after_max_attempts() {
    let queue = queue();
    let stub = StubDeliverer::new(&["http://hooks.test/down"]);

    let id = queue
        .enqueue(
            envelope(),
            vec![DeliveryTarget::webhook("http://hooks.test/down")],
            None,
            None,
        )
        .expect("enqueue");

    // 逐次快进到下一个重试时间，直到尝试次数耗尽
    run_pass(&queue, &stub).await;
    for _ in 0..2 {
        let next = queue.get(&id).expect("item").endpoints[0]
            .next_retry
            .expect("scheduled");
        for attempt in queue.drain_due(next) {
            match stub.deliver(&attempt).await {
                AttemptOutcome::Delivered(summary) => {
                    queue.apply_success(&attempt.item_id, attempt.endpoint_index, summary)
                }
                AttemptOutcome::Failed(reason) => queue.apply_failure(
                    &attempt.item_id,
                    attempt.endpoint_index,
                    reason.to_string(),
                    now_millis(),
                ),
            }
        }
    }

    let item = queue.get(&id).expect("item");
    assert_eq!(item.endpoints[0].status, DeliveryStatus::Failed);
    assert_eq!(item.endpoints[0].attempts, 3);
    assert_eq!(stub.call_count(), 3);

    // 终态端点不再被排空
    assert!(queue.drain_due(now_millis() + 60_000).is_empty());
}

#[tokio::test]
async fn manual_retry_revives_a_terminal_endpoint() {
    let queue = DeliveryQueue::new(1, vec![50]).expect("schedule");
    let stub = StubDeliverer::new(&["http://hooks.test/flaky"]);

    let id = queue
        .enqueue(
            envelope(),
            vec![DeliveryTarget::webhook("http://hooks.test/flaky")],
            None,
            None,
        )
        .expect("enqueue");

    run_pass(&queue, &stub).await;
    assert_eq!(
        queue.get(&id).expect("item").endpoints[0].status,
        DeliveryStatus::Failed
    );

    // 次数已达上限，重试被拒
    let err = queue.retry(&id, None).expect_err("at ceiling");
    assert!(matches!(err, AppError::BusinessRule(_)));
    assert_eq!(queue.get(&id).expect("item").endpoints[0].attempts, 1);
}

#[tokio::test]
async fn manual_retry_skips_the_backoff_wait() {
    let queue = queue();
    let stub = StubDeliverer::new(&["http://hooks.test/flaky"]);

    let id = queue
        .enqueue(
            envelope(),
            vec![DeliveryTarget::webhook("http://hooks.test/flaky")],
            None,
            None,
        )
        .expect("enqueue");

    run_pass(&queue, &stub).await;
    let scheduled = queue.get(&id).expect("item").endpoints[0]
        .next_retry
        .expect("scheduled");
    assert!(scheduled > now_millis());

    let reset = queue.retry(&id, None).expect("retry");
    assert_eq!(reset, 1);

    // 退避等待被跳过：立刻可排空，且尝试次数保留
    let ok = StubDeliverer::new(&[]);
    run_pass(&queue, &ok).await;
    let item = queue.get(&id).expect("item");
    assert_eq!(item.endpoints[0].status, DeliveryStatus::Success);
    assert_eq!(item.endpoints[0].attempts, 2);
}

#[tokio::test]
async fn fully_settled_item_is_dropped_on_the_next_pass() {
    let queue = queue();
    let stub = StubDeliverer::new(&[]);

    let id = queue
        .enqueue(
            envelope(),
            vec![DeliveryTarget::webhook("http://hooks.test/ok")],
            None,
            None,
        )
        .expect("enqueue");

    run_pass(&queue, &stub).await;
    assert!(queue.get(&id).is_some());

    // 下一次排空做惰性回收
    run_pass(&queue, &stub).await;
    assert!(queue.get(&id).is_none());
    assert_eq!(queue.depth(), 0);
}

#[tokio::test]
async fn cancel_stops_future_attempts() {
    let queue = queue();
    let stub = StubDeliverer::new(&["http://hooks.test/bad"]);

    let id = queue
        .enqueue(
            envelope(),
            vec![DeliveryTarget::webhook("http://hooks.test/bad")],
            None,
            None,
        )
        .expect("enqueue");

    run_pass(&queue, &stub).await;
    queue.cancel(&id).expect("cancel");

    assert!(queue.get(&id).is_none());
    assert!(queue.drain_due(now_millis() + 60_000).is_empty());
    assert_eq!(stub.call_count(), 1);
}

#[tokio::test]
async fn envelope_signature_survives_the_queue() {
    let queue = queue();
    let stub = StubDeliverer::new(&[]);

    let env = envelope();
    assert!(env.verify(b"integration-secret"));

    let id = queue
        .enqueue(
            env,
            vec![DeliveryTarget::webhook("http://hooks.test/ok")],
            None,
            None,
        )
        .expect("enqueue");

    let item = queue.get(&id).expect("item");
    assert!(item.envelope.verify(b"integration-secret"));
    assert!(!item.envelope.verify(b"wrong-secret"));

    run_pass(&queue, &stub).await;
}
