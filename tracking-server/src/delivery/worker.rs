//! DeliveryWorker — background worker that drains the delivery queue
//!
//! Runs as a recurring timer pass (plus opportunistic nudges after
//! enqueue) rather than a dedicated pool. Each pass claims every due
//! endpoint, attempts delivery, and reports outcomes back to the
//! queue. One endpoint's failure never blocks its siblings.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::delivery::deliverer::{AttemptOutcome, Deliver};
use crate::delivery::queue::DeliveryQueue;
use shared::util::now_millis;

pub struct DeliveryWorker {
    queue: Arc<DeliveryQueue>,
    deliverer: Arc<dyn Deliver>,
    nudge_rx: mpsc::Receiver<()>,
    interval_ms: u64,
    shutdown: CancellationToken,
}

impl DeliveryWorker {
    pub fn new(
        queue: Arc<DeliveryQueue>,
        deliverer: Arc<dyn Deliver>,
        nudge_rx: mpsc::Receiver<()>,
        interval_ms: u64,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            deliverer,
            nudge_rx,
            interval_ms,
            shutdown,
        }
    }

    /// Run the delivery worker
    ///
    /// 1. Periodic drain pass every `interval_ms`
    /// 2. Opportunistic pass when nudged after an enqueue
    /// 3. Final pass on shutdown so in-flight items get one last chance
    pub async fn run(mut self) {
        tracing::info!(interval_ms = self.interval_ms, "DeliveryWorker started");

        let mut interval = tokio::time::interval(Duration::from_millis(self.interval_ms));
        interval.tick().await; // skip immediate tick

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("DeliveryWorker shutting down");
                    if self.queue.has_unsettled() {
                        run_pass(&self.queue, self.deliverer.as_ref()).await;
                    }
                    break;
                }

                _ = interval.tick() => {
                    run_pass(&self.queue, self.deliverer.as_ref()).await;
                }

                nudge = self.nudge_rx.recv() => {
                    match nudge {
                        Some(()) => {
                            // Collapse a burst of nudges into one pass
                            while self.nudge_rx.try_recv().is_ok() {}
                            run_pass(&self.queue, self.deliverer.as_ref()).await;
                        }
                        None => {
                            tracing::info!("Nudge channel closed, DeliveryWorker stopping");
                            break;
                        }
                    }
                }
            }
        }
    }
}

/// One drain pass: claim due endpoints, attempt each, record outcomes.
///
/// Delivery calls run sequentially; each is bounded by the deliverer's
/// own timeout so a dead endpoint cannot stall the pass indefinitely.
pub async fn run_pass(queue: &DeliveryQueue, deliverer: &dyn Deliver) {
    let due = queue.drain_due(now_millis());
    if due.is_empty() {
        return;
    }
    tracing::debug!(attempts = due.len(), "delivery pass starting");

    for attempt in due {
        match deliverer.deliver(&attempt).await {
            AttemptOutcome::Delivered(response) => {
                tracing::debug!(
                    item_id = %attempt.item_id,
                    url = %attempt.target.url,
                    "delivered"
                );
                queue.apply_success(&attempt.item_id, attempt.endpoint_index, response);
            }
            AttemptOutcome::Failed(reason) => {
                tracing::warn!(
                    item_id = %attempt.item_id,
                    url = %attempt.target.url,
                    error = %reason,
                    "delivery attempt failed"
                );
                queue.apply_failure(
                    &attempt.item_id,
                    attempt.endpoint_index,
                    reason.to_string(),
                    now_millis(),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::deliverer::FailureReason;
    use crate::delivery::queue::{DeliveryStatus, DeliveryTarget, DueAttempt};
    use async_trait::async_trait;
    use serde_json::json;
    use shared::event::{EventEnvelope, EventType};
    use std::sync::Mutex;

    /// Scripted deliverer: answers per-URL, records every attempt
    struct StubDeliverer {
        fail_urls: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    impl StubDeliverer {
        fn new(fail_urls: &[&str]) -> Self {
            Self {
                fail_urls: fail_urls.iter().map(|s| s.to_string()).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Deliver for StubDeliverer {
        async fn deliver(&self, attempt: &DueAttempt) -> AttemptOutcome {
            self.calls.lock().unwrap().push(attempt.target.url.clone());
            if self.fail_urls.contains(&attempt.target.url) {
                AttemptOutcome::Failed(FailureReason::RemoteError(500))
            } else {
                AttemptOutcome::Delivered("HTTP 200".into())
            }
        }
    }

    fn envelope() -> EventEnvelope {
        EventEnvelope::build(
            EventType::PackageStatusChanged,
            json!({"tracking_number": "AWB-7"}),
            json!({}),
            b"test-secret",
        )
    }

    #[tokio::test]
    async fn pass_delivers_and_records_success() {
        let queue = DeliveryQueue::new(3, vec![100, 200, 400]).unwrap();
        let id = queue
            .enqueue(
                envelope(),
                vec![DeliveryTarget::webhook("http://ok.test/hook")],
                None,
                None,
            )
            .unwrap();

        let stub = StubDeliverer::new(&[]);
        run_pass(&queue, &stub).await;

        let item = queue.get(&id).unwrap();
        assert_eq!(item.endpoints[0].status, DeliveryStatus::Success);
        assert_eq!(item.endpoints[0].response.as_deref(), Some("HTTP 200"));
        assert_eq!(stub.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_endpoint_does_not_block_sibling() {
        let queue = DeliveryQueue::new(3, vec![100, 200, 400]).unwrap();
        let id = queue
            .enqueue(
                envelope(),
                vec![
                    DeliveryTarget::webhook("http://bad.test/hook"),
                    DeliveryTarget::webhook("http://ok.test/hook"),
                ],
                None,
                None,
            )
            .unwrap();

        let stub = StubDeliverer::new(&["http://bad.test/hook"]);
        run_pass(&queue, &stub).await;

        let item = queue.get(&id).unwrap();
        assert_eq!(item.endpoints[0].status, DeliveryStatus::Retrying);
        assert_eq!(item.endpoints[1].status, DeliveryStatus::Success);
    }

    #[tokio::test]
    async fn always_failing_endpoint_ends_terminal() {
        let queue = DeliveryQueue::new(3, vec![1, 2, 3]).unwrap();
        let id = queue
            .enqueue(
                envelope(),
                vec![DeliveryTarget::webhook("http://bad.test/hook")],
                None,
                None,
            )
            .unwrap();

        let stub = StubDeliverer::new(&["http://bad.test/hook"]);
        for _ in 0..3 {
            run_pass(&queue, &stub).await;
            // Let the scheduled retry come due (millisecond backoffs)
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let item = queue.get(&id).unwrap();
        assert_eq!(item.endpoints[0].status, DeliveryStatus::Failed);
        assert_eq!(item.endpoints[0].attempts, 3);
        assert!(item.endpoints[0].is_exhausted(3));
        assert_eq!(stub.calls.lock().unwrap().len(), 3);

        // Further passes never attempt an exhausted endpoint
        run_pass(&queue, &stub).await;
        assert_eq!(stub.calls.lock().unwrap().len(), 3);
    }
}
