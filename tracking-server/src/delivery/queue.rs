//! 投递队列 — in-memory at-least-once delivery queue
//!
//! Each queued event fans out to one [`EndpointDelivery`] per target.
//! Endpoint state machine: `pending → processing → {success | failed}`,
//! with `failed → retrying → processing` looping until the attempt
//! ceiling, after which `failed` is terminal.
//!
//! The queue itself never performs I/O: [`DeliveryQueue::drain_due`]
//! claims due endpoints and hands them to the worker, which reports
//! back through [`DeliveryQueue::apply_success`] /
//! [`DeliveryQueue::apply_failure`]. Claiming happens under the map
//! entry lock, so no two drain passes can pick up the same endpoint.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::event::EventEnvelope;
use shared::util::now_millis;
use uuid::Uuid;

use crate::utils::{AppError, AppResult};

/// Per-endpoint delivery state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Processing,
    Retrying,
    Success,
    Failed,
}

/// What kind of recipient an endpoint is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    /// Generic webhook callback, receives the signed envelope
    Webhook,
    /// Partner freight system, receives the partner-shaped payload
    Partner,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryTarget {
    pub url: String,
    pub kind: EndpointKind,
}

impl DeliveryTarget {
    pub fn webhook(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: EndpointKind::Webhook,
        }
    }

    pub fn partner(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: EndpointKind::Partner,
        }
    }
}

/// Delivery state for one (item, endpoint) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointDelivery {
    pub target: DeliveryTarget,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub last_attempt: Option<i64>,
    pub next_retry: Option<i64>,
    /// Response summary from the last successful attempt
    pub response: Option<String>,
    /// Error from the last failed attempt
    pub error: Option<String>,
}

impl EndpointDelivery {
    fn new(target: DeliveryTarget) -> Self {
        Self {
            target,
            status: DeliveryStatus::Pending,
            attempts: 0,
            last_attempt: None,
            next_retry: None,
            response: None,
            error: None,
        }
    }

    /// Terminal failure: the attempt ceiling was reached
    pub fn is_exhausted(&self, max_attempts: u32) -> bool {
        self.status == DeliveryStatus::Failed && self.attempts >= max_attempts
    }

    /// Settled endpoints need no further work
    fn is_settled(&self, max_attempts: u32) -> bool {
        self.status == DeliveryStatus::Success || self.is_exhausted(max_attempts)
    }

    fn is_due(&self, now: i64) -> bool {
        match self.status {
            DeliveryStatus::Pending => true,
            DeliveryStatus::Failed | DeliveryStatus::Retrying => {
                self.next_retry.is_some_and(|t| now >= t)
            }
            DeliveryStatus::Processing | DeliveryStatus::Success => false,
        }
    }
}

/// One queued event with its fan-out endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub envelope: EventEnvelope,
    /// Partner-shaped payload, present when any endpoint is [`EndpointKind::Partner`]
    pub partner_payload: Option<Value>,
    /// Partner API path the payload is POSTed to (e.g. "/packages")
    pub partner_path: Option<String>,
    pub endpoints: Vec<EndpointDelivery>,
    /// Higher values are claimed first within a drain pass
    pub priority: u8,
    pub queued_at: i64,
}

/// A claimed delivery attempt, ready for the worker to execute.
///
/// Produced by [`DeliveryQueue::drain_due`]; the corresponding endpoint
/// is already marked `processing` with `attempts` incremented.
#[derive(Debug, Clone)]
pub struct DueAttempt {
    pub item_id: String,
    pub endpoint_index: usize,
    pub target: DeliveryTarget,
    pub envelope: EventEnvelope,
    pub partner_payload: Option<Value>,
    pub partner_path: Option<String>,
}

/// In-memory delivery queue with bounded exponential backoff.
///
/// 不持久化 — a restart drops undelivered items; recipients reconcile
/// from current entity state on reconnect.
pub struct DeliveryQueue {
    items: DashMap<String, QueueItem>,
    max_attempts: u32,
    /// Backoff delays in ms, indexed by `attempts - 1`; strictly increasing
    backoff_ms: Vec<u64>,
}

impl DeliveryQueue {
    /// `backoff_ms` must be non-empty and strictly increasing.
    pub fn new(max_attempts: u32, backoff_ms: Vec<u64>) -> AppResult<Self> {
        if max_attempts == 0 {
            return Err(AppError::validation("max_attempts must be at least 1"));
        }
        if backoff_ms.is_empty() {
            return Err(AppError::validation("backoff schedule must not be empty"));
        }
        if !backoff_ms.windows(2).all(|w| w[0] < w[1]) {
            return Err(AppError::validation(
                "backoff schedule must be strictly increasing",
            ));
        }
        Ok(Self {
            items: DashMap::new(),
            max_attempts,
            backoff_ms,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Queue an envelope at the default priority. Returns the item id.
    pub fn enqueue(
        &self,
        envelope: EventEnvelope,
        targets: Vec<DeliveryTarget>,
        partner_payload: Option<Value>,
        partner_path: Option<String>,
    ) -> AppResult<String> {
        self.enqueue_with_priority(envelope, targets, partner_payload, partner_path, 0)
    }

    /// Queue an envelope for delivery to every target. Returns the item id.
    pub fn enqueue_with_priority(
        &self,
        envelope: EventEnvelope,
        targets: Vec<DeliveryTarget>,
        partner_payload: Option<Value>,
        partner_path: Option<String>,
        priority: u8,
    ) -> AppResult<String> {
        if targets.is_empty() {
            return Err(AppError::validation("delivery requires at least one target"));
        }
        let id = Uuid::new_v4().to_string();
        let item = QueueItem {
            id: id.clone(),
            envelope,
            partner_payload,
            partner_path,
            endpoints: targets.into_iter().map(EndpointDelivery::new).collect(),
            priority,
            queued_at: now_millis(),
        };
        tracing::debug!(
            item_id = %id,
            endpoints = item.endpoints.len(),
            event = item.envelope.event_type.as_str(),
            "delivery enqueued"
        );
        self.items.insert(id.clone(), item);
        Ok(id)
    }

    /// Claim every endpoint due at `now`: mark it `processing`, bump
    /// `attempts`, stamp `last_attempt`, and return the work units.
    ///
    /// Also runs lazy GC: items with every endpoint settled are removed.
    pub fn drain_due(&self, now: i64) -> Vec<DueAttempt> {
        let mut due: Vec<(u8, DueAttempt)> = Vec::new();
        let mut removable = Vec::new();

        for mut entry in self.items.iter_mut() {
            let item = entry.value_mut();
            if item
                .endpoints
                .iter()
                .all(|ep| ep.is_settled(self.max_attempts))
            {
                removable.push(item.id.clone());
                continue;
            }
            for (index, ep) in item.endpoints.iter_mut().enumerate() {
                if ep.is_exhausted(self.max_attempts) || !ep.is_due(now) {
                    continue;
                }
                ep.status = DeliveryStatus::Processing;
                ep.attempts += 1;
                ep.last_attempt = Some(now);
                ep.next_retry = None;
                due.push((
                    item.priority,
                    DueAttempt {
                        item_id: item.id.clone(),
                        endpoint_index: index,
                        target: ep.target.clone(),
                        envelope: item.envelope.clone(),
                        partner_payload: item.partner_payload.clone(),
                        partner_path: item.partner_path.clone(),
                    },
                ));
            }
        }

        for id in removable {
            self.items.remove(&id);
            tracing::debug!(item_id = %id, "delivery item settled, removed");
        }
        // Higher-priority items are attempted first within the pass
        due.sort_by(|a, b| b.0.cmp(&a.0));
        due.into_iter().map(|(_, attempt)| attempt).collect()
    }

    /// Record a 2xx outcome for a claimed attempt.
    pub fn apply_success(&self, item_id: &str, endpoint_index: usize, response: String) {
        if let Some(mut entry) = self.items.get_mut(item_id)
            && let Some(ep) = entry.endpoints.get_mut(endpoint_index)
        {
            ep.status = DeliveryStatus::Success;
            ep.response = Some(response);
            ep.error = None;
        }
    }

    /// Record a failed outcome for a claimed attempt.
    ///
    /// Below the ceiling the endpoint moves to `retrying` with
    /// `next_retry = now + backoff[attempts-1]`; at the ceiling it
    /// becomes terminally `failed`.
    pub fn apply_failure(&self, item_id: &str, endpoint_index: usize, error: String, now: i64) {
        let Some(mut entry) = self.items.get_mut(item_id) else {
            return;
        };
        let Some(ep) = entry.endpoints.get_mut(endpoint_index) else {
            return;
        };
        ep.error = Some(error);
        if ep.attempts >= self.max_attempts {
            ep.status = DeliveryStatus::Failed;
            ep.next_retry = None;
            tracing::warn!(
                item_id,
                url = %ep.target.url,
                attempts = ep.attempts,
                "delivery exhausted, endpoint failed terminally"
            );
        } else {
            let index = (ep.attempts as usize - 1).min(self.backoff_ms.len() - 1);
            ep.status = DeliveryStatus::Retrying;
            ep.next_retry = Some(now + self.backoff_ms[index] as i64);
        }
    }

    /// Operator-triggered retry of failed endpoints.
    ///
    /// Resets matching `failed` and `retrying` endpoints to `pending`
    /// and clears `next_retry` (skipping the scheduled backoff wait),
    /// without resetting `attempts`. Endpoints at the attempt ceiling
    /// are refused. Returns how many endpoints were reset.
    pub fn retry(&self, item_id: &str, endpoint_url: Option<&str>) -> AppResult<usize> {
        let mut entry = self
            .items
            .get_mut(item_id)
            .ok_or_else(|| AppError::not_found(format!("delivery item not found: {item_id}")))?;

        let mut reset = 0;
        let mut refused = 0;
        for ep in entry.endpoints.iter_mut() {
            if !matches!(ep.status, DeliveryStatus::Failed | DeliveryStatus::Retrying) {
                continue;
            }
            if let Some(url) = endpoint_url
                && ep.target.url != url
            {
                continue;
            }
            if ep.attempts >= self.max_attempts {
                refused += 1;
                continue;
            }
            ep.status = DeliveryStatus::Pending;
            ep.next_retry = None;
            reset += 1;
        }

        if reset == 0 && refused > 0 {
            return Err(AppError::business_rule(
                "endpoint has reached the retry ceiling",
            ));
        }
        if reset == 0 {
            return Err(AppError::not_found("no failed endpoint matched"));
        }
        Ok(reset)
    }

    /// Remove an item outright, regardless of endpoint states.
    pub fn cancel(&self, item_id: &str) -> AppResult<()> {
        self.items
            .remove(item_id)
            .map(|_| ())
            .ok_or_else(|| AppError::not_found(format!("delivery item not found: {item_id}")))
    }

    /// Number of items still held (settled items linger until the next drain)
    pub fn depth(&self) -> usize {
        self.items.len()
    }

    /// Whether any endpoint still has work ahead of it
    pub fn has_unsettled(&self) -> bool {
        self.items.iter().any(|entry| {
            entry
                .endpoints
                .iter()
                .any(|ep| !ep.is_settled(self.max_attempts))
        })
    }

    pub fn get(&self, item_id: &str) -> Option<QueueItem> {
        self.items.get(item_id).map(|entry| entry.value().clone())
    }

    pub fn snapshot(&self) -> Vec<QueueItem> {
        let mut items: Vec<QueueItem> =
            self.items.iter().map(|entry| entry.value().clone()).collect();
        items.sort_by_key(|item| (std::cmp::Reverse(item.priority), item.queued_at));
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::event::EventType;

    fn envelope() -> EventEnvelope {
        EventEnvelope::build(
            EventType::PackageStatusChanged,
            json!({"tracking_number": "AWB-1"}),
            json!({}),
            b"test-secret",
        )
    }

    fn queue() -> DeliveryQueue {
        DeliveryQueue::new(3, vec![100, 200, 400]).unwrap()
    }

    #[test]
    fn rejects_non_increasing_backoff() {
        assert!(DeliveryQueue::new(3, vec![100, 100, 400]).is_err());
        assert!(DeliveryQueue::new(3, vec![400, 200]).is_err());
        assert!(DeliveryQueue::new(3, vec![]).is_err());
        assert!(DeliveryQueue::new(0, vec![100]).is_err());
    }

    #[test]
    fn enqueue_fans_out_per_target() {
        let q = queue();
        let id = q
            .enqueue(
                envelope(),
                vec![
                    DeliveryTarget::webhook("http://a.test/hook"),
                    DeliveryTarget::webhook("http://b.test/hook"),
                ],
                None,
                None,
            )
            .unwrap();
        let item = q.get(&id).unwrap();
        assert_eq!(item.endpoints.len(), 2);
        assert!(
            item.endpoints
                .iter()
                .all(|ep| ep.status == DeliveryStatus::Pending && ep.attempts == 0)
        );
    }

    #[test]
    fn priority_orders_claims_and_snapshot() {
        let q = queue();
        let low = q
            .enqueue(
                envelope(),
                vec![DeliveryTarget::webhook("http://low.test/hook")],
                None,
                None,
            )
            .unwrap();
        let high = q
            .enqueue_with_priority(
                envelope(),
                vec![DeliveryTarget::webhook("http://high.test/hook")],
                None,
                None,
                1,
            )
            .unwrap();

        assert_eq!(q.get(&low).unwrap().priority, 0);
        assert_eq!(q.get(&high).unwrap().priority, 1);

        // Operator snapshot lists the urgent item first
        let snapshot = q.snapshot();
        assert_eq!(snapshot[0].id, high);
        assert_eq!(snapshot[1].id, low);

        // The urgent item is also attempted first within a pass
        let due = q.drain_due(0);
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].item_id, high);
        assert_eq!(due[1].item_id, low);
    }

    #[test]
    fn drain_claims_pending_and_increments_attempts() {
        let q = queue();
        let id = q
            .enqueue(
                envelope(),
                vec![DeliveryTarget::webhook("http://a.test/hook")],
                None,
                None,
            )
            .unwrap();

        let due = q.drain_due(1_000);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].item_id, id);

        let item = q.get(&id).unwrap();
        assert_eq!(item.endpoints[0].status, DeliveryStatus::Processing);
        assert_eq!(item.endpoints[0].attempts, 1);
        assert_eq!(item.endpoints[0].last_attempt, Some(1_000));

        // Processing endpoints are not claimed twice
        assert!(q.drain_due(1_001).is_empty());
    }

    #[test]
    fn failure_schedules_strictly_increasing_retries() {
        let q = queue();
        let id = q
            .enqueue(
                envelope(),
                vec![DeliveryTarget::webhook("http://a.test/hook")],
                None,
                None,
            )
            .unwrap();

        let mut now = 0;
        let mut previous_gap = 0;
        for attempt in 1..3 {
            let due = q.drain_due(now);
            assert_eq!(due.len(), 1, "attempt {attempt} should be claimed");
            q.apply_failure(&id, 0, "HTTP 500".into(), now);

            let ep = &q.get(&id).unwrap().endpoints[0];
            assert_eq!(ep.status, DeliveryStatus::Retrying);
            let next = ep.next_retry.unwrap();
            let gap = next - now;
            assert!(gap > previous_gap, "backoff must grow between attempts");
            previous_gap = gap;

            // Not due before the scheduled time
            assert!(q.drain_due(next - 1).is_empty());
            now = next;
        }
    }

    #[test]
    fn terminal_failure_at_ceiling_ignored_by_drain() {
        let q = queue();
        let id = q
            .enqueue(
                envelope(),
                vec![DeliveryTarget::webhook("http://a.test/hook")],
                None,
                None,
            )
            .unwrap();

        let mut now = 0;
        for _ in 0..3 {
            let due = q.drain_due(now);
            assert_eq!(due.len(), 1);
            q.apply_failure(&id, 0, "HTTP 500".into(), now);
            now = q.get(&id).unwrap().endpoints[0]
                .next_retry
                .unwrap_or(now + 1);
        }

        let ep = &q.get(&id).unwrap().endpoints[0];
        assert_eq!(ep.status, DeliveryStatus::Failed);
        assert_eq!(ep.attempts, 3);
        assert!(ep.next_retry.is_none());
        assert!(ep.is_exhausted(3));

        // Drains far in the future never pick it up again
        assert!(q.drain_due(now + 1_000_000).is_empty());
    }

    #[test]
    fn one_endpoint_failure_never_blocks_siblings() {
        let q = queue();
        let id = q
            .enqueue(
                envelope(),
                vec![
                    DeliveryTarget::webhook("http://good.test/hook"),
                    DeliveryTarget::webhook("http://bad.test/hook"),
                ],
                None,
                None,
            )
            .unwrap();

        let due = q.drain_due(0);
        assert_eq!(due.len(), 2);
        q.apply_success(&id, 0, "200 OK".into());
        q.apply_failure(&id, 1, "timeout".into(), 0);

        let item = q.get(&id).unwrap();
        assert_eq!(item.endpoints[0].status, DeliveryStatus::Success);
        assert_eq!(item.endpoints[1].status, DeliveryStatus::Retrying);

        // Only the failing endpoint is re-claimed
        let next = item.endpoints[1].next_retry.unwrap();
        let due = q.drain_due(next);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].endpoint_index, 1);
    }

    #[test]
    fn settled_items_removed_on_next_drain() {
        let q = queue();
        let id = q
            .enqueue(
                envelope(),
                vec![DeliveryTarget::webhook("http://a.test/hook")],
                None,
                None,
            )
            .unwrap();

        q.drain_due(0);
        q.apply_success(&id, 0, "200 OK".into());
        assert_eq!(q.depth(), 1);

        // GC is lazy: the settled item goes away on the following pass
        assert!(q.drain_due(1).is_empty());
        assert_eq!(q.depth(), 0);
        assert!(q.get(&id).is_none());
    }

    #[test]
    fn manual_retry_resets_failed_but_keeps_attempts() {
        let q = DeliveryQueue::new(5, vec![100, 200, 400]).unwrap();
        let id = q
            .enqueue(
                envelope(),
                vec![DeliveryTarget::webhook("http://a.test/hook")],
                None,
                None,
            )
            .unwrap();

        // Two failed attempts leave the endpoint scheduled for retry
        q.drain_due(0);
        q.apply_failure(&id, 0, "HTTP 500".into(), 0);
        let next = q.get(&id).unwrap().endpoints[0].next_retry.unwrap();
        q.drain_due(next);
        q.apply_failure(&id, 0, "HTTP 500".into(), next);

        // Manual retry of a scheduled-retry endpoint skips the backoff wait
        let reset = q.retry(&id, None).unwrap();
        assert_eq!(reset, 1);
        let ep = &q.get(&id).unwrap().endpoints[0];
        assert_eq!(ep.status, DeliveryStatus::Pending);
        assert_eq!(ep.attempts, 2, "manual retry must not reset attempts");
        assert!(ep.next_retry.is_none());
    }

    #[test]
    fn manual_retry_refused_at_ceiling() {
        let q = queue();
        let id = q
            .enqueue(
                envelope(),
                vec![DeliveryTarget::webhook("http://a.test/hook")],
                None,
                None,
            )
            .unwrap();

        let mut now = 0;
        for _ in 0..3 {
            q.drain_due(now);
            q.apply_failure(&id, 0, "HTTP 500".into(), now);
            now = q.get(&id).unwrap().endpoints[0]
                .next_retry
                .unwrap_or(now + 1);
        }
        assert!(q.get(&id).unwrap().endpoints[0].is_exhausted(3));

        let err = q.retry(&id, None).unwrap_err();
        assert!(matches!(err, AppError::BusinessRule(_)));
    }

    #[test]
    fn cancel_removes_item() {
        let q = queue();
        let id = q
            .enqueue(
                envelope(),
                vec![DeliveryTarget::webhook("http://a.test/hook")],
                None,
                None,
            )
            .unwrap();
        q.cancel(&id).unwrap();
        assert!(q.get(&id).is_none());
        assert!(q.cancel(&id).is_err());
    }

    #[test]
    fn retry_filters_by_endpoint_url() {
        let q = queue();
        let id = q
            .enqueue(
                envelope(),
                vec![
                    DeliveryTarget::webhook("http://a.test/hook"),
                    DeliveryTarget::webhook("http://b.test/hook"),
                ],
                None,
                None,
            )
            .unwrap();

        q.drain_due(0);
        q.apply_failure(&id, 0, "HTTP 500".into(), 0);
        q.apply_failure(&id, 1, "HTTP 500".into(), 0);

        let reset = q.retry(&id, Some("http://b.test/hook")).unwrap();
        assert_eq!(reset, 1);
        let item = q.get(&id).unwrap();
        assert_eq!(item.endpoints[0].status, DeliveryStatus::Retrying);
        assert_eq!(item.endpoints[1].status, DeliveryStatus::Pending);
    }
}
