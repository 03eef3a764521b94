//! Delivery execution — the single seam where the queue touches the network

use async_trait::async_trait;
use reqwest::Client;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::delivery::queue::{DueAttempt, EndpointKind};
use crate::partner::client::PartnerClient;
use crate::utils::AppError;

/// Why a delivery attempt failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// 4xx from the recipient
    ClientError(u16),
    /// 5xx from the recipient
    RemoteError(u16),
    Timeout,
    Network(String),
    /// Item was queued for a partner endpoint without a partner payload
    Misconfigured(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ClientError(status) => write!(f, "HTTP {status} (client error)"),
            FailureReason::RemoteError(status) => write!(f, "HTTP {status} (remote error)"),
            FailureReason::Timeout => write!(f, "request timed out"),
            FailureReason::Network(detail) => write!(f, "network error: {detail}"),
            FailureReason::Misconfigured(detail) => write!(f, "misconfigured: {detail}"),
        }
    }
}

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// 2xx; carries a short response summary for the queue record
    Delivered(String),
    Failed(FailureReason),
}

/// Executes a claimed delivery attempt.
///
/// Trait seam so the worker can be driven by a stub in tests.
#[async_trait]
pub trait Deliver: Send + Sync {
    async fn deliver(&self, attempt: &DueAttempt) -> AttemptOutcome;
}

/// Production deliverer: webhooks get the signed envelope, partner
/// endpoints get the partner-shaped payload through [`PartnerClient`].
pub struct HttpDeliverer {
    client: Client,
    partner: Arc<PartnerClient>,
}

impl HttpDeliverer {
    pub fn new(partner: Arc<PartnerClient>, timeout_ms: u64) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, partner })
    }

    async fn deliver_webhook(&self, attempt: &DueAttempt) -> AttemptOutcome {
        let envelope = &attempt.envelope;
        let result = self
            .client
            .post(&attempt.target.url)
            .header("X-Webhook-Signature", &envelope.signature)
            .header("X-Webhook-Event", envelope.event_type.as_str())
            .header("X-Webhook-ID", &envelope.id)
            .header("X-Webhook-Timestamp", envelope.timestamp.to_string())
            .json(envelope)
            .send()
            .await;
        classify(result)
    }

    async fn deliver_partner(&self, attempt: &DueAttempt) -> AttemptOutcome {
        let (Some(payload), Some(path)) = (&attempt.partner_payload, &attempt.partner_path) else {
            return AttemptOutcome::Failed(FailureReason::Misconfigured(
                "partner endpoint queued without partner payload".into(),
            ));
        };
        classify(self.partner.post_json(path, payload).await)
    }
}

#[async_trait]
impl Deliver for HttpDeliverer {
    async fn deliver(&self, attempt: &DueAttempt) -> AttemptOutcome {
        match attempt.target.kind {
            EndpointKind::Webhook => self.deliver_webhook(attempt).await,
            EndpointKind::Partner => self.deliver_partner(attempt).await,
        }
    }
}

fn classify(result: reqwest::Result<reqwest::Response>) -> AttemptOutcome {
    match result {
        Ok(resp) => {
            let status = resp.status();
            if status.is_success() {
                AttemptOutcome::Delivered(format!("HTTP {}", status.as_u16()))
            } else if status.is_client_error() {
                AttemptOutcome::Failed(FailureReason::ClientError(status.as_u16()))
            } else {
                AttemptOutcome::Failed(FailureReason::RemoteError(status.as_u16()))
            }
        }
        Err(err) => {
            if err.is_timeout() {
                AttemptOutcome::Failed(FailureReason::Timeout)
            } else {
                AttemptOutcome::Failed(FailureReason::Network(err.to_string()))
            }
        }
    }
}
