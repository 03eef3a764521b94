//! PartnerClient — HTTP client for pushing records to the partner system

use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;

use crate::utils::AppError;

/// HTTP client for the partner sync API
pub struct PartnerClient {
    client: Client,
    base_url: String,
    api_token: String,
}

impl PartnerClient {
    /// Create a new PartnerClient.
    ///
    /// The `base_url` should be the base URL of the partner API
    /// (e.g., "https://partner.example.com/api").
    pub fn new(base_url: String, api_token: String, timeout_ms: u64) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_token,
        })
    }

    /// POST a JSON payload to a partner path, with Bearer auth.
    ///
    /// Low-level entry point used by the delivery worker; callers classify
    /// the response themselves.
    pub async fn post_json(&self, path: &str, payload: &Value) -> reqwest::Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        self.client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(payload)
            .send()
            .await
    }
}
