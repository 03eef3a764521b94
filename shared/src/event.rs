//! Signed event envelope
//!
//! Every outbound domain event is wrapped in an [`EventEnvelope`]: a typed,
//! timestamped payload with an HMAC-SHA256 signature over the canonical
//! serialization of every field except `signature`. The envelope `id` is
//! globally unique and is what consumers de-duplicate on.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::util::now_millis;

/// Domain event types carried by the envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PackageCreated,
    PackageUpdated,
    PackageStatusChanged,
    PackageDeleted,
    ManifestCreated,
    ManifestUpdated,
    ManifestStatusChanged,
}

impl EventType {
    /// Dotted wire name, used in `X-Webhook-Event` and envelope JSON
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PackageCreated => "package.created",
            EventType::PackageUpdated => "package.updated",
            EventType::PackageStatusChanged => "package.status_changed",
            EventType::PackageDeleted => "package.deleted",
            EventType::ManifestCreated => "manifest.created",
            EventType::ManifestUpdated => "manifest.updated",
            EventType::ManifestStatusChanged => "manifest.status_changed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signed, typed, timestamped description of one domain event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Globally unique event id (consumer-side de-duplication key)
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Unix millis at build time
    pub timestamp: i64,
    pub data: Value,
    pub metadata: Value,
    /// Hex HMAC-SHA256 over the canonical bytes of all other fields
    pub signature: String,
}

impl EventEnvelope {
    /// Build a signed envelope with a fresh id and `timestamp = now`
    pub fn build(event_type: EventType, data: Value, metadata: Value, secret: &[u8]) -> Self {
        let mut envelope = Self {
            id: Uuid::new_v4().to_string(),
            event_type,
            timestamp: now_millis(),
            data,
            metadata,
            signature: String::new(),
        };
        envelope.signature = sign(&envelope, secret);
        envelope
    }

    /// Re-verify this envelope's own signature
    pub fn verify(&self, secret: &[u8]) -> bool {
        verify(self, &self.signature, secret)
    }
}

/// Canonical bytes of an envelope, excluding `signature`
///
/// Keys are BTreeMap-ordered so both sides serialize identically
/// regardless of field order in the source JSON.
fn canonical_bytes(envelope: &EventEnvelope) -> Vec<u8> {
    let mut fields: BTreeMap<&str, Value> = BTreeMap::new();
    fields.insert("id", Value::String(envelope.id.clone()));
    fields.insert(
        "type",
        Value::String(envelope.event_type.as_str().to_string()),
    );
    fields.insert("timestamp", Value::from(envelope.timestamp));
    fields.insert("data", envelope.data.clone());
    fields.insert("metadata", envelope.metadata.clone());
    // BTreeMap serializes in key order; this cannot fail for these values
    serde_json::to_vec(&fields).unwrap_or_default()
}

/// Compute the hex HMAC-SHA256 signature for an envelope
pub fn sign(envelope: &EventEnvelope, secret: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret)
        .unwrap_or_else(|_| Hmac::<Sha256>::new_from_slice(b"default").expect("hmac"));
    mac.update(&canonical_bytes(envelope));
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a signature against an envelope.
///
/// Comparison goes through `Mac::verify_slice`, which is constant-time —
/// never compare the hex strings directly.
pub fn verify(envelope: &EventEnvelope, signature_hex: &str, secret: &[u8]) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };

    let mut mac = Hmac::<Sha256>::new_from_slice(secret)
        .unwrap_or_else(|_| Hmac::<Sha256>::new_from_slice(b"default").expect("hmac"));
    mac.update(&canonical_bytes(envelope));
    mac.verify_slice(&signature).is_ok()
}
