//! 实时推送 — best-effort realtime publisher
//!
//! Channel-keyed broadcast fan-out for connected subscribers (SSE /
//! websocket sessions, in-process listeners). Sends are never retried
//! and never block the caller; the delivery queue is the durable path.

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;

/// Buffered messages per channel before slow subscribers start lagging
const CHANNEL_CAPACITY: usize = 64;

/// Well-known channel names
pub const CHANNEL_PACKAGES: &str = "packages";
pub const CHANNEL_MANIFESTS: &str = "manifests";
pub const CHANNEL_NOTIFICATIONS: &str = "notifications";

/// Per-package channel, for subscribers tracking a single parcel
pub fn package_channel(tracking_number: &str) -> String {
    format!("package_{tracking_number}")
}

#[derive(Default)]
pub struct RealtimePublisher {
    channels: DashMap<String, broadcast::Sender<Value>>,
}

impl RealtimePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send `payload` to every live subscriber on `channel`.
    ///
    /// A channel with no subscribers swallows the payload silently;
    /// that is the expected idle state, not an error.
    pub fn publish(&self, channel: &str, payload: Value) {
        let Some(sender) = self.channels.get(channel) else {
            return;
        };
        match sender.send(payload) {
            Ok(receivers) => {
                tracing::trace!(channel, receivers, "realtime publish");
            }
            Err(_) => {
                // All subscribers dropped since the channel was created
                tracing::trace!(channel, "realtime publish with no subscribers");
            }
        }
    }

    /// Subscribe to a channel, creating it on first use.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<Value> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}
