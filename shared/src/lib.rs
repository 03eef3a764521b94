//! Shared types for the Waybill tracking platform
//!
//! Wire and domain types used by both the tracking server and clients:
//! closed status sets, partner field-named records, the signed event
//! envelope, and id/time utilities.

pub mod event;
pub mod partner;
pub mod status;
pub mod util;

// Re-exports
pub use event::{EventEnvelope, EventType};
pub use serde::{Deserialize, Serialize};
pub use status::{ManifestStatus, PackageStatus};
