//! Event fan-out helpers shared by the API handlers
//!
//! 每次实体变更后调用：构造信封数据、决定是否回推合作方、挑选实时
//! 频道。合作方入站触发的变更不回推合作方（避免回声循环），只走
//! webhook 与实时广播。

use serde_json::{Value, json};

use crate::core::ServerState;
use crate::db::models::{Manifest, Package};
use crate::partner::{manifest_to_record, package_to_record};
use crate::realtime::{CHANNEL_MANIFESTS, CHANNEL_NOTIFICATIONS, CHANNEL_PACKAGES, package_channel};
use shared::event::EventType;

fn package_payload(package: &Package) -> Value {
    serde_json::to_value(package).unwrap_or_else(|_| json!({"id": package.id}))
}

fn manifest_payload(manifest: &Manifest) -> Value {
    serde_json::to_value(manifest).unwrap_or_else(|_| json!({"id": manifest.id}))
}

/// Emit a package lifecycle event.
///
/// `push_partner` is false for changes the partner itself sent in.
pub fn package_event(
    state: &ServerState,
    event_type: EventType,
    package: &Package,
    push_partner: bool,
) {
    let payload = package_payload(package);

    let partner_push = if push_partner {
        serde_json::to_value(package_to_record(package))
            .ok()
            .map(|record| ("/packages".to_string(), record))
    } else {
        None
    };

    let mut channels = vec![
        (CHANNEL_PACKAGES.to_string(), payload.clone()),
        (package_channel(&package.tracking_number), payload.clone()),
    ];
    if event_type == EventType::PackageStatusChanged {
        channels.push((
            CHANNEL_NOTIFICATIONS.to_string(),
            json!({
                "kind": "package_status",
                "tracking_number": package.tracking_number,
                "status": u8::from(package.status),
                "status_name": package.status.display_name(),
            }),
        ));
    }

    state.emit_event(event_type, payload, partner_push, &channels);
}

/// Emit a package deletion event. Nothing to push to the partner; the
/// payload carries the last known keys for consumer cleanup.
pub fn package_deleted_event(state: &ServerState, package: &Package) {
    let payload = json!({
        "id": package.id,
        "tracking_number": package.tracking_number,
        "control_number": package.control_number,
        "external_id": package.external_id,
    });
    let channels = vec![
        (CHANNEL_PACKAGES.to_string(), payload.clone()),
        (package_channel(&package.tracking_number), payload.clone()),
    ];
    state.emit_event(EventType::PackageDeleted, payload, None, &channels);
}

/// Emit a manifest lifecycle event.
pub fn manifest_event(
    state: &ServerState,
    event_type: EventType,
    manifest: &Manifest,
    push_partner: bool,
) {
    let payload = manifest_payload(manifest);

    let partner_push = if push_partner {
        serde_json::to_value(manifest_to_record(manifest))
            .ok()
            .map(|record| ("/manifest".to_string(), record))
    } else {
        None
    };

    let mut channels = vec![(CHANNEL_MANIFESTS.to_string(), payload.clone())];
    if event_type == EventType::ManifestStatusChanged {
        channels.push((
            CHANNEL_NOTIFICATIONS.to_string(),
            json!({
                "kind": "manifest_status",
                "manifest_code": manifest.manifest_code,
                "status": u8::from(manifest.status),
                "status_name": manifest.status.display_name(),
            }),
        ));
    }

    state.emit_event(event_type, payload, partner_push, &channels);
}
