//! Partner freight system integration
//!
//! Inbound records go through the [`reconcile`] adapter before touching
//! the ledger, so operator and partner writes share one transition path.
//! Outbound pushes go through [`client::PartnerClient`].

pub mod client;
pub mod reconcile;

pub use client::PartnerClient;

use crate::db::models::{Manifest, Package};
use shared::partner::{PartnerManifestRecord, PartnerPackageRecord};

/// Render a package in partner field naming (sync responses, partner push)
pub fn package_to_record(package: &Package) -> PartnerPackageRecord {
    PartnerPackageRecord {
        package_id: package.external_id.clone(),
        tracking_number: Some(package.tracking_number.clone()),
        control_number: package.control_number.clone(),
        user_code: None, // looked up by the caller when it matters
        package_status: Some(u8::from(package.status)),
        weight: Some(package.weight),
        pieces: Some(package.pieces),
        description: package.description.clone(),
        shipper: package.shipper.clone(),
        origin: package.origin.clone(),
        destination: package.destination.clone(),
        location: None,
        notes: None,
    }
}

/// Render a manifest in partner field naming
pub fn manifest_to_record(manifest: &Manifest) -> PartnerManifestRecord {
    PartnerManifestRecord {
        manifest_id: manifest.external_id.clone(),
        manifest_code: Some(manifest.manifest_code.clone()),
        status: Some(u8::from(manifest.status)),
        carrier: manifest.carrier.clone(),
        vessel: manifest.vessel.clone(),
        departure_date: manifest.departure_date,
        arrival_date: manifest.arrival_date,
        notes: manifest.notes.clone(),
    }
}
