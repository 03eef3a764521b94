//! Partner freight system wire records
//!
//! The partner exchanges flat records keyed by its own PascalCase field
//! names (`TrackingNumber`, `ControlNumber`, `UserCode`, ...). These types
//! are the only place that naming exists; everything internal uses the
//! snake_case domain models. Absent fields stay `None` — the
//! reconciliation layer treats absence as "leave unchanged", never as
//! "blank the field".

use serde::{Deserialize, Serialize};

/// Single object or array — partner endpoints accept both
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

/// Flat package record in partner field naming
///
/// Used both inbound (add/update sync) and outbound (partner push echo).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartnerPackageRecord {
    /// Partner-side package id (our `external_id`)
    #[serde(rename = "PackageID", skip_serializing_if = "Option::is_none")]
    pub package_id: Option<String>,
    #[serde(rename = "TrackingNumber", skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(rename = "ControlNumber", skip_serializing_if = "Option::is_none")]
    pub control_number: Option<String>,
    /// Customer code on the partner side
    #[serde(rename = "UserCode", skip_serializing_if = "Option::is_none")]
    pub user_code: Option<String>,
    /// Status ordinal from the closed package set
    #[serde(rename = "PackageStatus", skip_serializing_if = "Option::is_none")]
    pub package_status: Option<u8>,
    #[serde(rename = "Weight", skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(rename = "Pieces", skip_serializing_if = "Option::is_none")]
    pub pieces: Option<i64>,
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Shipper", skip_serializing_if = "Option::is_none")]
    pub shipper: Option<String>,
    #[serde(rename = "Origin", skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(rename = "Destination", skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// Location attached to the status transition, if any
    #[serde(rename = "Location", skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(rename = "Notes", skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl PartnerPackageRecord {
    /// True when the record carries no usable natural key
    pub fn has_no_key(&self) -> bool {
        self.package_id.is_none() && self.tracking_number.is_none() && self.control_number.is_none()
    }
}

/// Manifest record in partner field naming
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartnerManifestRecord {
    #[serde(rename = "ManifestID", skip_serializing_if = "Option::is_none")]
    pub manifest_id: Option<String>,
    #[serde(rename = "ManifestCode", skip_serializing_if = "Option::is_none")]
    pub manifest_code: Option<String>,
    #[serde(rename = "Status", skip_serializing_if = "Option::is_none")]
    pub status: Option<u8>,
    #[serde(rename = "Carrier", skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    #[serde(rename = "Vessel", skip_serializing_if = "Option::is_none")]
    pub vessel: Option<String>,
    /// Unix millis
    #[serde(rename = "DepartureDate", skip_serializing_if = "Option::is_none")]
    pub departure_date: Option<i64>,
    #[serde(rename = "ArrivalDate", skip_serializing_if = "Option::is_none")]
    pub arrival_date: Option<i64>,
    #[serde(rename = "Notes", skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Inbound manifest update call body
#[derive(Debug, Clone, Deserialize)]
pub struct PartnerManifestUpdate {
    #[serde(rename = "APIToken", default)]
    pub api_token: Option<String>,
    #[serde(rename = "Manifest")]
    pub manifest: PartnerManifestRecord,
    /// Control numbers of packages to associate with the manifest
    #[serde(rename = "CollectionCodes", default)]
    pub collection_codes: Vec<String>,
    /// Tracking numbers (air waybills) of packages to associate
    #[serde(rename = "PackageAWBs", default)]
    pub package_awbs: Vec<String>,
}

/// Inbound delete call item — any one key resolves the package
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartnerDeleteKey {
    #[serde(rename = "PackageID", default)]
    pub package_id: Option<String>,
    #[serde(rename = "TrackingNumber", default)]
    pub tracking_number: Option<String>,
    #[serde(rename = "ControlNumber", default)]
    pub control_number: Option<String>,
}

/// Per-item outcome in a partner batch response
#[derive(Debug, Clone, Serialize)]
pub struct SyncItemResult {
    #[serde(rename = "Success")]
    pub success: bool,
    #[serde(rename = "TrackingNumber", skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(rename = "Error", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Reconciled record echoed back in partner naming
    #[serde(rename = "Package", skip_serializing_if = "Option::is_none")]
    pub package: Option<PartnerPackageRecord>,
}

impl SyncItemResult {
    pub fn ok(tracking_number: Option<String>, package: PartnerPackageRecord) -> Self {
        Self {
            success: true,
            tracking_number,
            error: None,
            package: Some(package),
        }
    }

    pub fn failed(tracking_number: Option<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            tracking_number,
            error: Some(error.into()),
            package: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_or_many_accepts_both_shapes() {
        let one: OneOrMany<PartnerPackageRecord> =
            serde_json::from_str(r#"{"TrackingNumber":"AWB-1"}"#).unwrap();
        assert_eq!(one.into_vec().len(), 1);

        let many: OneOrMany<PartnerPackageRecord> =
            serde_json::from_str(r#"[{"TrackingNumber":"AWB-1"},{"ControlNumber":"C-2"}]"#)
                .unwrap();
        assert_eq!(many.into_vec().len(), 2);
    }

    #[test]
    fn absent_fields_deserialize_to_none() {
        let record: PartnerPackageRecord = serde_json::from_str(r#"{"Weight":5.0}"#).unwrap();
        assert_eq!(record.weight, Some(5.0));
        assert!(record.tracking_number.is_none());
        assert!(record.package_status.is_none());
        assert!(record.has_no_key());
    }

    #[test]
    fn serializes_with_partner_field_names() {
        let record = PartnerPackageRecord {
            tracking_number: Some("AWB-9".into()),
            package_status: Some(2),
            ..Default::default()
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["TrackingNumber"], "AWB-9");
        assert_eq!(json["PackageStatus"], 2);
        assert!(json.get("Weight").is_none());
    }
}
