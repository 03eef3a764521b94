//! 包裹与舱单状态定义
//!
//! 两套封闭的有序状态集。所有消费方（API、账本、统计、伙伴同步）
//! 共用这里的枚举和显示名映射，不允许各自维护查表逻辑。

use serde::{Deserialize, Serialize};
use std::fmt;

/// Package lifecycle status (closed ordinal set)
///
/// Wire format is the bare ordinal — the partner system sends and
/// expects `PackageStatus` as a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PackageStatus {
    /// 已登记（仅建档，未入库）
    Registered = 0,
    /// 已入库
    AtWarehouse = 1,
    /// 运输中
    InTransit = 2,
    /// 到达目的口岸
    AtDestination = 3,
    /// 已派送
    Delivered = 4,
    /// 已签收领取（终态，不可删除）
    Claimed = 5,
}

impl PackageStatus {
    /// Display name used by every consumer (API payloads, logs, notifications)
    pub fn display_name(&self) -> &'static str {
        match self {
            PackageStatus::Registered => "Registered",
            PackageStatus::AtWarehouse => "At Warehouse",
            PackageStatus::InTransit => "In Transit",
            PackageStatus::AtDestination => "At Destination",
            PackageStatus::Delivered => "Delivered",
            PackageStatus::Claimed => "Claimed",
        }
    }

    /// Terminal statuses forbid deletion of the package
    pub fn is_terminal(&self) -> bool {
        matches!(self, PackageStatus::Claimed)
    }

    /// Counted as delivered for customer aggregates
    pub fn is_delivered(&self) -> bool {
        matches!(self, PackageStatus::Delivered | PackageStatus::Claimed)
    }
}

impl TryFrom<u8> for PackageStatus {
    type Error = InvalidStatus;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PackageStatus::Registered),
            1 => Ok(PackageStatus::AtWarehouse),
            2 => Ok(PackageStatus::InTransit),
            3 => Ok(PackageStatus::AtDestination),
            4 => Ok(PackageStatus::Delivered),
            5 => Ok(PackageStatus::Claimed),
            other => Err(InvalidStatus {
                kind: "package",
                value: other,
            }),
        }
    }
}

impl From<PackageStatus> for u8 {
    fn from(s: PackageStatus) -> u8 {
        s as u8
    }
}

// Storage layers keep the ordinal in wider integer columns
impl TryFrom<i64> for PackageStatus {
    type Error = InvalidStatus;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map_err(|_| InvalidStatus {
                kind: "package",
                value: u8::MAX,
            })
            .and_then(PackageStatus::try_from)
    }
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Manifest lifecycle status (closed ordinal set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ManifestStatus {
    /// 草稿
    Draft = 0,
    /// 已离港
    Departed = 1,
    /// 运输中
    InTransit = 2,
    /// 已到港
    Arrived = 3,
    /// 已结算（终态，不可删除）
    Settled = 4,
}

impl ManifestStatus {
    pub fn display_name(&self) -> &'static str {
        match self {
            ManifestStatus::Draft => "Draft",
            ManifestStatus::Departed => "Departed",
            ManifestStatus::InTransit => "In Transit",
            ManifestStatus::Arrived => "Arrived",
            ManifestStatus::Settled => "Settled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ManifestStatus::Settled)
    }
}

impl TryFrom<u8> for ManifestStatus {
    type Error = InvalidStatus;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ManifestStatus::Draft),
            1 => Ok(ManifestStatus::Departed),
            2 => Ok(ManifestStatus::InTransit),
            3 => Ok(ManifestStatus::Arrived),
            4 => Ok(ManifestStatus::Settled),
            other => Err(InvalidStatus {
                kind: "manifest",
                value: other,
            }),
        }
    }
}

impl From<ManifestStatus> for u8 {
    fn from(s: ManifestStatus) -> u8 {
        s as u8
    }
}

impl TryFrom<i64> for ManifestStatus {
    type Error = InvalidStatus;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map_err(|_| InvalidStatus {
                kind: "manifest",
                value: u8::MAX,
            })
            .and_then(ManifestStatus::try_from)
    }
}

impl fmt::Display for ManifestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Status value outside the closed set for its entity kind
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} status: {value}")]
pub struct InvalidStatus {
    pub kind: &'static str,
    pub value: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_status_round_trips_through_ordinal() {
        for v in 0u8..=5 {
            let status = PackageStatus::try_from(v).unwrap();
            assert_eq!(u8::from(status), v);
        }
        assert!(PackageStatus::try_from(6u8).is_err());
    }

    #[test]
    fn manifest_status_rejects_out_of_set() {
        assert!(ManifestStatus::try_from(5u8).is_err());
        assert!(ManifestStatus::try_from(255u8).is_err());
    }

    #[test]
    fn delivered_classification() {
        assert!(!PackageStatus::InTransit.is_delivered());
        assert!(PackageStatus::Delivered.is_delivered());
        assert!(PackageStatus::Claimed.is_delivered());
        assert!(PackageStatus::Claimed.is_terminal());
        assert!(!PackageStatus::Delivered.is_terminal());
    }

    #[test]
    fn serde_uses_bare_ordinal() {
        let json = serde_json::to_string(&PackageStatus::InTransit).unwrap();
        assert_eq!(json, "2");
        let back: PackageStatus = serde_json::from_str("4").unwrap();
        assert_eq!(back, PackageStatus::Delivered);
    }
}
