//! Database row models
//!
//! Tracked entities embed their own `status_history` as a JSON column so
//! current state plus full history is one atomic read.

pub mod customer;
pub mod manifest;
pub mod package;

pub use customer::{Customer, CustomerAggregate, CustomerCreate};
pub use manifest::{Manifest, ManifestCreate, ManifestUpdate};
pub use package::{Package, PackageCreate, PackageUpdate, StatusHistoryEntry};
