//! Customer Model

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Customer entity with its derived aggregate snapshot
///
/// The aggregate columns are a projection over the customer's packages —
/// always recomputed wholesale, never incremented in place.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Customer {
    pub id: i64,
    pub user_code: String,
    pub name: String,
    pub email: Option<String>,
    pub total_packages: i64,
    pub pending_packages: i64,
    pub delivered_packages: i64,
    pub total_weight: f64,
    pub last_package_date: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Derived counters for one customer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerAggregate {
    pub total_packages: i64,
    pub pending_packages: i64,
    pub delivered_packages: i64,
    pub total_weight: f64,
    pub last_package_date: Option<i64>,
}

/// Create customer payload
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CustomerCreate {
    #[validate(length(min = 1, max = 32))]
    pub user_code: String,
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    #[validate(email)]
    pub email: Option<String>,
}
