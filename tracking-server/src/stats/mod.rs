//! Customer aggregate projector
//!
//! Recomputes a customer's derived counters from the packages referencing
//! it. Always a full re-derivation overwriting the stored snapshot — never
//! incremental — so repeated or concurrent recomputes cannot drift.
//!
//! Projection failures are logged and swallowed; they never roll back the
//! write that triggered them.

use sqlx::SqlitePool;

use crate::db::models::{CustomerAggregate, Package};
use crate::db::repository::{customer, package};
use crate::utils::AppResult;

/// Pure derivation of the aggregate from a package list
pub fn compute(packages: &[Package]) -> CustomerAggregate {
    let mut aggregate = CustomerAggregate::default();
    for p in packages {
        aggregate.total_packages += 1;
        if p.status.is_delivered() {
            aggregate.delivered_packages += 1;
        } else {
            aggregate.pending_packages += 1;
        }
        aggregate.total_weight += p.weight;
        aggregate.last_package_date = match aggregate.last_package_date {
            Some(existing) => Some(existing.max(p.created_at)),
            None => Some(p.created_at),
        };
    }
    aggregate
}

/// Recompute and overwrite one customer's snapshot.
///
/// No-op (logged) when the customer no longer exists — a package can
/// outlive its customer reference.
pub async fn recompute(pool: &SqlitePool, customer_id: i64) -> AppResult<()> {
    if customer::find_by_id(pool, customer_id).await?.is_none() {
        tracing::debug!(customer_id, "Aggregate recompute skipped: customer not found");
        return Ok(());
    }

    let packages = package::find_by_customer(pool, customer_id).await?;
    let aggregate = compute(&packages);
    customer::write_aggregate(pool, customer_id, &aggregate).await?;

    tracing::debug!(
        customer_id,
        total = aggregate.total_packages,
        pending = aggregate.pending_packages,
        delivered = aggregate.delivered_packages,
        "Customer aggregate recomputed"
    );
    Ok(())
}

/// Recompute with the soft-failure policy applied: log and continue.
///
/// Used on every trigger path (create/delete/status-change/reassign) so a
/// projection failure can never fail the request that caused it.
pub async fn recompute_soft(pool: &SqlitePool, customer_id: Option<i64>) {
    let Some(customer_id) = customer_id else {
        return;
    };
    if let Err(e) = recompute(pool, customer_id).await {
        tracing::error!(customer_id, error = %e, "Customer aggregate recompute failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::bootstrap_entry;
    use shared::status::PackageStatus;
    use shared::util::{now_millis, snowflake_id};
    use sqlx::types::Json;

    fn test_package(status: u8, weight: f64, customer_id: i64) -> Package {
        Package {
            id: snowflake_id(),
            tracking_number: format!("AWB-{}", snowflake_id()),
            control_number: None,
            external_id: None,
            customer_id: Some(customer_id),
            customer_unresolved: false,
            manifest_id: None,
            status: PackageStatus::try_from(status).unwrap(),
            status_history: Json(vec![bootstrap_entry(status, None, None, "test")]),
            description: None,
            weight,
            pieces: 1,
            shipper: None,
            origin: None,
            destination: None,
            created_at: now_millis(),
            updated_at: now_millis(),
        }
    }

    #[test]
    fn computes_exact_counts_and_weight() {
        // statuses 1, 2 pending; 4 delivered
        let packages = vec![
            test_package(1, 2.5, 7),
            test_package(2, 1.0, 7),
            test_package(4, 4.25, 7),
        ];
        let aggregate = compute(&packages);
        assert_eq!(aggregate.total_packages, 3);
        assert_eq!(aggregate.pending_packages, 2);
        assert_eq!(aggregate.delivered_packages, 1);
        assert!((aggregate.total_weight - 7.75).abs() < f64::EPSILON);
        assert!(aggregate.last_package_date.is_some());
    }

    #[test]
    fn claimed_counts_as_delivered() {
        let packages = vec![test_package(5, 1.0, 7)];
        let aggregate = compute(&packages);
        assert_eq!(aggregate.delivered_packages, 1);
        assert_eq!(aggregate.pending_packages, 0);
    }

    #[test]
    fn empty_package_list_yields_zeroes() {
        let aggregate = compute(&[]);
        assert_eq!(aggregate, CustomerAggregate::default());
        assert!(aggregate.last_package_date.is_none());
    }

    #[test]
    fn compute_is_idempotent() {
        let packages = vec![test_package(1, 2.0, 7), test_package(4, 3.0, 7)];
        assert_eq!(compute(&packages), compute(&packages));
    }
}
