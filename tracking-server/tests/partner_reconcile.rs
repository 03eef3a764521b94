//! 合作方对账测试 - 幂等 upsert 与部分字段合并
//!
//! 覆盖自然键解析顺序、缺席字段不覆盖、未知客户标记、清单关联与删除解析

use tracking_server::db::models::CustomerCreate;
use tracking_server::db::repository::{customer, package};
use tracking_server::db::DbService;
use tracking_server::partner::reconcile;
use tracking_server::utils::AppError;

use shared::partner::{PartnerManifestRecord, PartnerPackageRecord};
use shared::status::{ManifestStatus, PackageStatus};

const ACTOR: &str = "partner-sync";

fn record(tracking_number: &str) -> PartnerPackageRecord {
    PartnerPackageRecord {
        tracking_number: Some(tracking_number.to_string()),
        ..Default::default()
    }
}

async fn setup() -> DbService {
    DbService::open_in_memory().await.expect("in-memory db")
}

#[tokio::test]
async fn upsert_creates_then_merges_on_second_call() {
    let db = setup().await;
    let pool = &db.pool;

    let mut rec = record("AWB-3001");
    rec.weight = Some(4.2);
    rec.description = Some("spare parts".into());

    let first = reconcile::upsert_package(pool, &rec, ACTOR)
        .await
        .expect("create");
    assert!(first.created);
    assert!(first.status_changed);

    let second = reconcile::upsert_package(pool, &rec, ACTOR)
        .await
        .expect("merge");
    assert!(!second.created);
    assert!(!second.status_changed);
    assert_eq!(second.package.id, first.package.id);

    let (_, total) = package::find_page(pool, &Default::default())
        .await
        .expect("page");
    assert_eq!(total, 1);
}

#[tokio::test]
async fn merge_leaves_absent_fields_untouched() {
    let db = setup().await;
    let pool = &db.pool;

    let mut rec = record("AWB-3002");
    rec.weight = Some(7.5);
    rec.shipper = Some("Acme Freight".into());
    reconcile::upsert_package(pool, &rec, ACTOR)
        .await
        .expect("create");

    // 第二次只带运单号和描述，重量与发货人必须保留
    let mut partial = record("AWB-3002");
    partial.description = Some("updated description".into());
    let outcome = reconcile::upsert_package(pool, &partial, ACTOR)
        .await
        .expect("merge");

    let pkg = outcome.package;
    assert!((pkg.weight - 7.5).abs() < f64::EPSILON);
    assert_eq!(pkg.shipper.as_deref(), Some("Acme Freight"));
    assert_eq!(pkg.description.as_deref(), Some("updated description"));
}

#[tokio::test]
async fn status_in_record_flows_through_the_ledger() {
    let db = setup().await;
    let pool = &db.pool;

    reconcile::upsert_package(pool, &record("AWB-3003"), ACTOR)
        .await
        .expect("create");

    let mut moved = record("AWB-3003");
    moved.package_status = Some(2);
    moved.location = Some("port of entry".into());
    let outcome = reconcile::upsert_package(pool, &moved, ACTOR)
        .await
        .expect("merge");

    assert!(outcome.status_changed);
    let pkg = outcome.package;
    assert_eq!(pkg.status, PackageStatus::InTransit);
    assert_eq!(pkg.status_history.0.len(), 2);
    let last = pkg.status_history.0.last().expect("entry");
    assert_eq!(last.updated_by, ACTOR);
    assert_eq!(last.location.as_deref(), Some("port of entry"));
}

#[tokio::test]
async fn unknown_customer_flags_without_failing() {
    let db = setup().await;
    let pool = &db.pool;

    let mut rec = record("AWB-3004");
    rec.user_code = Some("NO-SUCH-CODE".into());
    let outcome = reconcile::upsert_package(pool, &rec, ACTOR)
        .await
        .expect("create despite unknown customer");

    assert!(outcome.package.customer_unresolved);
    assert!(outcome.package.customer_id.is_none());
}

#[tokio::test]
async fn merge_with_unknown_customer_updates_in_place_and_flags() {
    let db = setup().await;
    let pool = &db.pool;

    reconcile::upsert_package(pool, &record("AWB-3010"), ACTOR)
        .await
        .expect("create");

    let mut rec = record("AWB-3010");
    rec.user_code = Some("GHOST".into());
    rec.weight = Some(9.9);
    let outcome = reconcile::upsert_package(pool, &rec, ACTOR)
        .await
        .expect("merge must not fail on unknown customer");

    assert!(!outcome.created);
    assert!(outcome.package.customer_unresolved);
    assert!((outcome.package.weight - 9.9).abs() < f64::EPSILON);
}

#[tokio::test]
async fn later_record_resolves_a_flagged_customer() {
    let db = setup().await;
    let pool = &db.pool;

    let mut rec = record("AWB-3005");
    rec.user_code = Some("C-300".into());
    reconcile::upsert_package(pool, &rec, ACTOR)
        .await
        .expect("create flagged");

    customer::create(
        pool,
        CustomerCreate {
            user_code: "C-300".into(),
            name: "Dana".into(),
            email: None,
        },
    )
    .await
    .expect("customer");

    let outcome = reconcile::upsert_package(pool, &rec, ACTOR)
        .await
        .expect("re-resolve");
    assert!(!outcome.package.customer_unresolved);
    assert!(outcome.package.customer_id.is_some());
}

#[tokio::test]
async fn record_without_any_key_is_rejected() {
    let db = setup().await;
    let err = reconcile::upsert_package(&db.pool, &PartnerPackageRecord::default(), ACTOR)
        .await
        .expect_err("no key");
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn control_number_resolves_when_tracking_number_differs() {
    let db = setup().await;
    let pool = &db.pool;

    let mut rec = record("AWB-3006");
    rec.control_number = Some("CN-88".into());
    let first = reconcile::upsert_package(pool, &rec, ACTOR)
        .await
        .expect("create");

    // 同一提货号但没有运单号 — 必须命中同一行
    let by_control = PartnerPackageRecord {
        control_number: Some("CN-88".into()),
        weight: Some(1.25),
        ..Default::default()
    };
    let outcome = reconcile::upsert_package(pool, &by_control, ACTOR)
        .await
        .expect("merge by control number");
    assert!(!outcome.created);
    assert_eq!(outcome.package.id, first.package.id);
}

#[tokio::test]
async fn manifest_upsert_associates_listed_packages() {
    let db = setup().await;
    let pool = &db.pool;

    let mut by_control = record("AWB-4001");
    by_control.control_number = Some("CN-401".into());
    reconcile::upsert_package(pool, &by_control, ACTOR)
        .await
        .expect("pkg 1");
    reconcile::upsert_package(pool, &record("AWB-4002"), ACTOR)
        .await
        .expect("pkg 2");

    let manifest_record = PartnerManifestRecord {
        manifest_code: Some("MNF-2026-01".into()),
        status: Some(1),
        carrier: Some("Oceanic".into()),
        ..Default::default()
    };
    let outcome = reconcile::upsert_manifest(
        pool,
        &manifest_record,
        &["CN-401".to_string()],
        &["AWB-4002".to_string(), "AWB-MISSING".to_string()],
        ACTOR,
    )
    .await
    .expect("manifest upsert");

    assert!(outcome.created);
    assert_eq!(outcome.associated, 2);
    assert_eq!(outcome.manifest.status, ManifestStatus::Departed);

    let pkg = package::find_by_tracking_number(pool, "AWB-4002")
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(pkg.manifest_id, Some(outcome.manifest.id));
}

#[tokio::test]
async fn manifest_upsert_is_idempotent_on_code() {
    let db = setup().await;
    let pool = &db.pool;

    let rec = PartnerManifestRecord {
        manifest_code: Some("MNF-2026-02".into()),
        ..Default::default()
    };
    let first = reconcile::upsert_manifest(pool, &rec, &[], &[], ACTOR)
        .await
        .expect("create");
    let second = reconcile::upsert_manifest(pool, &rec, &[], &[], ACTOR)
        .await
        .expect("merge");
    assert!(first.created);
    assert!(!second.created);
    assert_eq!(second.manifest.id, first.manifest.id);
}

#[tokio::test]
async fn delete_resolution_refuses_claimed_packages() {
    let db = setup().await;
    let pool = &db.pool;

    let mut rec = record("AWB-5001");
    rec.package_status = Some(5);
    reconcile::upsert_package(pool, &rec, ACTOR)
        .await
        .expect("create claimed");

    let err = reconcile::resolve_for_delete(pool, None, Some("AWB-5001"), None)
        .await
        .expect_err("claimed is terminal");
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn delete_resolution_finds_by_any_key() {
    let db = setup().await;
    let pool = &db.pool;

    let mut rec = record("AWB-5002");
    rec.control_number = Some("CN-502".into());
    reconcile::upsert_package(pool, &rec, ACTOR)
        .await
        .expect("create");

    let resolved = reconcile::resolve_for_delete(pool, None, None, Some("CN-502"))
        .await
        .expect("resolve by control number");
    assert_eq!(resolved.tracking_number, "AWB-5002");

    let missing = reconcile::resolve_for_delete(pool, None, Some("AWB-NOPE"), None).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn delete_resolution_tries_a_numeric_id_as_local_first() {
    let db = setup().await;
    let pool = &db.pool;

    let created = reconcile::upsert_package(pool, &record("AWB-5003"), ACTOR)
        .await
        .expect("create");
    let local_id = created.package.id;

    // 数字 PackageID 先按本地 id 解析，外部 id 不必匹配
    let resolved = reconcile::resolve_for_delete(pool, Some(&local_id.to_string()), None, None)
        .await
        .expect("resolve by local id");
    assert_eq!(resolved.id, local_id);
    assert_eq!(resolved.tracking_number, "AWB-5003");

    // 非数字 PackageID 仍按外部 id 解析
    let missing = reconcile::resolve_for_delete(pool, Some("EXT-NOPE"), None, None).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}
