mod common;

use assert_matches::assert_matches;
use axum::http::Method;
use field_reports_api::{
    db::DatabaseAccess,
    entities::sea_orm_active_enums::{ChangeType, QuantityUnit},
    errors::ServiceError,
    repositories::{inventory_store::InventoryStore, transaction_log::TransactionLog},
    services::ledger::{
        apply_report_lines, record_change, AdjustmentTarget, ChangeRequest, Direction, LineItem,
    },
};
use serde_json::json;

use common::{response_json, TestApp};

#[tokio::test]
async fn consumption_then_reversal_restores_balance() {
    let app = TestApp::new().await;
    let db = app.state.db.as_ref();

    let first = record_change(
        db,
        ChangeRequest::new("X", -5.0, "unit", ChangeType::Report).for_report(1),
    )
    .await
    .unwrap()
    .expect("row appended");
    assert_eq!(first.quantity, -5.0);

    let item = InventoryStore::find(db, "X").await.unwrap().expect("item created");
    assert_eq!(item.quantity_unit, -5.0);
    assert_eq!(item.quantity_meter, 0.0);

    record_change(
        db,
        ChangeRequest::new("X", 5.0, "unit", ChangeType::ReportEdit).for_report(1),
    )
    .await
    .unwrap();

    let item = InventoryStore::find(db, "X").await.unwrap().unwrap();
    assert_eq!(item.quantity_unit, 0.0);
    let rows = TransactionLog::for_product(db, "X").await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].change_type, ChangeType::ReportEdit);
}

#[tokio::test]
async fn adjustment_records_the_difference_to_target() {
    let app = TestApp::new().await;
    let db = app.state.db.as_ref();
    record_change(db, ChangeRequest::new("Y", 3.0, "meter", ChangeType::Adjustment))
        .await
        .unwrap();

    let response = app
        .request(
            Method::POST,
            "/api/inventory/adjust",
            Some(json!({
                "items": [{ "product_name": "Y", "quantity_unit": 0, "quantity_meter": 10 }]
            })),
            Some(app.admin_token()),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["transactions_recorded"], 1);
    assert_eq!(body["items"][0]["quantity_meter"], 10.0);

    let rows = TransactionLog::for_product(db, "Y").await.unwrap();
    let last = rows.last().unwrap();
    assert_eq!(last.quantity, 7.0);
    assert_eq!(last.unit, QuantityUnit::Meter);
    assert_eq!(last.change_type, ChangeType::Adjustment);
    assert_eq!(last.user_id, Some(app.admin.id));
}

#[tokio::test]
async fn repeated_adjustment_is_idempotent() {
    let app = TestApp::new().await;
    let targets = vec![AdjustmentTarget {
        product_name: "Allprotect - Flex".into(),
        quantity_unit: 4.0,
        quantity_meter: 0.0,
    }];

    let ledger = &app.state.services.ledger;
    let first = ledger.adjust(targets.clone(), app.admin.id).await.unwrap();
    let second = ledger.adjust(targets, app.admin.id).await.unwrap();

    assert_eq!(first.transactions_recorded, 1);
    assert_eq!(second.transactions_recorded, 0);
    let rows = TransactionLog::for_product(app.state.db.as_ref(), "Allprotect - Flex")
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn zero_delta_appends_nothing_but_tiny_delta_does() {
    let app = TestApp::new().await;
    let db = app.state.db.as_ref();

    let none = record_change(db, ChangeRequest::new("Z", 0.0, "unit", ChangeType::Adjustment))
        .await
        .unwrap();
    assert!(none.is_none());
    assert!(TransactionLog::for_product(db, "Z").await.unwrap().is_empty());

    let tiny = record_change(db, ChangeRequest::new("Z", 1e-6, "unit", ChangeType::Adjustment))
        .await
        .unwrap();
    assert!(tiny.is_some());
    assert_eq!(TransactionLog::for_product(db, "Z").await.unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_unit_counts_as_discrete_units() {
    let app = TestApp::new().await;
    let db = app.state.db.as_ref();

    let row = record_change(db, ChangeRequest::new("Tape", -2.0, "kg", ChangeType::Report))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.unit, QuantityUnit::Unit);

    let item = InventoryStore::find(db, "Tape").await.unwrap().unwrap();
    assert_eq!(item.quantity_unit, -2.0);
    assert_eq!(item.quantity_meter, 0.0);
}

#[tokio::test]
async fn report_round_trip_logs_every_line_twice() {
    let app = TestApp::new().await;
    let db = app.state.db.as_ref();
    let lines = vec![
        LineItem {
            product_name: "A".into(),
            quantity: 2.5,
            unit: QuantityUnit::Meter,
        },
        LineItem {
            product_name: "A".into(),
            quantity: 3.0,
            unit: QuantityUnit::Unit,
        },
        LineItem {
            product_name: "B".into(),
            quantity: 1.0,
            unit: QuantityUnit::Unit,
        },
    ];

    apply_report_lines(db, &lines, Direction::Consume, ChangeType::Report, 9, app.installer.id, "Report #9")
        .await
        .unwrap();
    let a = InventoryStore::find(db, "A").await.unwrap().unwrap();
    assert_eq!((a.quantity_unit, a.quantity_meter), (-3.0, -2.5));

    apply_report_lines(
        db,
        &lines,
        Direction::Restore,
        ChangeType::ReportEdit,
        9,
        app.installer.id,
        "Revert Report #9",
    )
    .await
    .unwrap();

    let a = InventoryStore::find(db, "A").await.unwrap().unwrap();
    let b = InventoryStore::find(db, "B").await.unwrap().unwrap();
    assert_eq!((a.quantity_unit, a.quantity_meter), (0.0, 0.0));
    assert_eq!(b.quantity_unit, 0.0);
    assert_eq!(TransactionLog::count(db).await.unwrap(), 6);
}

#[tokio::test]
async fn failed_unit_of_work_leaves_no_trace() {
    let app = TestApp::new().await;
    let access = DatabaseAccess::new(app.state.db.clone());

    let result = access
        .transaction(|txn| {
            Box::pin(async move {
                record_change(txn, ChangeRequest::new("Rollback", -4.0, "unit", ChangeType::Report))
                    .await?;
                Err::<(), _>(ServiceError::InternalError("report not saved".into()))
            })
        })
        .await;
    assert_matches!(result, Err(ServiceError::InternalError(_)));

    let db = app.state.db.as_ref();
    assert!(InventoryStore::find(db, "Rollback").await.unwrap().is_none());
    assert!(TransactionLog::for_product(db, "Rollback").await.unwrap().is_empty());
}

#[tokio::test]
async fn inventory_screens_are_admin_only() {
    let app = TestApp::new().await;

    for uri in ["/api/inventory", "/api/inventory/transactions", "/api/inventory/export"] {
        let response = app
            .request(Method::GET, uri, None, Some(app.installer_token()))
            .await;
        assert_eq!(response.status(), 403, "{uri}");
    }

    let response = app
        .request(Method::GET, "/api/inventory", None, Some(app.admin_token()))
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|item| item["product_name"].as_str())
        .collect();
    assert_eq!(names[0], "Floorliner - Vapor Shield");
    assert_eq!(names.len(), field_reports_api::catalog::PRODUCTS.len());
}

#[tokio::test]
async fn transactions_can_be_filtered_by_product() {
    let app = TestApp::new().await;
    let db = app.state.db.as_ref();
    record_change(db, ChangeRequest::new("Allprotect - Flex", -1.0, "meter", ChangeType::Report))
        .await
        .unwrap();
    record_change(db, ChangeRequest::new("Allprotect - Original", -2.0, "unit", ChangeType::Report))
        .await
        .unwrap();

    let response = app
        .request(
            Method::GET,
            "/api/inventory/transactions?product_name=Allprotect%20-%20Flex",
            None,
            Some(app.admin_token()),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["product_name"], "Allprotect - Flex");
}
