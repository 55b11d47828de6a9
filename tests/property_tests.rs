//! Property-based tests for the inventory ledger and input normalisation.
//!
//! Ledger properties run against a fresh in-memory SQLite database per case.

use field_reports_api::{
    entities::sea_orm_active_enums::{ChangeType, QuantityUnit},
    migrator::Migrator,
    repositories::{inventory_store::InventoryStore, transaction_log::TransactionLog},
    services::{
        ledger::{record_change, ChangeRequest},
        report_input::parse_report_datetime,
        uploads::secure_filename,
    },
};
use proptest::prelude::*;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime")
}

async fn ledger_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:".to_string());
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.expect("sqlite memory db");
    Migrator::up(&db, None).await.expect("migrations");
    db
}

// Halves keep every partial sum exactly representable.
fn delta_strategy() -> impl Strategy<Value = f64> {
    (-400i32..400).prop_map(|halves| halves as f64 / 2.0)
}

fn unit_strategy() -> impl Strategy<Value = QuantityUnit> {
    prop_oneof![Just(QuantityUnit::Unit), Just(QuantityUnit::Meter)]
}

/// Applies the changes in order and returns (unit balance, meter balance, rows logged).
async fn replay(changes: &[(f64, QuantityUnit)]) -> (f64, f64, u64) {
    let db = ledger_db().await;
    for (quantity, unit) in changes {
        record_change(&db, ChangeRequest::new("P", *quantity, *unit, ChangeType::Report))
            .await
            .expect("record change");
    }
    let item = InventoryStore::find(&db, "P").await.expect("find item");
    let logged = TransactionLog::count(&db).await.expect("count rows");
    match item {
        Some(item) => (item.quantity_unit, item.quantity_meter, logged),
        None => (0.0, 0.0, logged),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn balances_are_the_sum_of_logged_changes_in_any_order(
        changes in prop::collection::vec((delta_strategy(), unit_strategy()), 0..12)
    ) {
        let rt = runtime();
        let forward = rt.block_on(replay(&changes));
        let mut reversed = changes.clone();
        reversed.reverse();
        let backward = rt.block_on(replay(&reversed));

        let unit_sum: f64 = changes.iter().filter(|(_, u)| *u == QuantityUnit::Unit).map(|(q, _)| q).sum();
        let meter_sum: f64 = changes.iter().filter(|(_, u)| *u == QuantityUnit::Meter).map(|(q, _)| q).sum();
        let non_zero = changes.iter().filter(|(q, _)| *q != 0.0).count() as u64;

        prop_assert_eq!(forward, backward);
        prop_assert_eq!(forward.0, unit_sum);
        prop_assert_eq!(forward.1, meter_sum);
        prop_assert_eq!(forward.2, non_zero);
    }

    #[test]
    fn consumption_followed_by_reversal_nets_to_zero(
        lines in prop::collection::vec((1i32..200, unit_strategy()), 1..6)
    ) {
        let mut changes: Vec<(f64, QuantityUnit)> =
            lines.iter().map(|(q, u)| (-(*q as f64), *u)).collect();
        changes.extend(lines.iter().map(|(q, u)| (*q as f64, *u)));

        let (unit, meter, logged) = runtime().block_on(replay(&changes));
        prop_assert_eq!(unit, 0.0);
        prop_assert_eq!(meter, 0.0);
        prop_assert_eq!(logged, 2 * lines.len() as u64);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn anything_but_meter_is_counted_in_units(raw in "[a-zA-Z ]{0,8}") {
        let expected = if raw.trim().eq_ignore_ascii_case("meter") {
            QuantityUnit::Meter
        } else {
            QuantityUnit::Unit
        };
        prop_assert_eq!(QuantityUnit::coerce(Some(&raw)), expected);
    }

    #[test]
    fn datetime_local_values_parse_back(
        year in 2000i32..2100,
        month in 1u32..=12,
        day in 1u32..=28,
        hour in 0u32..24,
        minute in 0u32..60,
    ) {
        let raw = format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}");
        let parsed = parse_report_datetime(&raw).expect("valid datetime-local");
        prop_assert_eq!(parsed.format("%Y-%m-%dT%H:%M").to_string(), raw);
    }

    #[test]
    fn stored_file_names_never_escape_their_directory(raw in ".{0,40}") {
        let name = secure_filename(&raw);
        prop_assert!(!name.contains('/'));
        prop_assert!(!name.contains('\\'));
        prop_assert!(!name.starts_with('.'));
    }
}
