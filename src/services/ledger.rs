//! Inventory ledger: the one place stock balances change.
//!
//! Every mutation applies a signed delta to a product's balance and appends a
//! matching transaction row on the same connection. Callers pass the open
//! transaction of their unit of work so both writes commit or roll back together.

use crate::db::{DatabaseAccess, DbPool};
use crate::entities::{
    inventory_item, inventory_transaction, report_product,
    sea_orm_active_enums::{ChangeType, QuantityUnit},
};
use crate::errors::ServiceError;
use crate::repositories::{
    inventory_store::InventoryStore,
    transaction_log::{NewTransaction, TransactionFilter, TransactionLog},
    Page,
};
use metrics::counter;
use sea_orm::ConnectionTrait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;

pub const MANUAL_ADJUSTMENT_NOTE: &str = "Manual adjustment";

/// A single signed change to one product's balance.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRequest {
    pub product_name: String,
    pub quantity: f64,
    pub unit: QuantityUnit,
    pub change_type: ChangeType,
    pub report_id: Option<i32>,
    pub user_id: Option<i32>,
    pub notes: Option<String>,
}

impl ChangeRequest {
    pub fn new(
        product_name: impl Into<String>,
        quantity: f64,
        unit: impl Into<QuantityUnit>,
        change_type: ChangeType,
    ) -> Self {
        Self {
            product_name: product_name.into(),
            quantity,
            unit: unit.into(),
            change_type,
            report_id: None,
            user_id: None,
            notes: None,
        }
    }

    pub fn for_report(mut self, report_id: i32) -> Self {
        self.report_id = Some(report_id);
        self
    }

    pub fn by_user(mut self, user_id: i32) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes = Some(note.into());
        self
    }
}

/// Applies the change to the stock balance and appends its log row.
///
/// A zero quantity is a no-op and returns `None`. Any other finite quantity
/// appends exactly one row.
#[instrument(skip(conn), fields(product = %request.product_name, quantity = request.quantity))]
pub async fn record_change<C>(
    conn: &C,
    request: ChangeRequest,
) -> Result<Option<inventory_transaction::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    if !request.quantity.is_finite() {
        return Err(ServiceError::ValidationError(format!(
            "Quantity for {} is not a number",
            request.product_name
        )));
    }
    if request.quantity == 0.0 {
        counter!("inventory.ledger.noop", 1);
        return Ok(None);
    }

    InventoryStore::apply_delta(conn, &request.product_name, request.unit, request.quantity).await?;
    let row = TransactionLog::append(
        conn,
        NewTransaction {
            product_name: request.product_name,
            change_type: request.change_type,
            quantity: request.quantity,
            unit: request.unit,
            report_id: request.report_id,
            user_id: request.user_id,
            notes: request.notes,
        },
    )
    .await?;

    counter!("inventory.ledger.changes", 1);
    debug!(transaction_id = row.id, "ledger change recorded");
    Ok(Some(row))
}

/// Product line as the ledger sees it
#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    pub product_name: String,
    pub quantity: f64,
    pub unit: QuantityUnit,
}

impl From<&report_product::Model> for LineItem {
    fn from(line: &report_product::Model) -> Self {
        Self {
            product_name: line.product_name.clone(),
            quantity: line.quantity,
            unit: line.quantity_unit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Stock leaves the warehouse (negative delta)
    Consume,
    /// Earlier consumption is given back (positive delta)
    Restore,
}

impl Direction {
    fn signed(self, quantity: f64) -> f64 {
        match self {
            Direction::Consume => -quantity,
            Direction::Restore => quantity,
        }
    }
}

/// Records one change per line of a report. Returns how many rows were appended.
pub async fn apply_report_lines<C>(
    conn: &C,
    lines: &[LineItem],
    direction: Direction,
    change_type: ChangeType,
    report_id: i32,
    user_id: i32,
    note: &str,
) -> Result<usize, ServiceError>
where
    C: ConnectionTrait,
{
    let mut recorded = 0;
    for line in lines {
        let request = ChangeRequest::new(
            line.product_name.clone(),
            direction.signed(line.quantity),
            line.unit,
            change_type,
        )
        .for_report(report_id)
        .by_user(user_id)
        .with_note(note);

        if record_change(conn, request).await?.is_some() {
            recorded += 1;
        }
    }
    Ok(recorded)
}

/// Absolute balances an administrator wants a product to have.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AdjustmentTarget {
    pub product_name: String,
    #[serde(default)]
    pub quantity_unit: f64,
    #[serde(default)]
    pub quantity_meter: f64,
}

impl AdjustmentTarget {
    fn target(&self, unit: QuantityUnit) -> f64 {
        match unit {
            QuantityUnit::Unit => self.quantity_unit,
            QuantityUnit::Meter => self.quantity_meter,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AdjustmentOutcome {
    pub items: Vec<inventory_item::Model>,
    pub transactions_recorded: usize,
}

/// Moves each product to its target balances by recording `target - current`
/// per track. Blank product names are skipped.
pub async fn adjust_to_targets<C>(
    conn: &C,
    targets: &[AdjustmentTarget],
    user_id: i32,
) -> Result<AdjustmentOutcome, ServiceError>
where
    C: ConnectionTrait,
{
    let mut outcome = AdjustmentOutcome {
        items: Vec::new(),
        transactions_recorded: 0,
    };

    for target in targets {
        let name = target.product_name.trim();
        if name.is_empty() {
            continue;
        }

        let mut item = InventoryStore::get_or_create(conn, name).await?;
        for unit in [QuantityUnit::Unit, QuantityUnit::Meter] {
            let wanted = target.target(unit);
            if !wanted.is_finite() {
                return Err(ServiceError::ValidationError(format!(
                    "Target quantity for {name} is not a number"
                )));
            }
            let delta = wanted - item.balance(unit);
            if delta == 0.0 {
                continue;
            }

            let request = ChangeRequest::new(name, delta, unit, ChangeType::Adjustment)
                .by_user(user_id)
                .with_note(MANUAL_ADJUSTMENT_NOTE);
            if record_change(conn, request).await?.is_some() {
                outcome.transactions_recorded += 1;
            }
        }

        item = InventoryStore::get_or_create(conn, name).await?;
        outcome.items.push(item);
    }

    Ok(outcome)
}

/// Pool-level entry points for the inventory screens.
#[derive(Clone)]
pub struct LedgerService {
    db_pool: Arc<DbPool>,
}

impl LedgerService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Applies all targets as one unit of work.
    #[instrument(skip(self, targets), fields(count = targets.len()))]
    pub async fn adjust(
        &self,
        targets: Vec<AdjustmentTarget>,
        user_id: i32,
    ) -> Result<AdjustmentOutcome, ServiceError> {
        let outcome = DatabaseAccess::new(self.db_pool.clone())
            .transaction(move |txn| {
                Box::pin(async move { adjust_to_targets(txn, &targets, user_id).await })
            })
            .await?;

        info!(
            user_id,
            recorded = outcome.transactions_recorded,
            "inventory adjusted"
        );
        Ok(outcome)
    }

    /// Catalog items are created first so the screen always lists them.
    pub async fn list_items(&self) -> Result<Vec<inventory_item::Model>, ServiceError> {
        let db = self.db_pool.as_ref();
        crate::catalog::ensure_catalog_items(db).await?;
        InventoryStore::list_catalog_first(db).await
    }

    pub async fn items_by_name(&self) -> Result<Vec<inventory_item::Model>, ServiceError> {
        InventoryStore::list_by_name(self.db_pool.as_ref()).await
    }

    pub async fn transactions(
        &self,
        filter: &TransactionFilter,
        page: u64,
        per_page: u64,
    ) -> Result<Page<inventory_transaction::Model>, ServiceError> {
        TransactionLog::list_page(self.db_pool.as_ref(), filter, page, per_page).await
    }

    pub async fn all_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<inventory_transaction::Model>, ServiceError> {
        TransactionLog::list_all(self.db_pool.as_ref(), filter).await
    }
}
