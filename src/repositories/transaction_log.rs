use super::Page;
use crate::entities::{
    inventory_transaction::{self, Entity as InventoryTransaction},
    sea_orm_active_enums::{ChangeType, QuantityUnit},
};
use crate::errors::ServiceError;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Select, Set,
};

/// Longest note kept on a transaction row
pub const MAX_NOTE_CHARS: usize = 500;

/// Entry to append to the log
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub product_name: String,
    pub change_type: ChangeType,
    pub quantity: f64,
    pub unit: QuantityUnit,
    pub report_id: Option<i32>,
    pub user_id: Option<i32>,
    pub notes: Option<String>,
}

/// Optional narrowing for transaction listings
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub product_name: Option<String>,
    pub report_id: Option<i32>,
}

/// Append-only history of balance changes. Rows are never updated or removed here.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionLog;

impl TransactionLog {
    pub async fn append<C>(
        conn: &C,
        entry: NewTransaction,
    ) -> Result<inventory_transaction::Model, ServiceError>
    where
        C: ConnectionTrait,
    {
        let notes = entry
            .notes
            .map(|note| note.chars().take(MAX_NOTE_CHARS).collect::<String>());

        inventory_transaction::ActiveModel {
            product_name: Set(entry.product_name),
            change_type: Set(entry.change_type),
            quantity: Set(entry.quantity),
            unit: Set(entry.unit),
            report_id: Set(entry.report_id),
            user_id: Set(entry.user_id),
            notes: Set(notes),
            ..Default::default()
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)
    }

    fn newest_first(filter: &TransactionFilter) -> Select<InventoryTransaction> {
        let mut query = InventoryTransaction::find();
        if let Some(name) = filter.product_name.as_deref().filter(|n| !n.is_empty()) {
            query = query.filter(inventory_transaction::Column::ProductName.eq(name));
        }
        if let Some(report_id) = filter.report_id {
            query = query.filter(inventory_transaction::Column::ReportId.eq(report_id));
        }
        query
            .order_by_desc(inventory_transaction::Column::CreatedAt)
            .order_by_desc(inventory_transaction::Column::Id)
    }

    /// `page` is 1-based.
    pub async fn list_page<C>(
        conn: &C,
        filter: &TransactionFilter,
        page: u64,
        per_page: u64,
    ) -> Result<Page<inventory_transaction::Model>, ServiceError>
    where
        C: ConnectionTrait,
    {
        let paginator = Self::newest_first(filter).paginate(conn, per_page.max(1));
        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let items = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;
        Ok(Page { items, total })
    }

    pub async fn list_all<C>(
        conn: &C,
        filter: &TransactionFilter,
    ) -> Result<Vec<inventory_transaction::Model>, ServiceError>
    where
        C: ConnectionTrait,
    {
        Self::newest_first(filter)
            .all(conn)
            .await
            .map_err(ServiceError::db_error)
    }

    pub async fn for_product<C>(
        conn: &C,
        product_name: &str,
    ) -> Result<Vec<inventory_transaction::Model>, ServiceError>
    where
        C: ConnectionTrait,
    {
        InventoryTransaction::find()
            .filter(inventory_transaction::Column::ProductName.eq(product_name))
            .order_by_asc(inventory_transaction::Column::Id)
            .all(conn)
            .await
            .map_err(ServiceError::db_error)
    }

    pub async fn count<C>(conn: &C) -> Result<u64, ServiceError>
    where
        C: ConnectionTrait,
    {
        InventoryTransaction::find()
            .count(conn)
            .await
            .map_err(ServiceError::db_error)
    }
}
