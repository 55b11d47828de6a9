use crate::entities::{
    inventory_item::{self, Entity as InventoryItem},
    sea_orm_active_enums::QuantityUnit,
};
use crate::errors::ServiceError;
use chrono::Utc;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tracing::debug;

/// Keyed stock balances, one row per product name.
#[derive(Debug, Clone, Copy, Default)]
pub struct InventoryStore;

impl InventoryStore {
    pub async fn find<C>(conn: &C, product_name: &str) -> Result<Option<inventory_item::Model>, ServiceError>
    where
        C: ConnectionTrait,
    {
        InventoryItem::find()
            .filter(inventory_item::Column::ProductName.eq(product_name))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Returns the item for `product_name`, creating it at zero on both tracks if absent.
    ///
    /// The insert ignores a conflicting row so two writers racing on a new
    /// product both end up reading the same item.
    pub async fn get_or_create<C>(conn: &C, product_name: &str) -> Result<inventory_item::Model, ServiceError>
    where
        C: ConnectionTrait,
    {
        if let Some(item) = Self::find(conn, product_name).await? {
            return Ok(item);
        }

        let seed = inventory_item::ActiveModel {
            product_name: Set(product_name.to_owned()),
            quantity_unit: Set(0.0),
            quantity_meter: Set(0.0),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };

        InventoryItem::insert(seed)
            .on_conflict(
                OnConflict::column(inventory_item::Column::ProductName)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await
            .map_err(ServiceError::db_error)?;
        debug!(product_name, "inventory item created");

        Self::find(conn, product_name).await?.ok_or_else(|| {
            ServiceError::InternalError(format!("Inventory item {product_name} vanished after insert"))
        })
    }

    /// Adds `delta` to one track of the product's balance and returns the updated row.
    ///
    /// The increment is done in SQL so concurrent writers serialize on the row.
    /// Negative results are stored as-is.
    pub async fn apply_delta<C>(
        conn: &C,
        product_name: &str,
        unit: QuantityUnit,
        delta: f64,
    ) -> Result<inventory_item::Model, ServiceError>
    where
        C: ConnectionTrait,
    {
        let item = Self::get_or_create(conn, product_name).await?;
        let column = inventory_item::Column::for_unit(unit);

        InventoryItem::update_many()
            .col_expr(column, Expr::col(column).add(delta))
            .col_expr(inventory_item::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(inventory_item::Column::Id.eq(item.id))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;

        InventoryItem::find_by_id(item.id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Inventory item {product_name} not found")))
    }

    pub async fn list_by_name<C>(conn: &C) -> Result<Vec<inventory_item::Model>, ServiceError>
    where
        C: ConnectionTrait,
    {
        InventoryItem::find()
            .order_by_asc(inventory_item::Column::ProductName)
            .all(conn)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Catalog products first in catalog order, then everything else by name.
    pub async fn list_catalog_first<C>(conn: &C) -> Result<Vec<inventory_item::Model>, ServiceError>
    where
        C: ConnectionTrait,
    {
        let mut items = Self::list_by_name(conn).await?;
        items.sort_by_key(|item| crate::catalog::position(&item.product_name).unwrap_or(usize::MAX));
        Ok(items)
    }
}
