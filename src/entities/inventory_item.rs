use super::sea_orm_active_enums::QuantityUnit;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Current stock of one product, kept on two independent tracks.
///
/// Rows are keyed by the exact product name. Balances may go negative.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "inventory_items")]
#[schema(as = InventoryItem)]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub product_name: String,
    #[sea_orm(column_type = "Double")]
    pub quantity_unit: f64,
    #[sea_orm(column_type = "Double")]
    pub quantity_meter: f64,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Model {
    pub fn balance(&self, unit: QuantityUnit) -> f64 {
        match unit {
            QuantityUnit::Unit => self.quantity_unit,
            QuantityUnit::Meter => self.quantity_meter,
        }
    }
}

impl Column {
    /// Balance column backing the given track
    pub fn for_unit(unit: QuantityUnit) -> Self {
        match unit {
            QuantityUnit::Unit => Column::QuantityUnit,
            QuantityUnit::Meter => Column::QuantityMeter,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
