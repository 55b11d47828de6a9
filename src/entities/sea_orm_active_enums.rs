use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

/// Account role
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UserRole {
    #[sea_orm(string_value = "user")]
    User,
    #[sea_orm(string_value = "admin")]
    Admin,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReportType {
    #[sea_orm(string_value = "delivery")]
    Delivery,
    #[sea_orm(string_value = "installation")]
    Installation,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReportStatus {
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "return_required")]
    ReturnRequired,
}

/// Stock track a quantity is counted in
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QuantityUnit {
    /// Discrete pieces
    #[sea_orm(string_value = "unit")]
    Unit,
    /// Linear meters
    #[sea_orm(string_value = "meter")]
    Meter,
}

impl QuantityUnit {
    /// Maps free-form input onto a track. Anything that is not `meter` counts as units.
    pub fn coerce(raw: Option<&str>) -> Self {
        match raw.map(|value| value.trim().to_ascii_lowercase()) {
            Some(value) if value == "meter" => QuantityUnit::Meter,
            _ => QuantityUnit::Unit,
        }
    }
}

impl From<&str> for QuantityUnit {
    fn from(raw: &str) -> Self {
        QuantityUnit::coerce(Some(raw))
    }
}

/// Cause recorded on an inventory transaction
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeType {
    /// Consumption when a report is submitted
    #[sea_orm(string_value = "report")]
    Report,
    /// Reversal or re-application while a report is edited or removed
    #[sea_orm(string_value = "report_edit")]
    ReportEdit,
    /// Manual correction by an administrator
    #[sea_orm(string_value = "adjustment")]
    Adjustment,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ImageType {
    /// Photo of delivered goods
    #[sea_orm(string_value = "goods")]
    Goods,
    /// Photo of the installation site
    #[sea_orm(string_value = "project")]
    Project,
}

impl From<ReportType> for ImageType {
    fn from(report_type: ReportType) -> Self {
        match report_type {
            ReportType::Delivery => ImageType::Goods,
            ReportType::Installation => ImageType::Project,
        }
    }
}
