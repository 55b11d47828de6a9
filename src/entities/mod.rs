//! SeaORM entities for the field reporting schema.

pub mod company_project;
pub mod inventory_item;
pub mod inventory_transaction;
pub mod report;
pub mod report_document;
pub mod report_image;
pub mod report_product;
pub mod sea_orm_active_enums;
pub mod user;

pub mod prelude {
    pub use super::company_project::Entity as CompanyProject;
    pub use super::inventory_item::Entity as InventoryItem;
    pub use super::inventory_transaction::Entity as InventoryTransaction;
    pub use super::report::Entity as Report;
    pub use super::report_document::Entity as ReportDocument;
    pub use super::report_image::Entity as ReportImage;
    pub use super::report_product::Entity as ReportProduct;
    pub use super::user::Entity as User;
}
