use anyhow::Result;
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::prelude::*;
use std::time::Duration;
use tracing::{error, info};

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_users_table::Migration),
            Box::new(m20240101_000002_create_company_projects_table::Migration),
            Box::new(m20240101_000003_create_reports_table::Migration),
            Box::new(m20240101_000004_create_report_attachments_tables::Migration),
            Box::new(m20240101_000005_create_inventory_tables::Migration),
            Box::new(m20240301_000001_rename_pp_tape_product::Migration),
        ]
    }
}

mod m20240101_000001_create_users_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_users_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Users::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(Users::Username)
                                .string_len(80)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                        .col(
                            ColumnDef::new(Users::Role)
                                .string_len(16)
                                .not_null()
                                .default("user"),
                        )
                        .col(ColumnDef::new(Users::FullName).string_len(120).not_null())
                        .col(
                            ColumnDef::new(Users::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Users::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Users {
        Table,
        Id,
        Username,
        PasswordHash,
        Role,
        FullName,
        IsActive,
        CreatedAt,
    }
}

mod m20240101_000002_create_company_projects_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_company_projects_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CompanyProjects::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CompanyProjects::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(CompanyProjects::Name)
                                .string_len(200)
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(CompanyProjects::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(CompanyProjects::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CompanyProjects::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum CompanyProjects {
        Table,
        Id,
        Name,
        IsActive,
        CreatedAt,
    }
}

mod m20240101_000003_create_reports_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_reports_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Reports::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Reports::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Reports::UserId).integer().not_null())
                        .col(ColumnDef::new(Reports::ReportType).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Reports::CustomerName)
                                .string_len(200)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Reports::CompanyProject).string_len(200).null())
                        .col(ColumnDef::new(Reports::Address).string_len(300).not_null())
                        .col(
                            ColumnDef::new(Reports::Status)
                                .string_len(20)
                                .not_null()
                                .default("completed"),
                        )
                        .col(ColumnDef::new(Reports::Timestamp).timestamp().not_null())
                        .col(ColumnDef::new(Reports::Notes).text().null())
                        .col(ColumnDef::new(Reports::InstallationType).string_len(500).null())
                        .col(ColumnDef::new(Reports::InstallationTypes).text().null())
                        .col(ColumnDef::new(Reports::ProtectionsCount).integer().null())
                        .col(
                            ColumnDef::new(Reports::Synced)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Reports::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Reports::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_reports_user_id")
                                .from(Reports::Table, Reports::UserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_reports_user_id")
                        .table(Reports::Table)
                        .col(Reports::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_reports_timestamp")
                        .table(Reports::Table)
                        .col(Reports::Timestamp)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Reports::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Reports {
        Table,
        Id,
        UserId,
        ReportType,
        CustomerName,
        CompanyProject,
        Address,
        Status,
        Timestamp,
        Notes,
        InstallationType,
        InstallationTypes,
        ProtectionsCount,
        Synced,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Users {
        Table,
        Id,
    }
}

mod m20240101_000004_create_report_attachments_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_report_attachments_tables"
        }
    }

    fn report_fk(
        name: &str,
        table: impl IntoIden + 'static,
        column: impl IntoIden + 'static,
    ) -> ForeignKeyCreateStatement {
        ForeignKey::create()
            .name(name)
            .from(table, column)
            .to(Reports::Table, Reports::Id)
            .on_delete(ForeignKeyAction::Cascade)
            .to_owned()
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ReportProducts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ReportProducts::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(ReportProducts::ReportId).integer().not_null())
                        .col(
                            ColumnDef::new(ReportProducts::ProductName)
                                .string_len(200)
                                .not_null(),
                        )
                        .col(ColumnDef::new(ReportProducts::Quantity).double().not_null())
                        .col(
                            ColumnDef::new(ReportProducts::QuantityUnit)
                                .string_len(10)
                                .not_null()
                                .default("unit"),
                        )
                        .foreign_key(&mut report_fk(
                            "fk_report_products_report_id",
                            ReportProducts::Table,
                            ReportProducts::ReportId,
                        ))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ReportImages::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ReportImages::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(ReportImages::ReportId).integer().not_null())
                        .col(ColumnDef::new(ReportImages::ImagePath).string_len(500).not_null())
                        .col(ColumnDef::new(ReportImages::ImageType).string_len(10).not_null())
                        .col(
                            ColumnDef::new(ReportImages::UploadedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(&mut report_fk(
                            "fk_report_images_report_id",
                            ReportImages::Table,
                            ReportImages::ReportId,
                        ))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ReportDocuments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ReportDocuments::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(ReportDocuments::ReportId).integer().not_null())
                        .col(
                            ColumnDef::new(ReportDocuments::DocumentPath)
                                .string_len(500)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReportDocuments::OriginalFilename)
                                .string_len(255)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ReportDocuments::UploadedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(&mut report_fk(
                            "fk_report_documents_report_id",
                            ReportDocuments::Table,
                            ReportDocuments::ReportId,
                        ))
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_report_products_report_id")
                        .table(ReportProducts::Table)
                        .col(ReportProducts::ReportId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ReportDocuments::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ReportImages::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ReportProducts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ReportProducts {
        Table,
        Id,
        ReportId,
        ProductName,
        Quantity,
        QuantityUnit,
    }

    #[derive(DeriveIden)]
    enum ReportImages {
        Table,
        Id,
        ReportId,
        ImagePath,
        ImageType,
        UploadedAt,
    }

    #[derive(DeriveIden)]
    enum ReportDocuments {
        Table,
        Id,
        ReportId,
        DocumentPath,
        OriginalFilename,
        UploadedAt,
    }

    #[derive(DeriveIden)]
    enum Reports {
        Table,
        Id,
    }
}

mod m20240101_000005_create_inventory_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_inventory_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryItems::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::ProductName)
                                .string_len(200)
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::QuantityUnit)
                                .double()
                                .not_null()
                                .default(0.0),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::QuantityMeter)
                                .double()
                                .not_null()
                                .default(0.0),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // No foreign keys: history must outlive reports and users.
            manager
                .create_table(
                    Table::create()
                        .table(InventoryTransactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryTransactions::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::ProductName)
                                .string_len(200)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::ChangeType)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::Quantity)
                                .double()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::Unit)
                                .string_len(10)
                                .not_null()
                                .default("unit"),
                        )
                        .col(ColumnDef::new(InventoryTransactions::ReportId).integer().null())
                        .col(ColumnDef::new(InventoryTransactions::UserId).integer().null())
                        .col(
                            ColumnDef::new(InventoryTransactions::Notes)
                                .string_len(500)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_transactions_product_name")
                        .table(InventoryTransactions::Table)
                        .col(InventoryTransactions::ProductName)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_transactions_created_at")
                        .table(InventoryTransactions::Table)
                        .col(InventoryTransactions::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryTransactions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(InventoryItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum InventoryItems {
        Table,
        Id,
        ProductName,
        QuantityUnit,
        QuantityMeter,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum InventoryTransactions {
        Table,
        Id,
        ProductName,
        ChangeType,
        Quantity,
        Unit,
        ReportId,
        UserId,
        Notes,
        CreatedAt,
    }
}

/// The PP board used to be called "PP Tape"; existing rows are renamed in place.
/// When both names hold stock the legacy balance is folded into the new row.
mod m20240301_000001_rename_pp_tape_product {
    use crate::catalog::PP_BOARD;
    use sea_orm::ConnectionTrait;
    use sea_orm_migration::prelude::*;

    const LEGACY_NAME: &str = "PP Tape";

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_rename_pp_tape_product"
        }
    }

    fn balance_of(name: &str) -> SelectStatement {
        Query::select()
            .columns([InventoryItems::QuantityUnit, InventoryItems::QuantityMeter])
            .from(InventoryItems::Table)
            .and_where(Expr::col(InventoryItems::ProductName).eq(name))
            .to_owned()
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let db = manager.get_connection();
            let backend = db.get_database_backend();
            let legacy = db.query_one(backend.build(&balance_of(LEGACY_NAME))).await?;
            let current = db.query_one(backend.build(&balance_of(PP_BOARD))).await?;

            match (legacy, current) {
                (Some(legacy), Some(current)) => {
                    let unit = legacy.try_get::<f64>("", "quantity_unit")?
                        + current.try_get::<f64>("", "quantity_unit")?;
                    let meter = legacy.try_get::<f64>("", "quantity_meter")?
                        + current.try_get::<f64>("", "quantity_meter")?;
                    manager
                        .exec_stmt(
                            Query::update()
                                .table(InventoryItems::Table)
                                .value(InventoryItems::QuantityUnit, unit)
                                .value(InventoryItems::QuantityMeter, meter)
                                .and_where(Expr::col(InventoryItems::ProductName).eq(PP_BOARD))
                                .to_owned(),
                        )
                        .await?;
                    manager
                        .exec_stmt(
                            Query::delete()
                                .from_table(InventoryItems::Table)
                                .and_where(Expr::col(InventoryItems::ProductName).eq(LEGACY_NAME))
                                .to_owned(),
                        )
                        .await?;
                }
                (Some(_), None) => {
                    manager
                        .exec_stmt(
                            Query::update()
                                .table(InventoryItems::Table)
                                .value(InventoryItems::ProductName, PP_BOARD)
                                .and_where(Expr::col(InventoryItems::ProductName).eq(LEGACY_NAME))
                                .to_owned(),
                        )
                        .await?;
                }
                (None, _) => {}
            }

            manager
                .exec_stmt(
                    Query::update()
                        .table(ReportProducts::Table)
                        .value(ReportProducts::ProductName, PP_BOARD)
                        .and_where(Expr::col(ReportProducts::ProductName).eq(LEGACY_NAME))
                        .to_owned(),
                )
                .await?;

            manager
                .exec_stmt(
                    Query::update()
                        .table(InventoryTransactions::Table)
                        .value(InventoryTransactions::ProductName, PP_BOARD)
                        .and_where(Expr::col(InventoryTransactions::ProductName).eq(LEGACY_NAME))
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, _manager: &SchemaManager) -> Result<(), DbErr> {
            Ok(())
        }
    }

    #[derive(DeriveIden)]
    enum InventoryItems {
        Table,
        ProductName,
        QuantityUnit,
        QuantityMeter,
    }

    #[derive(DeriveIden)]
    enum ReportProducts {
        Table,
        ProductName,
    }

    #[derive(DeriveIden)]
    enum InventoryTransactions {
        Table,
        ProductName,
    }
}

/// Connects to `db_url` and applies all pending migrations.
pub async fn run_migration(db_url: &str) -> Result<()> {
    info!("Setting up database connection for migrations");

    let mut opt = ConnectOptions::new(db_url);
    opt.max_connections(2)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .sqlx_logging(true);

    let db = Database::connect(opt).await?;

    match Migrator::up(&db, None).await {
        Ok(_) => {
            info!("Migrations completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Migration failed: {}", e);
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ConnectionTrait, Statement};

    #[tokio::test]
    async fn migrations_apply_and_rename_legacy_product() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, Some(5)).await.unwrap();

        let backend = db.get_database_backend();
        db.execute(Statement::from_string(
            backend,
            "INSERT INTO inventory_items (product_name, quantity_unit, quantity_meter, updated_at) \
             VALUES ('PP Tape', 4.0, 0.0, '2024-01-01T00:00:00Z')"
                .to_string(),
        ))
        .await
        .unwrap();

        Migrator::up(&db, None).await.unwrap();

        let row = db
            .query_one(Statement::from_string(
                backend,
                "SELECT product_name FROM inventory_items".to_string(),
            ))
            .await
            .unwrap()
            .unwrap();
        let name: String = row.try_get("", "product_name").unwrap();
        assert_eq!(name, crate::catalog::PP_BOARD);
    }

    #[tokio::test]
    async fn legacy_balance_is_merged_into_the_renamed_product() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, Some(5)).await.unwrap();

        let backend = db.get_database_backend();
        db.execute(Statement::from_string(
            backend,
            format!(
                "INSERT INTO inventory_items (product_name, quantity_unit, quantity_meter, updated_at) \
                 VALUES ('PP Tape', 4.0, 1.5, '2024-01-01T00:00:00Z'), \
                        ('{}', -2.0, 0.5, '2024-01-01T00:00:00Z')",
                crate::catalog::PP_BOARD
            ),
        ))
        .await
        .unwrap();

        Migrator::up(&db, None).await.unwrap();

        let rows = db
            .query_all(Statement::from_string(
                backend,
                "SELECT product_name, quantity_unit, quantity_meter FROM inventory_items".to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        let name: String = rows[0].try_get("", "product_name").unwrap();
        let unit: f64 = rows[0].try_get("", "quantity_unit").unwrap();
        let meter: f64 = rows[0].try_get("", "quantity_meter").unwrap();
        assert_eq!(name, crate::catalog::PP_BOARD);
        assert_eq!(unit, 2.0);
        assert_eq!(meter, 2.0);
    }
}
