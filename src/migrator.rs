use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_stock_records_table::Migration),
            Box::new(m20250301_000002_create_stock_ledger_entries_table::Migration),
            Box::new(m20250301_000003_create_order_lines_table::Migration),
            Box::new(m20250301_000004_create_shipment_allocations_table::Migration),
        ]
    }
}

// Migration implementations

mod m20250301_000001_create_stock_records_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000001_create_stock_records_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockRecords::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockRecords::Id)
                                .big_integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockRecords::CustomerId).string().not_null())
                        .col(ColumnDef::new(StockRecords::ProductName).string().not_null())
                        .col(ColumnDef::new(StockRecords::Barcode).string().not_null())
                        .col(ColumnDef::new(StockRecords::Location).string())
                        .col(ColumnDef::new(StockRecords::ExpirationDate).date())
                        .col(ColumnDef::new(StockRecords::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(StockRecords::SafeQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockRecords::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockRecords::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Identity key: one row per (customer, barcode, expiration). NULL
            // expirations are distinct under SQL semantics; the store enforces
            // the single-undated-lot rule in code on top of this index.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uidx_stock_records_identity_key")
                        .table(StockRecords::Table)
                        .col(StockRecords::CustomerId)
                        .col(StockRecords::Barcode)
                        .col(StockRecords::ExpirationDate)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_records_customer_barcode")
                        .table(StockRecords::Table)
                        .col(StockRecords::CustomerId)
                        .col(StockRecords::Barcode)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockRecords::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum StockRecords {
        Table,
        Id,
        CustomerId,
        ProductName,
        Barcode,
        Location,
        ExpirationDate,
        Quantity,
        SafeQuantity,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250301_000002_create_stock_ledger_entries_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000002_create_stock_ledger_entries_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockLedgerEntries::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockLedgerEntries::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockLedgerEntries::StockRecordId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockLedgerEntries::CustomerId)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockLedgerEntries::ProductName)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockLedgerEntries::PreviousQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockLedgerEntries::ChangeQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockLedgerEntries::NewQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockLedgerEntries::PreviousLocation).string())
                        .col(ColumnDef::new(StockLedgerEntries::NewLocation).string())
                        .col(ColumnDef::new(StockLedgerEntries::Reason).string().not_null())
                        .col(ColumnDef::new(StockLedgerEntries::Actor).string().not_null())
                        .col(
                            ColumnDef::new(StockLedgerEntries::CreatedAt)
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
                        .name("idx_stock_ledger_entries_stock_record_id")
                        .table(StockLedgerEntries::Table)
                        .col(StockLedgerEntries::StockRecordId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_ledger_entries_customer_id")
                        .table(StockLedgerEntries::Table)
                        .col(StockLedgerEntries::CustomerId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_ledger_entries_created_at")
                        .table(StockLedgerEntries::Table)
                        .col(StockLedgerEntries::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockLedgerEntries::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum StockLedgerEntries {
        Table,
        Id,
        StockRecordId,
        CustomerId,
        ProductName,
        PreviousQuantity,
        ChangeQuantity,
        NewQuantity,
        PreviousLocation,
        NewLocation,
        Reason,
        Actor,
        CreatedAt,
    }
}

mod m20250301_000003_create_order_lines_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000003_create_order_lines_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OrderLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderLines::Id)
                                .big_integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderLines::OrderNumber).string().not_null())
                        .col(ColumnDef::new(OrderLines::CustomerId).string().not_null())
                        .col(ColumnDef::new(OrderLines::Barcode).string().not_null())
                        .col(
                            ColumnDef::new(OrderLines::RequestedQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderLines::TargetStockRecordId).big_integer())
                        .col(ColumnDef::new(OrderLines::Status).string().not_null())
                        .col(
                            ColumnDef::new(OrderLines::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderLines::UpdatedAt)
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
                        .name("idx_order_lines_order_number")
                        .table(OrderLines::Table)
                        .col(OrderLines::OrderNumber)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_lines_customer_barcode_status")
                        .table(OrderLines::Table)
                        .col(OrderLines::CustomerId)
                        .col(OrderLines::Barcode)
                        .col(OrderLines::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderLines::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum OrderLines {
        Table,
        Id,
        OrderNumber,
        CustomerId,
        Barcode,
        RequestedQuantity,
        TargetStockRecordId,
        Status,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250301_000004_create_shipment_allocations_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000004_create_shipment_allocations_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ShipmentAllocations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ShipmentAllocations::Id)
                                .big_integer()
                                .auto_increment()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ShipmentAllocations::OrderNumber)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ShipmentAllocations::CustomerId)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ShipmentAllocations::Barcode)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ShipmentAllocations::StockRecordId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ShipmentAllocations::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ShipmentAllocations::CancelledAt)
                                .timestamp_with_time_zone(),
                        )
                        .col(
                            ColumnDef::new(ShipmentAllocations::CreatedAt)
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
                        .name("idx_shipment_allocations_order_barcode")
                        .table(ShipmentAllocations::Table)
                        .col(ShipmentAllocations::OrderNumber)
                        .col(ShipmentAllocations::Barcode)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ShipmentAllocations::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum ShipmentAllocations {
        Table,
        Id,
        OrderNumber,
        CustomerId,
        Barcode,
        StockRecordId,
        Quantity,
        CancelledAt,
        CreatedAt,
    }
}
