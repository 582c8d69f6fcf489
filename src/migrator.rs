// The `MigrationTrait` methods elide the `SchemaManager` lifetime in the
// upstream trait definition; spelling it as `<'_>` here trips E0195 under
// `async_trait`, so the elided-lifetimes idiom lint must be allowed.
#![allow(elided_lifetimes_in_paths)]

use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_library_tables::Migration),
            Box::new(m20240101_000002_create_inventory_tables::Migration),
            Box::new(m20240101_000003_create_order_tables::Migration),
            Box::new(m20240101_000004_create_invoice_tables::Migration),
            Box::new(m20240101_000005_create_exam_tables::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_library_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_library_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Books::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Books::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Books::Title).string().not_null())
                        .col(ColumnDef::new(Books::Author).string().null())
                        .col(ColumnDef::new(Books::Isbn).string().null())
                        .col(ColumnDef::new(Books::TotalCopies).integer().not_null())
                        .col(
                            ColumnDef::new(Books::AvailableCopies)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Books::Version).integer().not_null().default(1))
                        .col(
                            ColumnDef::new(Books::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Books::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(BookLoans::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(BookLoans::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(BookLoans::BookId).uuid().not_null())
                        .col(ColumnDef::new(BookLoans::BorrowerId).uuid().not_null())
                        .col(ColumnDef::new(BookLoans::Status).string().not_null())
                        .col(
                            ColumnDef::new(BookLoans::IssuedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BookLoans::DueDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(BookLoans::ReturnedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(BookLoans::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BookLoans::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_book_loans_book_id")
                        .table(BookLoans::Table)
                        .col(BookLoans::BookId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BookLoans::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Books::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Books {
        Table,
        Id,
        Title,
        Author,
        Isbn,
        TotalCopies,
        AvailableCopies,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum BookLoans {
        Table,
        Id,
        BookId,
        BorrowerId,
        Status,
        IssuedAt,
        DueDate,
        ReturnedAt,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_inventory_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_inventory_tables"
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
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::Sku)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(InventoryItems::Name).string().not_null())
                        .col(
                            ColumnDef::new(InventoryItems::QuantityInStock)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::UnitPrice)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ItemIssuances::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ItemIssuances::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ItemIssuances::ItemId).uuid().not_null())
                        .col(ColumnDef::new(ItemIssuances::RecipientId).uuid().not_null())
                        .col(ColumnDef::new(ItemIssuances::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(ItemIssuances::IssuedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_item_issuances_item_id")
                        .table(ItemIssuances::Table)
                        .col(ItemIssuances::ItemId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ItemIssuances::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(InventoryItems::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum InventoryItems {
        Table,
        Id,
        Sku,
        Name,
        QuantityInStock,
        UnitPrice,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum ItemIssuances {
        Table,
        Id,
        ItemId,
        RecipientId,
        Quantity,
        IssuedAt,
    }
}

mod m20240101_000003_create_order_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Orders::OrderCode)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Orders::PlacedBy).uuid().not_null())
                        .col(ColumnDef::new(Orders::Status).string().not_null())
                        .col(
                            ColumnDef::new(Orders::TotalAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::Version).integer().not_null().default(1))
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(OrderItems::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::ItemId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(OrderItems::UnitPrice)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Orders {
        Table,
        Id,
        OrderCode,
        PlacedBy,
        Status,
        TotalAmount,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        ItemId,
        Quantity,
        UnitPrice,
    }
}

mod m20240101_000004_create_invoice_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_invoice_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(FeeInvoices::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(FeeInvoices::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(FeeInvoices::InvoiceNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(FeeInvoices::StudentId).uuid().not_null())
                        .col(ColumnDef::new(FeeInvoices::Amount).decimal().not_null())
                        .col(ColumnDef::new(FeeInvoices::Description).string().null())
                        .col(ColumnDef::new(FeeInvoices::Status).string().not_null())
                        .col(
                            ColumnDef::new(FeeInvoices::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(FeeInvoices::IssuedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(FeeInvoices::PaidAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(FeeInvoices::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Payments::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Payments::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Payments::InvoiceId).uuid().not_null())
                        .col(ColumnDef::new(Payments::PayerId).uuid().not_null())
                        .col(ColumnDef::new(Payments::Amount).decimal().not_null())
                        .col(ColumnDef::new(Payments::Method).string().null())
                        .col(
                            ColumnDef::new(Payments::PaidAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_payments_invoice_id")
                        .table(Payments::Table)
                        .col(Payments::InvoiceId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Payments::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(FeeInvoices::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum FeeInvoices {
        Table,
        Id,
        InvoiceNumber,
        StudentId,
        Amount,
        Description,
        Status,
        Version,
        IssuedAt,
        PaidAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum Payments {
        Table,
        Id,
        InvoiceId,
        PayerId,
        Amount,
        Method,
        PaidAt,
    }
}

mod m20240101_000005_create_exam_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_exam_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ExamSessions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ExamSessions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ExamSessions::ExamName).string().not_null())
                        .col(
                            ColumnDef::new(ExamSessions::ScheduledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(ExamSessions::Capacity).integer().not_null())
                        .col(
                            ColumnDef::new(ExamSessions::RegisteredCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ExamSessions::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(ExamSessions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ExamSessions::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ExamRegistrations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ExamRegistrations::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ExamRegistrations::ExamSessionId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ExamRegistrations::StudentId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ExamRegistrations::Status).string().not_null())
                        .col(
                            ColumnDef::new(ExamRegistrations::RegisteredAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ExamRegistrations::CancelledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            // One seat per student per session, enforced at the store.
            manager
                .create_index(
                    Index::create()
                        .name("uq_exam_registrations_session_student")
                        .table(ExamRegistrations::Table)
                        .col(ExamRegistrations::ExamSessionId)
                        .col(ExamRegistrations::StudentId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ExamRegistrations::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ExamSessions::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum ExamSessions {
        Table,
        Id,
        ExamName,
        ScheduledAt,
        Capacity,
        RegisteredCount,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum ExamRegistrations {
        Table,
        Id,
        ExamSessionId,
        StudentId,
        Status,
        RegisteredAt,
        CancelledAt,
    }
}
