// SchemaManager's lifetime must stay elided: sea-orm-migration's
// async_trait methods treat an explicit `'_` as early-bound (E0195).
#![allow(elided_lifetimes_in_paths)]

use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_catalog_tables::Migration),
            Box::new(m20240101_000002_create_cart_tables::Migration),
            Box::new(m20240101_000003_create_order_tables::Migration),
            Box::new(m20240101_000004_create_payment_and_audit_tables::Migration),
        ]
    }
}

mod m20240101_000001_create_catalog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Categories::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Categories::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Categories::Name)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Categories::Slug)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Categories::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Description).text().null())
                        .col(
                            ColumnDef::new(Products::Price)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::Stock)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Products::CategoryId).uuid().null())
                        .col(
                            ColumnDef::new(Products::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_products_category")
                                .from(Products::Table, Products::CategoryId)
                                .to(Categories::Table, Categories::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PriceHistory::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PriceHistory::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PriceHistory::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(PriceHistory::Price)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PriceHistory::ValidFrom)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PriceHistory::ValidTo)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PriceHistory::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_price_history_product")
                                .from(PriceHistory::Table, PriceHistory::ProductId)
                                .to(Products::Table, Products::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_price_history_product_valid_to")
                        .table(PriceHistory::Table)
                        .col(PriceHistory::ProductId)
                        .col(PriceHistory::ValidTo)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PriceHistory::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Categories::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Categories {
        Table,
        Id,
        Name,
        Slug,
        CreatedAt,
    }

    #[derive(Iden)]
    enum Products {
        Table,
        Id,
        Name,
        Description,
        Price,
        Stock,
        CategoryId,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum PriceHistory {
        Table,
        Id,
        ProductId,
        Price,
        ValidFrom,
        ValidTo,
        CreatedAt,
    }
}

mod m20240101_000002_create_cart_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_cart_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Carts::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Carts::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Carts::UserId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Carts::IsLocked)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Carts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Carts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CartItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CartItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CartItems::CartId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(CartItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_items_cart")
                                .from(CartItems::Table, CartItems::CartId)
                                .to(Carts::Table, Carts::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // One line per product per cart.
            manager
                .create_index(
                    Index::create()
                        .name("idx_cart_items_cart_product")
                        .table(CartItems::Table)
                        .col(CartItems::CartId)
                        .col(CartItems::ProductId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CartItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Carts::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Carts {
        Table,
        Id,
        UserId,
        IsLocked,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum CartItems {
        Table,
        Id,
        CartId,
        ProductId,
        Quantity,
        CreatedAt,
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
                        .table(Addresses::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Addresses::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Addresses::UserId).uuid().not_null())
                        .col(ColumnDef::new(Addresses::Label).string().not_null())
                        .col(ColumnDef::new(Addresses::FullName).string().not_null())
                        .col(ColumnDef::new(Addresses::Phone).string().not_null())
                        .col(ColumnDef::new(Addresses::Line1).string().not_null())
                        .col(ColumnDef::new(Addresses::City).string().not_null())
                        .col(ColumnDef::new(Addresses::PostalCode).string().not_null())
                        .col(
                            ColumnDef::new(Addresses::IsDefault)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Addresses::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Addresses::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::UserId).uuid().not_null())
                        .col(
                            ColumnDef::new(Orders::FollowUpCode)
                                .big_integer()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Orders::Status).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Orders::TotalAmount)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::ShippingFullName)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::ShippingPhone).string().not_null())
                        .col(ColumnDef::new(Orders::ShippingAddress).string().not_null())
                        .col(ColumnDef::new(Orders::ShippingCity).string().not_null())
                        .col(
                            ColumnDef::new(Orders::ShippingPostalCode)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::IsPaid)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
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
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(OrderItems::Price)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_order")
                                .from(OrderItems::Table, OrderItems::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_product")
                                .from(OrderItems::Table, OrderItems::ProductId)
                                .to(Products::Table, Products::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_order_items_order")
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
                .await?;
            manager
                .drop_table(Table::drop().table(Addresses::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Addresses {
        Table,
        Id,
        UserId,
        Label,
        FullName,
        Phone,
        Line1,
        City,
        PostalCode,
        IsDefault,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum Orders {
        Table,
        Id,
        UserId,
        FollowUpCode,
        Status,
        TotalAmount,
        ShippingFullName,
        ShippingPhone,
        ShippingAddress,
        ShippingCity,
        ShippingPostalCode,
        IsPaid,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        Quantity,
        Price,
        CreatedAt,
    }

    #[derive(Iden)]
    enum Products {
        Table,
        Id,
    }
}

mod m20240101_000004_create_payment_and_audit_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_payment_and_audit_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Payments::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Payments::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Payments::OrderId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Payments::Status).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Payments::TransactionId)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Payments::PaymentUrl).string().not_null())
                        .col(
                            ColumnDef::new(Payments::Amount)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Payments::Method).string().not_null())
                        .col(
                            ColumnDef::new(Payments::PaymentDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Payments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_payments_order")
                                .from(Payments::Table, Payments::OrderId)
                                .to(Orders::Table, Orders::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(AuditLogs::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(AuditLogs::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(AuditLogs::EntityKind)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(ColumnDef::new(AuditLogs::EntityId).uuid().not_null())
                        .col(ColumnDef::new(AuditLogs::Action).string_len(20).not_null())
                        .col(ColumnDef::new(AuditLogs::Before).json().null())
                        .col(ColumnDef::new(AuditLogs::After).json().null())
                        .col(ColumnDef::new(AuditLogs::ActorId).uuid().null())
                        .col(
                            ColumnDef::new(AuditLogs::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_audit_logs_entity")
                        .table(AuditLogs::Table)
                        .col(AuditLogs::EntityKind)
                        .col(AuditLogs::EntityId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(AuditLogs::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Payments::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Payments {
        Table,
        Id,
        OrderId,
        Status,
        TransactionId,
        PaymentUrl,
        Amount,
        Method,
        PaymentDate,
        CreatedAt,
    }

    #[derive(Iden)]
    enum AuditLogs {
        Table,
        Id,
        EntityKind,
        EntityId,
        Action,
        Before,
        After,
        ActorId,
        CreatedAt,
    }

    #[derive(Iden)]
    enum Orders {
        Table,
        Id,
    }
}
