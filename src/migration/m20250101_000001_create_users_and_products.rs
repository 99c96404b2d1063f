use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Users::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Users::Email).string().not_null().unique_key())
                    .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                    .col(
                        ColumnDef::new(Users::Role)
                            .string()
                            .not_null()
                            .default("user"),
                    )
                    .col(ColumnDef::new(Users::Name).string().not_null())
                    .col(ColumnDef::new(Users::Image).string())
                    .col(ColumnDef::new(Users::Bio).text())
                    .col(ColumnDef::new(Users::University).string())
                    .col(
                        ColumnDef::new(Users::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Products::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Products::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Products::SellerId).uuid().not_null())
                    .col(ColumnDef::new(Products::Name).string().not_null())
                    .col(ColumnDef::new(Products::Description).text().not_null())
                    .col(ColumnDef::new(Products::Price).big_integer().not_null())
                    .col(
                        ColumnDef::new(Products::Discount)
                            .integer()
                            .not_null()
                            .default(0)
                            .check(
                                Expr::col(Products::Discount)
                                    .gte(0)
                                    .and(Expr::col(Products::Discount).lte(100)),
                            ),
                    )
                    .col(ColumnDef::new(Products::Stock).integer().not_null().default(0))
                    .col(ColumnDef::new(Products::Category).string().not_null())
                    .col(
                        ColumnDef::new(Products::DeliveryMethod)
                            .string()
                            .not_null()
                            .default("both"),
                    )
                    .col(
                        ColumnDef::new(Products::Images)
                            .array(ColumnType::Text)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Products::Tags)
                            .array(ColumnType::Text)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Products::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Products::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Products::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_products_seller")
                            .from(Products::Table, Products::SellerId)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_products_seller")
                    .table(Products::Table)
                    .col(Products::SellerId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProductComments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProductComments::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProductComments::ProductId).uuid().not_null())
                    .col(ColumnDef::new(ProductComments::AuthorId).uuid().not_null())
                    .col(ColumnDef::new(ProductComments::AuthorName).string().not_null())
                    .col(ColumnDef::new(ProductComments::AuthorImage).string())
                    .col(ColumnDef::new(ProductComments::Text).text().not_null())
                    .col(
                        ColumnDef::new(ProductComments::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_product_comments_product")
                            .from(ProductComments::Table, ProductComments::ProductId)
                            .to(Products::Table, Products::Id),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProductComments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Products::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(super) enum Users {
    Table,
    Id,
    Email,
    PasswordHash,
    Role,
    Name,
    Image,
    Bio,
    University,
    CreatedAt,
}

#[derive(DeriveIden)]
pub(super) enum Products {
    Table,
    Id,
    SellerId,
    Name,
    Description,
    Price,
    Discount,
    Stock,
    Category,
    DeliveryMethod,
    Images,
    Tags,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ProductComments {
    Table,
    Id,
    ProductId,
    AuthorId,
    AuthorName,
    AuthorImage,
    Text,
    CreatedAt,
}
