//! Shared reference data: countries and currencies.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Country::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Country::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Country::Code).string().not_null().unique_key())
                    .col(ColumnDef::new(Country::Name).string().not_null())
                    .col(
                        ColumnDef::new(Country::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Currency::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Currency::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Currency::Code).string().not_null().unique_key())
                    .col(ColumnDef::new(Currency::Name).string().not_null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Currency::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Country::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Country {
    Table,
    Id,
    Code,
    Name,
    IsActive,
}

#[derive(DeriveIden)]
enum Currency {
    Table,
    Id,
    Code,
    Name,
}
