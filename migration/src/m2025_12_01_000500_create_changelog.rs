//! Table owned by the changelog plugin.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Changelog::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Changelog::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Changelog::TenantId).string().not_null())
                    .col(ColumnDef::new(Changelog::OrganizationId).string().not_null())
                    .col(ColumnDef::new(Changelog::Icon).string().null())
                    .col(ColumnDef::new(Changelog::Title).string().not_null())
                    .col(ColumnDef::new(Changelog::Content).text().not_null())
                    .col(
                        ColumnDef::new(Changelog::Date)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Changelog::IsPublished)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_changelog_organization")
                            .from(Changelog::Table, Changelog::OrganizationId)
                            .to(Organization::Table, Organization::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Changelog::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Organization {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Changelog {
    Table,
    Id,
    TenantId,
    OrganizationId,
    Icon,
    Title,
    Content,
    Date,
    IsPublished,
}
