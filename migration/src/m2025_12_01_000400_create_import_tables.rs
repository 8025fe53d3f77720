//! Identifier translation records and import history.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ImportRecord::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ImportRecord::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ImportRecord::TenantId).string().not_null())
                    .col(ColumnDef::new(ImportRecord::EntityType).string().not_null())
                    .col(ColumnDef::new(ImportRecord::SourceId).string().not_null())
                    .col(
                        ColumnDef::new(ImportRecord::DestinationId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ImportRecord::ImportedDate)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Upserts target this index; it must exist on every backend.
        manager
            .create_index(
                Index::create()
                    .name("idx_import_record_tenant_entity_source")
                    .table(ImportRecord::Table)
                    .col(ImportRecord::TenantId)
                    .col(ImportRecord::EntityType)
                    .col(ImportRecord::SourceId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ImportHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ImportHistory::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ImportHistory::TenantId).string().not_null())
                    .col(ColumnDef::new(ImportHistory::File).string().not_null())
                    .col(ColumnDef::new(ImportHistory::Path).string().not_null())
                    .col(ColumnDef::new(ImportHistory::Size).big_integer().not_null())
                    .col(ColumnDef::new(ImportHistory::Status).string().not_null())
                    .col(
                        ColumnDef::new(ImportHistory::ImportedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_import_history_tenant_imported_at")
                    .table(ImportHistory::Table)
                    .col(ImportHistory::TenantId)
                    .col(ImportHistory::ImportedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ImportHistory::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ImportRecord::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ImportRecord {
    Table,
    Id,
    TenantId,
    EntityType,
    SourceId,
    DestinationId,
    ImportedDate,
}

#[derive(DeriveIden)]
enum ImportHistory {
    Table,
    Id,
    TenantId,
    File,
    Path,
    Size,
    Status,
    ImportedAt,
}
