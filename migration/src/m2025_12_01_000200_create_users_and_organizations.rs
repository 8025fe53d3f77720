//! Users, roles, organizations and organization memberships.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(User::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(User::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(User::TenantId).string().not_null())
                    .col(ColumnDef::new(User::Email).string().not_null())
                    .col(ColumnDef::new(User::FirstName).string().null())
                    .col(ColumnDef::new(User::LastName).string().null())
                    .col(
                        ColumnDef::new(User::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(User::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_tenant")
                            .from(User::Table, User::TenantId)
                            .to(Tenant::Table, Tenant::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Emails are unique per tenant so one person can exist in several tenants.
        manager
            .create_index(
                Index::create()
                    .name("idx_user_tenant_email")
                    .table(User::Table)
                    .col(User::TenantId)
                    .col(User::Email)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Role::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Role::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Role::TenantId).string().not_null())
                    .col(ColumnDef::new(Role::Name).string().not_null())
                    .col(
                        ColumnDef::new(Role::IsSystem)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_role_tenant")
                            .from(Role::Table, Role::TenantId)
                            .to(Tenant::Table, Tenant::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Organization::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Organization::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Organization::TenantId).string().not_null())
                    .col(ColumnDef::new(Organization::Name).string().not_null())
                    .col(ColumnDef::new(Organization::CurrencyCode).string().null())
                    .col(
                        ColumnDef::new(Organization::IsDefault)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Organization::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Organization::CreatedByUserId)
                            .string()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_organization_tenant")
                            .from(Organization::Table, Organization::TenantId)
                            .to(Tenant::Table, Tenant::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_organization_created_by")
                            .from(Organization::Table, Organization::CreatedByUserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserOrganization::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserOrganization::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(UserOrganization::TenantId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserOrganization::OrganizationId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(UserOrganization::UserId).string().not_null())
                    .col(
                        ColumnDef::new(UserOrganization::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_organization_organization")
                            .from(UserOrganization::Table, UserOrganization::OrganizationId)
                            .to(Organization::Table, Organization::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_organization_user")
                            .from(UserOrganization::Table, UserOrganization::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserOrganization::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Organization::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Role::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(User::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Tenant {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum User {
    Table,
    Id,
    TenantId,
    Email,
    FirstName,
    LastName,
    IsActive,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Role {
    Table,
    Id,
    TenantId,
    Name,
    IsSystem,
}

#[derive(DeriveIden)]
enum Organization {
    Table,
    Id,
    TenantId,
    Name,
    CurrencyCode,
    IsDefault,
    CreatedAt,
    CreatedByUserId,
}

#[derive(DeriveIden)]
enum UserOrganization {
    Table,
    Id,
    TenantId,
    OrganizationId,
    UserId,
    IsActive,
}
