//! Employees, tags, projects, tasks, time logs, invoices and their join tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

fn reference<A, B, C, D>(
    name: &str,
    from: (A, B),
    to: (C, D),
    on_delete: ForeignKeyAction,
) -> ForeignKeyCreateStatement
where
    A: IntoIden + 'static,
    B: IntoIden + 'static,
    C: IntoIden + 'static,
    D: IntoIden + 'static,
{
    ForeignKey::create()
        .name(name)
        .from(from.0, from.1)
        .to(to.0, to.1)
        .on_delete(on_delete)
        .to_owned()
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Employee::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Employee::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Employee::TenantId).string().not_null())
                    .col(ColumnDef::new(Employee::OrganizationId).string().not_null())
                    .col(ColumnDef::new(Employee::UserId).string().not_null())
                    .col(
                        ColumnDef::new(Employee::StartDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Employee::BillableRate).double().null())
                    .col(
                        ColumnDef::new(Employee::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .foreign_key(&mut reference(
                        "fk_employee_tenant",
                        (Employee::Table, Employee::TenantId),
                        (Tenant::Table, Tenant::Id),
                        ForeignKeyAction::Cascade,
                    ))
                    .foreign_key(&mut reference(
                        "fk_employee_organization",
                        (Employee::Table, Employee::OrganizationId),
                        (Organization::Table, Organization::Id),
                        ForeignKeyAction::Cascade,
                    ))
                    .foreign_key(&mut reference(
                        "fk_employee_user",
                        (Employee::Table, Employee::UserId),
                        (User::Table, User::Id),
                        ForeignKeyAction::Cascade,
                    ))
                    .to_owned(),
            )
            .await?;

        // A NULL tenant marks a global default tag shared by every tenant.
        manager
            .create_table(
                Table::create()
                    .table(Tag::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Tag::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Tag::TenantId).string().null())
                    .col(ColumnDef::new(Tag::OrganizationId).string().null())
                    .col(ColumnDef::new(Tag::Name).string().not_null())
                    .col(ColumnDef::new(Tag::Color).string().null())
                    .col(
                        ColumnDef::new(Tag::IsSystem)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .foreign_key(&mut reference(
                        "fk_tag_tenant",
                        (Tag::Table, Tag::TenantId),
                        (Tenant::Table, Tenant::Id),
                        ForeignKeyAction::Cascade,
                    ))
                    .foreign_key(&mut reference(
                        "fk_tag_organization",
                        (Tag::Table, Tag::OrganizationId),
                        (Organization::Table, Organization::Id),
                        ForeignKeyAction::Cascade,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OrganizationProject::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OrganizationProject::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OrganizationProject::TenantId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OrganizationProject::OrganizationId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OrganizationProject::Name).string().not_null())
                    .col(
                        ColumnDef::new(OrganizationProject::Billable)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(OrganizationProject::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(&mut reference(
                        "fk_organization_project_tenant",
                        (OrganizationProject::Table, OrganizationProject::TenantId),
                        (Tenant::Table, Tenant::Id),
                        ForeignKeyAction::Cascade,
                    ))
                    .foreign_key(&mut reference(
                        "fk_organization_project_organization",
                        (
                            OrganizationProject::Table,
                            OrganizationProject::OrganizationId,
                        ),
                        (Organization::Table, Organization::Id),
                        ForeignKeyAction::Cascade,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Task::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Task::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Task::TenantId).string().not_null())
                    .col(ColumnDef::new(Task::OrganizationId).string().not_null())
                    .col(ColumnDef::new(Task::ProjectId).string().null())
                    .col(ColumnDef::new(Task::ParentId).string().null())
                    .col(ColumnDef::new(Task::Title).string().not_null())
                    .col(ColumnDef::new(Task::Status).string().not_null())
                    .col(ColumnDef::new(Task::Estimate).big_integer().null())
                    .col(
                        ColumnDef::new(Task::DueDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Task::CreatedByUserId).string().null())
                    .foreign_key(&mut reference(
                        "fk_task_tenant",
                        (Task::Table, Task::TenantId),
                        (Tenant::Table, Tenant::Id),
                        ForeignKeyAction::Cascade,
                    ))
                    .foreign_key(&mut reference(
                        "fk_task_organization",
                        (Task::Table, Task::OrganizationId),
                        (Organization::Table, Organization::Id),
                        ForeignKeyAction::Cascade,
                    ))
                    .foreign_key(&mut reference(
                        "fk_task_project",
                        (Task::Table, Task::ProjectId),
                        (OrganizationProject::Table, OrganizationProject::Id),
                        ForeignKeyAction::SetNull,
                    ))
                    .foreign_key(&mut reference(
                        "fk_task_parent",
                        (Task::Table, Task::ParentId),
                        (Task::Table, Task::Id),
                        ForeignKeyAction::SetNull,
                    ))
                    .foreign_key(&mut reference(
                        "fk_task_created_by",
                        (Task::Table, Task::CreatedByUserId),
                        (User::Table, User::Id),
                        ForeignKeyAction::SetNull,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TimeLog::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(TimeLog::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(TimeLog::TenantId).string().not_null())
                    .col(ColumnDef::new(TimeLog::OrganizationId).string().not_null())
                    .col(ColumnDef::new(TimeLog::EmployeeId).string().not_null())
                    .col(ColumnDef::new(TimeLog::TaskId).string().null())
                    .col(
                        ColumnDef::new(TimeLog::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TimeLog::StoppedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TimeLog::IsBillable)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(TimeLog::Description).text().null())
                    .foreign_key(&mut reference(
                        "fk_time_log_tenant",
                        (TimeLog::Table, TimeLog::TenantId),
                        (Tenant::Table, Tenant::Id),
                        ForeignKeyAction::Cascade,
                    ))
                    .foreign_key(&mut reference(
                        "fk_time_log_organization",
                        (TimeLog::Table, TimeLog::OrganizationId),
                        (Organization::Table, Organization::Id),
                        ForeignKeyAction::Cascade,
                    ))
                    .foreign_key(&mut reference(
                        "fk_time_log_employee",
                        (TimeLog::Table, TimeLog::EmployeeId),
                        (Employee::Table, Employee::Id),
                        ForeignKeyAction::Cascade,
                    ))
                    .foreign_key(&mut reference(
                        "fk_time_log_task",
                        (TimeLog::Table, TimeLog::TaskId),
                        (Task::Table, Task::Id),
                        ForeignKeyAction::SetNull,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Invoice::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Invoice::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Invoice::TenantId).string().not_null())
                    .col(ColumnDef::new(Invoice::OrganizationId).string().not_null())
                    .col(ColumnDef::new(Invoice::InvoiceNumber).big_integer().not_null())
                    .col(
                        ColumnDef::new(Invoice::InvoiceDate)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Invoice::TotalValue).double().not_null())
                    .col(ColumnDef::new(Invoice::CurrencyCode).string().not_null())
                    .col(
                        ColumnDef::new(Invoice::Paid)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Invoice::SentToId).string().null())
                    .foreign_key(&mut reference(
                        "fk_invoice_tenant",
                        (Invoice::Table, Invoice::TenantId),
                        (Tenant::Table, Tenant::Id),
                        ForeignKeyAction::Cascade,
                    ))
                    .foreign_key(&mut reference(
                        "fk_invoice_organization",
                        (Invoice::Table, Invoice::OrganizationId),
                        (Organization::Table, Organization::Id),
                        ForeignKeyAction::Cascade,
                    ))
                    .foreign_key(&mut reference(
                        "fk_invoice_sent_to",
                        (Invoice::Table, Invoice::SentToId),
                        (Employee::Table, Employee::Id),
                        ForeignKeyAction::SetNull,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TagTask::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(TagTask::TaskId).string().not_null())
                    .col(ColumnDef::new(TagTask::TagId).string().not_null())
                    .primary_key(Index::create().col(TagTask::TaskId).col(TagTask::TagId))
                    .foreign_key(&mut reference(
                        "fk_tag_task_task",
                        (TagTask::Table, TagTask::TaskId),
                        (Task::Table, Task::Id),
                        ForeignKeyAction::Cascade,
                    ))
                    .foreign_key(&mut reference(
                        "fk_tag_task_tag",
                        (TagTask::Table, TagTask::TagId),
                        (Tag::Table, Tag::Id),
                        ForeignKeyAction::Cascade,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OrganizationProjectEmployee::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OrganizationProjectEmployee::OrganizationProjectId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OrganizationProjectEmployee::EmployeeId)
                            .string()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(OrganizationProjectEmployee::OrganizationProjectId)
                            .col(OrganizationProjectEmployee::EmployeeId),
                    )
                    .foreign_key(&mut reference(
                        "fk_organization_project_employee_project",
                        (
                            OrganizationProjectEmployee::Table,
                            OrganizationProjectEmployee::OrganizationProjectId,
                        ),
                        (OrganizationProject::Table, OrganizationProject::Id),
                        ForeignKeyAction::Cascade,
                    ))
                    .foreign_key(&mut reference(
                        "fk_organization_project_employee_employee",
                        (
                            OrganizationProjectEmployee::Table,
                            OrganizationProjectEmployee::EmployeeId,
                        ),
                        (Employee::Table, Employee::Id),
                        ForeignKeyAction::Cascade,
                    ))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OrganizationProjectEmployee::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TagTask::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Invoice::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TimeLog::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Task::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OrganizationProject::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Tag::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Employee::Table).to_owned())
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
}

#[derive(DeriveIden)]
enum Organization {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Employee {
    Table,
    Id,
    TenantId,
    OrganizationId,
    UserId,
    StartDate,
    BillableRate,
    IsActive,
}

#[derive(DeriveIden)]
enum Tag {
    Table,
    Id,
    TenantId,
    OrganizationId,
    Name,
    Color,
    IsSystem,
}

#[derive(DeriveIden)]
enum OrganizationProject {
    Table,
    Id,
    TenantId,
    OrganizationId,
    Name,
    Billable,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Task {
    Table,
    Id,
    TenantId,
    OrganizationId,
    ProjectId,
    ParentId,
    Title,
    Status,
    Estimate,
    DueDate,
    CreatedByUserId,
}

#[derive(DeriveIden)]
enum TimeLog {
    Table,
    Id,
    TenantId,
    OrganizationId,
    EmployeeId,
    TaskId,
    StartedAt,
    StoppedAt,
    IsBillable,
    Description,
}

#[derive(DeriveIden)]
enum Invoice {
    Table,
    Id,
    TenantId,
    OrganizationId,
    InvoiceNumber,
    InvoiceDate,
    TotalValue,
    CurrencyCode,
    Paid,
    SentToId,
}

#[derive(DeriveIden)]
enum TagTask {
    Table,
    TaskId,
    TagId,
}

#[derive(DeriveIden)]
enum OrganizationProjectEmployee {
    Table,
    OrganizationProjectId,
    EmployeeId,
}
