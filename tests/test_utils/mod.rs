//! Test utilities: in-memory SQLite with migrations applied, a populated
//! source tenant, and small query helpers.

#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use migration::{Migrator, MigratorTrait};
use portability::entities::CoreEntities;
use portability::plugins::ChangelogPlugin;
use portability::repositories::TenantRepository;
use portability::transfer::schema::{ColumnKind, TENANT_COLUMN};
use portability::transfer::store::{Cell, TableStore};
use portability::transfer::{EntityRegistry, RepositoryGraph};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement, Value};
use uuid::Uuid;

/// Sets up an in-memory SQLite database with all migrations applied and
/// foreign keys enforced.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA foreign_keys = ON".to_string(),
    ))
    .await?;
    Ok(db)
}

/// Rows of `table` whose `column` is set but matches no row of `target`.
pub async fn dangling_references(
    db: &DatabaseConnection,
    table: &str,
    column: &str,
    target: &str,
) -> Result<i64> {
    let sql = format!(
        "SELECT COUNT(*) AS total FROM \"{table}\" AS r WHERE r.\"{column}\" IS NOT NULL \
         AND NOT EXISTS (SELECT 1 FROM \"{target}\" AS t WHERE t.\"id\" = r.\"{column}\")"
    );
    let row = db
        .query_one(Statement::from_string(db.get_database_backend(), sql))
        .await?
        .ok_or_else(|| anyhow::anyhow!("count returned no row"))?;
    Ok(row.try_get::<i64>("", "total")?)
}

/// Every declared reference of every table in the graph resolves.
pub async fn assert_references_resolve(db: &DatabaseConnection, graph: &RepositoryGraph) -> Result<()> {
    for model in graph.ordered() {
        for fk in &model.foreign_keys {
            let dangling = dangling_references(db, &model.table_name, &fk.column, &fk.target_table).await?;
            anyhow::ensure!(
                dangling == 0,
                "{dangling} rows of {}.{} point at missing {} rows",
                model.table_name,
                fk.column,
                fk.target_table
            );
        }
    }
    Ok(())
}

/// Core catalogue plus the changelog plugin.
pub fn test_graph() -> Arc<RepositoryGraph> {
    let mut registry = EntityRegistry::new();
    registry
        .register(Arc::new(CoreEntities))
        .register(Arc::new(ChangelogPlugin));
    Arc::new(registry.build_graph().expect("catalogue must build"))
}

pub async fn create_tenant(db: &DatabaseConnection, name: &str) -> Result<String> {
    let tenant = TenantRepository::new(Arc::new(db.clone())).create(name).await?;
    Ok(tenant.id)
}

fn text(value: &str) -> Cell {
    Cell::Text(value.to_string())
}

/// Inserts a row with a fresh id and returns the id.
pub async fn insert(db: &DatabaseConnection, table: &str, values: Vec<(&str, Cell)>) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    let mut row = vec![("id".to_string(), text(&id))];
    row.extend(values.into_iter().map(|(column, cell)| (column.to_string(), cell)));
    TableStore::new(db.clone()).insert_row(table, row).await?;
    Ok(id)
}

/// Ids of the rows created by [`populate_tenant`].
#[derive(Debug, Clone)]
pub struct Fixture {
    pub tenant_id: String,
    pub user_id: String,
    pub organization_id: String,
    pub employee_id: String,
    pub project_id: String,
    pub tag_id: String,
    pub global_tag_id: String,
    pub parent_task_id: String,
    pub child_task_id: String,
}

/// Fills a tenant with one row (two tasks) per core table, pivots included,
/// plus one global tag.
pub async fn populate_tenant(db: &DatabaseConnection, tenant_id: &str) -> Result<Fixture> {
    let t = || text(tenant_id);
    let at = |day| Cell::Timestamp(Utc.with_ymd_and_hms(2025, 3, day, 9, 30, 0).unwrap());

    let user_id = insert(
        db,
        "user",
        vec![
            (TENANT_COLUMN, t()),
            ("email", text("alice@example.com")),
            ("first_name", text("Alice")),
            ("last_name", Cell::Null(ColumnKind::Text)),
            ("is_active", Cell::Boolean(true)),
            ("created_at", at(1)),
        ],
    )
    .await?;

    let organization_id = insert(
        db,
        "organization",
        vec![
            (TENANT_COLUMN, t()),
            ("name", text("Acme")),
            ("currency_code", text("USD")),
            ("is_default", Cell::Boolean(true)),
            ("created_at", at(1)),
            ("created_by_user_id", text(&user_id)),
        ],
    )
    .await?;

    insert(
        db,
        "user_organization",
        vec![
            (TENANT_COLUMN, t()),
            ("organization_id", text(&organization_id)),
            ("user_id", text(&user_id)),
            ("is_active", Cell::Boolean(true)),
        ],
    )
    .await?;

    insert(
        db,
        "role",
        vec![
            (TENANT_COLUMN, t()),
            ("name", text("Admin")),
            ("is_system", Cell::Boolean(false)),
        ],
    )
    .await?;

    let employee_id = insert(
        db,
        "employee",
        vec![
            (TENANT_COLUMN, t()),
            ("organization_id", text(&organization_id)),
            ("user_id", text(&user_id)),
            ("start_date", at(2)),
            ("billable_rate", Cell::Float(52.5)),
            ("is_active", Cell::Boolean(true)),
        ],
    )
    .await?;

    let global_tag_id = insert(
        db,
        "tag",
        vec![
            (TENANT_COLUMN, Cell::Null(ColumnKind::Text)),
            ("organization_id", Cell::Null(ColumnKind::Text)),
            ("name", text("Shared")),
            ("color", Cell::Null(ColumnKind::Text)),
            ("is_system", Cell::Boolean(true)),
        ],
    )
    .await?;

    let tag_id = insert(
        db,
        "tag",
        vec![
            (TENANT_COLUMN, t()),
            ("organization_id", text(&organization_id)),
            ("name", text("Backend")),
            ("color", text("#123456")),
            ("is_system", Cell::Boolean(false)),
        ],
    )
    .await?;

    let project_id = insert(
        db,
        "organization_project",
        vec![
            (TENANT_COLUMN, t()),
            ("organization_id", text(&organization_id)),
            ("name", text("Website")),
            ("billable", Cell::Boolean(true)),
            ("created_at", at(3)),
        ],
    )
    .await?;

    let parent_task_id = insert(
        db,
        "task",
        vec![
            (TENANT_COLUMN, t()),
            ("organization_id", text(&organization_id)),
            ("project_id", text(&project_id)),
            ("parent_id", Cell::Null(ColumnKind::Text)),
            ("title", text("Epic")),
            ("status", text("OPEN")),
            ("estimate", Cell::Integer(3600)),
            ("created_by_user_id", text(&user_id)),
        ],
    )
    .await?;

    let child_task_id = insert(
        db,
        "task",
        vec![
            (TENANT_COLUMN, t()),
            ("organization_id", text(&organization_id)),
            ("project_id", text(&project_id)),
            ("parent_id", text(&parent_task_id)),
            ("title", text("Story, with a comma")),
            ("status", text("IN_PROGRESS")),
            ("due_date", at(20)),
        ],
    )
    .await?;

    insert(
        db,
        "time_log",
        vec![
            (TENANT_COLUMN, t()),
            ("organization_id", text(&organization_id)),
            ("employee_id", text(&employee_id)),
            ("task_id", text(&child_task_id)),
            ("started_at", at(4)),
            ("stopped_at", at(5)),
            ("is_billable", Cell::Boolean(true)),
            ("description", text("line one\nline two")),
        ],
    )
    .await?;

    insert(
        db,
        "invoice",
        vec![
            (TENANT_COLUMN, t()),
            ("organization_id", text(&organization_id)),
            ("invoice_number", Cell::Integer(1001)),
            ("invoice_date", at(6)),
            ("total_value", Cell::Float(1250.75)),
            ("currency_code", text("USD")),
            ("paid", Cell::Boolean(false)),
            ("sent_to_id", text(&employee_id)),
        ],
    )
    .await?;

    let store = TableStore::new(db.clone());
    for (task, tag) in [(&child_task_id, &tag_id), (&parent_task_id, &global_tag_id)] {
        store
            .insert_row(
                "tag_task",
                vec![("task_id".into(), text(task)), ("tag_id".into(), text(tag))],
            )
            .await?;
    }
    store
        .insert_row(
            "organization_project_employee",
            vec![
                ("organization_project_id".into(), text(&project_id)),
                ("employee_id".into(), text(&employee_id)),
            ],
        )
        .await?;

    Ok(Fixture {
        tenant_id: tenant_id.to_string(),
        user_id,
        organization_id,
        employee_id,
        project_id,
        tag_id,
        global_tag_id,
        parent_task_id,
        child_task_id,
    })
}

/// Rows of `table` owned by the tenant.
pub async fn count_for_tenant(db: &DatabaseConnection, table: &str, tenant_id: &str) -> Result<i64> {
    Ok(TableStore::new(db.clone())
        .count(table, &[(TENANT_COLUMN.to_string(), text(tenant_id))])
        .await?)
}

pub async fn count_all(db: &DatabaseConnection, table: &str) -> Result<i64> {
    Ok(TableStore::new(db.clone()).count(table, &[]).await?)
}

/// Pivot rows whose owning row belongs to the tenant.
pub async fn count_pivot(
    db: &DatabaseConnection,
    pivot: &str,
    join_column: &str,
    owner: &str,
    tenant_id: &str,
) -> Result<i64> {
    let sql = format!(
        "SELECT COUNT(*) AS total FROM \"{pivot}\" INNER JOIN \"{owner}\" \
         ON \"{pivot}\".\"{join_column}\" = \"{owner}\".\"id\" WHERE \"{owner}\".\"tenant_id\" = ?"
    );
    let row = db
        .query_one(Statement::from_sql_and_values(
            db.get_database_backend(),
            sql,
            vec![Value::from(tenant_id.to_string())],
        ))
        .await?
        .ok_or_else(|| anyhow::anyhow!("count returned no row"))?;
    Ok(row.try_get::<i64>("", "total")?)
}

/// Single text column of one row.
pub async fn column_value(
    db: &DatabaseConnection,
    table: &str,
    column: &str,
    id: &str,
) -> Result<Option<String>> {
    let sql = format!("SELECT \"{column}\" AS value FROM \"{table}\" WHERE \"id\" = ?");
    let row = db
        .query_one(Statement::from_sql_and_values(
            db.get_database_backend(),
            sql,
            vec![Value::from(id.to_string())],
        ))
        .await?
        .ok_or_else(|| anyhow::anyhow!("{table} row {id} not found"))?;
    Ok(row.try_get::<Option<String>>("", "value")?)
}

/// Ids of the tenant's rows in `table`.
pub async fn ids_for_tenant(db: &DatabaseConnection, table: &str, tenant_id: &str) -> Result<Vec<String>> {
    let sql = format!("SELECT \"id\" FROM \"{table}\" WHERE \"tenant_id\" = ? ORDER BY \"id\"");
    let rows = db
        .query_all(Statement::from_sql_and_values(
            db.get_database_backend(),
            sql,
            vec![Value::from(tenant_id.to_string())],
        ))
        .await?;
    rows.iter()
        .map(|row| -> Result<String> { Ok(row.try_get::<String>("", "id")?) })
        .collect()
}
