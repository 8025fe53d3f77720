//! Generic row access for registered tables.
//!
//! Statements are assembled with sea-query so the same code runs against
//! Postgres and SQLite. Values cross the CSV boundary as text and are typed by
//! the column's [`ColumnKind`].

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use sea_orm::sea_query::{Alias, Cond, Expr, Order, Query, SimpleExpr};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, QueryResult, Value};

use super::error::RowError;
use super::schema::{
    ColumnDef, ColumnKind, ID_COLUMN, ORGANIZATION_COLUMN, PivotRef, RepositoryModel,
    TENANT_COLUMN, TenantScope,
};

/// Fixed timestamp format used inside archives.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// One exported row keyed by column name. `None` is NULL.
pub type CsvRow = BTreeMap<String, Option<String>>;

/// A typed value ready to bind into a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null(ColumnKind),
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Cell::Null(ColumnKind::Text) => Value::String(None),
            Cell::Null(ColumnKind::Integer) => Value::BigInt(None),
            Cell::Null(ColumnKind::Float) => Value::Double(None),
            Cell::Null(ColumnKind::Boolean) => Value::Bool(None),
            Cell::Null(ColumnKind::Timestamp) => Value::ChronoDateTimeUtc(None),
            Cell::Text(value) => value.into(),
            Cell::Integer(value) => value.into(),
            Cell::Float(value) => value.into(),
            Cell::Boolean(value) => value.into(),
            Cell::Timestamp(value) => value.into(),
        }
    }
}

pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

/// Accepts the archive format, RFC 3339 and `YYYY-MM-DD HH:MM:SS` (taken as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.fZ", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed.and_utc());
        }
    }
    None
}

/// Converts a CSV cell into a typed value. Blank cells become NULL.
pub fn coerce(column: &ColumnDef, raw: Option<&str>) -> Result<Cell, RowError> {
    let Some(raw) = raw.filter(|v| !v.trim().is_empty()) else {
        return Ok(Cell::Null(column.kind));
    };
    let invalid = || RowError::Coercion {
        column: column.name.clone(),
        value: raw.to_string(),
        kind: column.kind,
    };

    let cell = match column.kind {
        ColumnKind::Text => Cell::Text(raw.to_string()),
        ColumnKind::Integer => Cell::Integer(raw.trim().parse().map_err(|_| invalid())?),
        ColumnKind::Float => Cell::Float(raw.trim().parse().map_err(|_| invalid())?),
        ColumnKind::Boolean => match raw.trim() {
            "true" | "1" => Cell::Boolean(true),
            "false" | "0" => Cell::Boolean(false),
            _ => return Err(invalid()),
        },
        ColumnKind::Timestamp => Cell::Timestamp(parse_timestamp(raw.trim()).ok_or_else(invalid)?),
    };
    Ok(cell)
}

fn read_cell(row: &QueryResult, column: &ColumnDef) -> Result<Option<String>, DbErr> {
    let name = column.name.as_str();
    Ok(match column.kind {
        ColumnKind::Text => row.try_get::<Option<String>>("", name)?,
        ColumnKind::Integer => row.try_get::<Option<i64>>("", name)?.map(|v| v.to_string()),
        ColumnKind::Float => row.try_get::<Option<f64>>("", name)?.map(|v| v.to_string()),
        ColumnKind::Boolean => row.try_get::<Option<bool>>("", name)?.map(|v| v.to_string()),
        ColumnKind::Timestamp => row
            .try_get::<Option<DateTime<Utc>>>("", name)?
            .map(|v| format_timestamp(&v)),
    })
}

/// Which rows of a table belong to an export.
#[derive(Debug, Clone, Default)]
pub struct RowFilter {
    pub tenant_id: String,
    pub organization_id: Option<String>,
}

/// Column/value pairs used for inserts and lookups.
pub type Assignments = Vec<(String, Cell)>;

/// Generic reader/writer over registered tables.
#[derive(Clone)]
pub struct TableStore {
    db: DatabaseConnection,
}

impl TableStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// One page of the rows of `model` visible to the filter, ordered by id and
    /// starting after `after`.
    pub async fn fetch_rows(
        &self,
        model: &RepositoryModel,
        filter: &RowFilter,
        after: Option<&str>,
        limit: u64,
    ) -> Result<Vec<CsvRow>, DbErr> {
        let mut query = Query::select();
        query.from(Alias::new(&model.table_name));
        for column in &model.columns {
            query.column(Alias::new(&column.name));
        }

        match model.scope {
            TenantScope::Root => {
                query.and_where(Expr::col(Alias::new(ID_COLUMN)).eq(filter.tenant_id.as_str()));
            }
            TenantScope::Tenant => {
                let tenant = Expr::col(Alias::new(TENANT_COLUMN)).eq(filter.tenant_id.as_str());
                if model.has_global_defaults() {
                    query.cond_where(
                        Cond::any()
                            .add(tenant)
                            .add(Expr::col(Alias::new(TENANT_COLUMN)).is_null()),
                    );
                } else {
                    query.and_where(tenant);
                }
            }
            TenantScope::Global => {}
        }

        if let Some(organization_id) = &filter.organization_id
            && model.has_column(ORGANIZATION_COLUMN)
        {
            query.cond_where(
                Cond::any()
                    .add(Expr::col(Alias::new(ORGANIZATION_COLUMN)).eq(organization_id.as_str()))
                    .add(Expr::col(Alias::new(ORGANIZATION_COLUMN)).is_null()),
            );
        }

        if let Some(after) = after {
            query.and_where(Expr::col(Alias::new(ID_COLUMN)).gt(after));
        }
        query.order_by(Alias::new(ID_COLUMN), Order::Asc).limit(limit);

        let statement = self.db.get_database_backend().build(&query);
        let rows = self.db.query_all(statement).await?;

        rows.iter()
            .map(|row| {
                model
                    .columns
                    .iter()
                    .map(|column| -> Result<(String, Option<String>), DbErr> {
                        Ok((column.name.clone(), read_cell(row, column)?))
                    })
                    .collect()
            })
            .collect()
    }

    /// Pivot rows whose owning row belongs to the tenant.
    pub async fn fetch_pivot_rows(
        &self,
        owner: &RepositoryModel,
        pivot: &PivotRef,
        tenant_id: &str,
    ) -> Result<Vec<CsvRow>, DbErr> {
        let pivot_table = Alias::new(&pivot.pivot_table);
        let owner_table = Alias::new(&owner.table_name);

        let mut query = Query::select();
        query
            .column((pivot_table.clone(), Alias::new(&pivot.join_column)))
            .column((pivot_table.clone(), Alias::new(&pivot.inverse_join_column)))
            .from(pivot_table.clone())
            .inner_join(
                owner_table.clone(),
                Expr::col((pivot_table.clone(), Alias::new(&pivot.join_column)))
                    .equals((owner_table.clone(), Alias::new(&pivot.referenced_column))),
            );

        match owner.scope {
            TenantScope::Root => {
                query.and_where(Expr::col((owner_table.clone(), Alias::new(ID_COLUMN))).eq(tenant_id));
            }
            TenantScope::Tenant => {
                query.and_where(
                    Expr::col((owner_table.clone(), Alias::new(TENANT_COLUMN))).eq(tenant_id),
                );
            }
            TenantScope::Global => {}
        }

        query
            .order_by((pivot_table.clone(), Alias::new(&pivot.join_column)), Order::Asc)
            .order_by((pivot_table, Alias::new(&pivot.inverse_join_column)), Order::Asc);

        let statement = self.db.get_database_backend().build(&query);
        let rows = self.db.query_all(statement).await?;

        rows.iter()
            .map(|row| -> Result<CsvRow, DbErr> {
                let mut out = CsvRow::new();
                for column in pivot.columns() {
                    out.insert(column.to_string(), row.try_get::<Option<String>>("", column)?);
                }
                Ok(out)
            })
            .collect()
    }

    pub async fn insert_row(&self, table: &str, values: Assignments) -> Result<(), DbErr> {
        let (columns, cells): (Vec<_>, Vec<_>) = values.into_iter().unzip();

        let mut insert = Query::insert();
        insert
            .into_table(Alias::new(table))
            .columns(columns.into_iter().map(Alias::new));
        insert
            .values(cells.into_iter().map(|cell| SimpleExpr::from(cell.into_value())))
            .map_err(|e| DbErr::Custom(e.to_string()))?;

        let statement = self.db.get_database_backend().build(&insert);
        self.db.execute(statement).await?;
        Ok(())
    }

    /// Id of the first row matching every condition. NULL cells match `IS NULL`.
    pub async fn find_id(&self, table: &str, conditions: &[(String, Cell)]) -> Result<Option<String>, DbErr> {
        let mut query = Query::select();
        query
            .column(Alias::new(ID_COLUMN))
            .from(Alias::new(table))
            .limit(1);
        apply_conditions(&mut query, conditions);

        let statement = self.db.get_database_backend().build(&query);
        match self.db.query_one(statement).await? {
            Some(row) => row.try_get::<Option<String>>("", ID_COLUMN),
            None => Ok(None),
        }
    }

    pub async fn exists(&self, table: &str, conditions: &[(String, Cell)]) -> Result<bool, DbErr> {
        let mut query = Query::select();
        query
            .expr(Expr::val(1))
            .from(Alias::new(table))
            .limit(1);
        apply_conditions(&mut query, conditions);

        let statement = self.db.get_database_backend().build(&query);
        Ok(self.db.query_one(statement).await?.is_some())
    }

    pub async fn update_column(&self, table: &str, id: &str, column: &str, value: Cell) -> Result<u64, DbErr> {
        let mut update = Query::update();
        update
            .table(Alias::new(table))
            .value(Alias::new(column), value.into_value())
            .and_where(Expr::col(Alias::new(ID_COLUMN)).eq(id));

        let statement = self.db.get_database_backend().build(&update);
        Ok(self.db.execute(statement).await?.rows_affected())
    }

    /// Removes every row tagged with the tenant.
    pub async fn delete_tenant_rows(&self, table: &str, tenant_id: &str) -> Result<u64, DbErr> {
        let mut delete = Query::delete();
        delete
            .from_table(Alias::new(table))
            .and_where(Expr::col(Alias::new(TENANT_COLUMN)).eq(tenant_id));

        let statement = self.db.get_database_backend().build(&delete);
        Ok(self.db.execute(statement).await?.rows_affected())
    }

    pub async fn count(&self, table: &str, conditions: &[(String, Cell)]) -> Result<i64, DbErr> {
        let mut query = Query::select();
        query
            .expr_as(Expr::col(sea_orm::sea_query::Asterisk).count(), Alias::new("total"))
            .from(Alias::new(table));
        apply_conditions(&mut query, conditions);

        let statement = self.db.get_database_backend().build(&query);
        match self.db.query_one(statement).await? {
            Some(row) => row.try_get::<i64>("", "total"),
            None => Ok(0),
        }
    }
}

fn apply_conditions(query: &mut sea_orm::sea_query::SelectStatement, conditions: &[(String, Cell)]) {
    for (column, cell) in conditions {
        let column = Expr::col(Alias::new(column));
        if cell.is_null() {
            query.and_where(column.is_null());
        } else {
            query.and_where(column.eq(cell.clone().into_value()));
        }
    }
}
