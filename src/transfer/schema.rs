//! Entity descriptors and the repository models derived from them.
//!
//! Providers declare an [`EntityDescriptor`] per persisted entity type; the
//! registry turns each descriptor into a validated [`RepositoryModel`] that the
//! exporter and importer consume.

use std::fmt;

use serde::Serialize;

/// Primary key column carried by every exportable table.
pub const ID_COLUMN: &str = "id";
/// Column holding the owning tenant of a row.
pub const TENANT_COLUMN: &str = "tenant_id";
/// Column holding the owning organization of a row.
pub const ORGANIZATION_COLUMN: &str = "organization_id";
/// Table holding organizations; organization references get direct resolution on import.
pub const ORGANIZATION_TABLE: &str = "organization";
/// Membership table linking users to organizations.
pub const USER_ORGANIZATION_TABLE: &str = "user_organization";

/// Storage kind of a column, used for CSV rendering and import coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Text,
    Integer,
    Float,
    Boolean,
    Timestamp,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnKind::Text => "text",
            ColumnKind::Integer => "integer",
            ColumnKind::Float => "float",
            ColumnKind::Boolean => "boolean",
            ColumnKind::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

/// A single column declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDef {
    pub name: String,
    pub kind: ColumnKind,
    pub nullable: bool,
}

impl ColumnDef {
    fn new(name: &str, kind: ColumnKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            nullable: false,
        }
    }

    pub fn text(name: &str) -> Self {
        Self::new(name, ColumnKind::Text)
    }

    pub fn integer(name: &str) -> Self {
        Self::new(name, ColumnKind::Integer)
    }

    pub fn float(name: &str) -> Self {
        Self::new(name, ColumnKind::Float)
    }

    pub fn boolean(name: &str) -> Self {
        Self::new(name, ColumnKind::Boolean)
    }

    pub fn timestamp(name: &str) -> Self {
        Self::new(name, ColumnKind::Timestamp)
    }

    /// Marks the column as accepting NULL.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// How rows of an entity relate to tenants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantScope {
    /// The tenant table itself; its `id` is the tenant identifier.
    Root,
    /// Rows carry a `tenant_id` column.
    Tenant,
    /// Rows are shared by every tenant.
    Global,
}

/// Column used to find an existing destination row instead of inserting a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UniqueIdentifier {
    pub column: String,
}

/// A non-pivot relation pointing at another table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeyRef {
    pub column: String,
    pub target_table: String,
    /// Nullable references are deferrable when they close a cycle.
    pub nullable: bool,
}

/// Descriptor of a many-to-many join table owned by an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PivotRef {
    pub pivot_table: String,
    /// Pivot column pointing at the owning table.
    pub join_column: String,
    /// Owning table column referenced by `join_column`.
    pub referenced_column: String,
    /// Pivot column pointing at the foreign table.
    pub inverse_join_column: String,
    /// Foreign table column referenced by `inverse_join_column`.
    pub inverse_referenced_column: String,
    pub target_table: String,
}

impl PivotRef {
    /// Pivot joining both sides on their `id` columns.
    pub fn new(pivot_table: &str, join_column: &str, inverse_join_column: &str, target_table: &str) -> Self {
        Self {
            pivot_table: pivot_table.to_string(),
            join_column: join_column.to_string(),
            referenced_column: ID_COLUMN.to_string(),
            inverse_join_column: inverse_join_column.to_string(),
            inverse_referenced_column: ID_COLUMN.to_string(),
            target_table: target_table.to_string(),
        }
    }

    /// Header row of the pivot CSV.
    pub fn columns(&self) -> [&str; 2] {
        [self.join_column.as_str(), self.inverse_join_column.as_str()]
    }
}

/// Declaration of an entity type as contributed by a provider.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    pub table_name: String,
    pub scope: TenantScope,
    pub is_static: bool,
    pub columns: Vec<ColumnDef>,
    pub belongs_to: Vec<(String, String)>,
    pub many_to_many: Vec<PivotRef>,
    pub unique_identifiers: Vec<String>,
}

impl EntityDescriptor {
    pub fn new(table_name: &str, scope: TenantScope) -> Self {
        Self {
            table_name: table_name.to_string(),
            scope,
            is_static: false,
            columns: vec![ColumnDef::text(ID_COLUMN)],
            belongs_to: Vec::new(),
            many_to_many: Vec::new(),
            unique_identifiers: Vec::new(),
        }
    }

    /// Entity whose rows belong to a tenant (adds the `tenant_id` column).
    pub fn tenant_based(table_name: &str) -> Self {
        Self::new(table_name, TenantScope::Tenant).column(ColumnDef::text(TENANT_COLUMN))
    }

    /// Entity whose rows are shared across tenants.
    pub fn global(table_name: &str) -> Self {
        Self::new(table_name, TenantScope::Global)
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        self
    }

    pub fn belongs_to(mut self, column: &str, target_table: &str) -> Self {
        self.belongs_to
            .push((column.to_string(), target_table.to_string()));
        self
    }

    pub fn many_to_many(mut self, pivot: PivotRef) -> Self {
        self.many_to_many.push(pivot);
        self
    }

    pub fn unique(mut self, column: &str) -> Self {
        self.unique_identifiers.push(column.to_string());
        self
    }

    /// Marks the entity as reference data that clean imports never purge.
    pub fn static_data(mut self) -> Self {
        self.is_static = true;
        self
    }
}

/// A validated entity model with resolved relations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryModel {
    pub table_name: String,
    pub provider: String,
    pub scope: TenantScope,
    pub is_static: bool,
    pub columns: Vec<ColumnDef>,
    pub unique_identifiers: Vec<UniqueIdentifier>,
    pub foreign_keys: Vec<ForeignKeyRef>,
    pub many_to_many: Vec<PivotRef>,
}

impl RepositoryModel {
    pub fn is_tenant_based(&self) -> bool {
        self.scope == TenantScope::Tenant
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn foreign_key(&self, column: &str) -> Option<&ForeignKeyRef> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Tenant rows with a NULL tenant are global defaults shared by every tenant.
    pub fn has_global_defaults(&self) -> bool {
        self.is_tenant_based()
            && self
                .column(TENANT_COLUMN)
                .is_some_and(|column| column.nullable)
    }
}
