use thiserror::Error;
use uuid::Uuid;

use super::schema::ColumnKind;

/// Problems in the entity catalogue, detected before any job runs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("table '{table}' is registered more than once")]
    DuplicateTable { table: String },

    #[error("table '{table}' declares column '{column}' referencing unregistered table '{target}'")]
    UnknownTarget {
        table: String,
        column: String,
        target: String,
    },

    #[error("table '{table}' declares pivot '{pivot}' to unregistered table '{target}'")]
    UnknownPivotTarget {
        table: String,
        pivot: String,
        target: String,
    },

    #[error("table '{table}' references column '{column}' that it does not declare")]
    UnknownColumn { table: String, column: String },

    #[error("table '{table}' is tenant based but has no tenant_id column")]
    MissingTenantColumn { table: String },

    #[error("more than one tenant root table registered: '{first}' and '{second}'")]
    MultipleTenantRoots { first: String, second: String },

    #[error("non-nullable reference cycle between tables: {}", tables.join(", "))]
    NonNullableCycle { tables: Vec<String> },

    #[error("unknown plugin '{name}'")]
    UnknownPlugin { name: String },
}

/// Job-level failure; aborts the export or import it occurs in.
#[derive(Debug, Error)]
pub enum PortabilityError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("job {job_id} was cancelled")]
    Cancelled { job_id: Uuid },

    #[error("tenant '{0}' does not exist")]
    MissingTenant(String),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl PortabilityError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PortabilityError::Cancelled { .. })
    }
}

/// Failure of a single CSV row; the row is skipped and the table continues.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("row has no source id")]
    MissingId,

    #[error("malformed CSV row: {0}")]
    Malformed(#[from] csv::Error),

    #[error("column '{column}': cannot read '{value}' as {kind}")]
    Coercion {
        column: String,
        value: String,
        kind: ColumnKind,
    },

    #[error("column '{column}' is required but empty")]
    MissingValue { column: String },

    #[error("column '{column}' references {target} '{source_id}' which was never imported")]
    UnresolvedReference {
        column: String,
        target: String,
        source_id: String,
    },

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

pub type Result<T, E = PortabilityError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_error_lists_tables() {
        let err = ConfigurationError::NonNullableCycle {
            tables: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "non-nullable reference cycle between tables: a, b");
    }

    #[test]
    fn cancelled_is_detected() {
        let err = PortabilityError::Cancelled {
            job_id: Uuid::nil(),
        };
        assert!(err.is_cancelled());
        assert!(!PortabilityError::UnknownTable("x".into()).is_cancelled());
    }
}
