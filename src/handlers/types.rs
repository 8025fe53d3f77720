//! # Common API Types
//!
//! Request and response shapes shared by the portability handlers.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::models::import_history;
use crate::transfer::ImportReport;

/// Query of `GET /export/filter`
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ExportFilterQuery {
    /// Comma separated table names, e.g. `organization,tag`
    pub names: String,
    /// Restrict rows to one organization (plus organization-less rows)
    pub organization_id: Option<String>,
}

/// Query of `GET /export`
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ExportQuery {
    /// Restrict rows to one organization (plus organization-less rows)
    pub organization_id: Option<String>,
}

impl ExportFilterQuery {
    /// Trimmed, non-empty names in the order given.
    pub fn table_names(&self) -> Vec<String> {
        self.names
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Query of `GET /import/history`
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// Maximum entries returned (default 50, max 500)
    pub limit: Option<u64>,
}

impl HistoryQuery {
    pub fn limit(&self) -> u64 {
        self.limit.unwrap_or(50).clamp(1, 500)
    }
}

/// One uploaded archive and the outcome of importing it
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ImportHistoryResponse {
    pub id: Uuid,
    pub tenant_id: String,
    /// Original file name of the upload
    pub file: String,
    pub path: String,
    /// Size in bytes
    pub size: i64,
    /// `SUCCESS` or `FAILED`
    pub status: String,
    /// RFC 3339 timestamp
    pub imported_at: String,
    /// Job summary, present on the upload response of a successful import
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ImportReport>,
}

impl From<import_history::Model> for ImportHistoryResponse {
    fn from(model: import_history::Model) -> Self {
        Self {
            id: model.id,
            tenant_id: model.tenant_id,
            file: model.file,
            path: model.path,
            size: model.size,
            status: model.status,
            imported_at: model.imported_at.to_rfc3339(),
            report: None,
        }
    }
}
