//! Import history repository
//!
//! Every upload leaves one row recording the file and the job outcome.

use anyhow::Result;
use chrono::Utc;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::import_history::{self, Entity as ImportHistory, ImportStatus};

/// Upload facts recorded alongside the outcome.
#[derive(Debug, Clone)]
pub struct NewImportHistory {
    pub tenant_id: String,
    pub file: String,
    pub path: String,
    pub size: i64,
    pub status: ImportStatus,
}

#[derive(Debug, Clone)]
pub struct ImportHistoryRepository {
    pub db: Arc<DatabaseConnection>,
}

impl ImportHistoryRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Persists one history entry stamped with the current time.
    pub async fn record(&self, entry: NewImportHistory) -> Result<import_history::Model> {
        let model = import_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(entry.tenant_id),
            file: Set(entry.file),
            path: Set(entry.path),
            size: Set(entry.size),
            status: Set(entry.status.as_str().to_string()),
            imported_at: Set(Utc::now().into()),
        };
        Ok(ImportHistory::insert(model)
            .exec_with_returning(&*self.db)
            .await?)
    }

    /// The tenant's entries, newest first.
    ///
    /// # Arguments
    ///
    /// * `tenant_id` - Tenant whose history is listed
    /// * `limit` - Maximum number of entries returned
    pub async fn list_by_tenant(&self, tenant_id: &str, limit: u64) -> Result<Vec<import_history::Model>> {
        Ok(ImportHistory::find()
            .filter(import_history::Column::TenantId.eq(tenant_id))
            .order_by_desc(import_history::Column::ImportedAt)
            .order_by_desc(import_history::Column::Id)
            .limit(limit)
            .all(&*self.db)
            .await?)
    }
}
