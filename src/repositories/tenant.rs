//! Tenant repository
//!
//! Tenants are the roots of every export and the destination of every import.

use anyhow::{Result, bail};
use chrono::Utc;
use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait, QueryOrder, Set};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::tenant::{self, Entity as Tenant};

#[derive(Debug, Clone)]
pub struct TenantRepository {
    pub db: Arc<DatabaseConnection>,
}

impl TenantRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Creates a tenant with a fresh UUID identifier.
    ///
    /// # Arguments
    ///
    /// * `name` - Display name, must not be blank
    pub async fn create(&self, name: &str) -> Result<tenant::Model> {
        let name = name.trim();
        if name.is_empty() {
            bail!("tenant name must not be empty");
        }
        if name.chars().count() > 255 {
            bail!("tenant name must be at most 255 characters");
        }

        let model = tenant::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            name: Set(name.to_string()),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
        };
        Ok(Tenant::insert(model)
            .exec_with_returning(&*self.db)
            .await?)
    }

    pub async fn find_by_id(&self, tenant_id: &str) -> Result<Option<tenant::Model>> {
        Ok(Tenant::find_by_id(tenant_id.to_string())
            .one(&*self.db)
            .await?)
    }

    pub async fn exists(&self, tenant_id: &str) -> Result<bool> {
        Ok(self.find_by_id(tenant_id).await?.is_some())
    }

    pub async fn list(&self) -> Result<Vec<tenant::Model>> {
        Ok(Tenant::find()
            .order_by_asc(tenant::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    pub async fn count(&self) -> Result<u64> {
        Ok(Tenant::find().count(&*self.db).await?)
    }
}
