//! Identifier translation store
//!
//! Persistent map of `(tenant, entity type, source id) -> destination id`.
//! Writes are single upserts against the unique index so concurrent imports
//! never race through a read-then-write.

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::models::import_record::{ActiveModel, Column, Entity as ImportRecord};

#[derive(Clone)]
pub struct TranslationStore {
    db: DatabaseConnection,
}

impl TranslationStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn lookup(
        &self,
        tenant_id: &str,
        entity_type: &str,
        source_id: &str,
    ) -> Result<Option<String>, DbErr> {
        let record = ImportRecord::find()
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::EntityType.eq(entity_type))
            .filter(Column::SourceId.eq(source_id))
            .one(&self.db)
            .await?;
        Ok(record.map(|r| r.destination_id))
    }

    /// Inserts or overwrites the destination for the key.
    pub async fn record(
        &self,
        tenant_id: &str,
        entity_type: &str,
        source_id: &str,
        destination_id: &str,
    ) -> Result<(), DbErr> {
        let record = ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id.to_string()),
            entity_type: Set(entity_type.to_string()),
            source_id: Set(source_id.to_string()),
            destination_id: Set(destination_id.to_string()),
            imported_date: Set(Utc::now().into()),
        };

        ImportRecord::insert(record)
            .on_conflict(
                OnConflict::columns([Column::TenantId, Column::EntityType, Column::SourceId])
                    .update_columns([Column::DestinationId, Column::ImportedDate])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }
}
