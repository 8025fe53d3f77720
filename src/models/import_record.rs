//! Identifier translation record
//!
//! Maps an identifier from an imported archive to the row created (or reused)
//! for it in the destination tenant.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "import_record")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Destination tenant the translation belongs to
    pub tenant_id: String,

    /// Table name of the translated row
    pub entity_type: String,

    /// Identifier as it appears in the archive
    pub source_id: String,

    /// Identifier of the row in the destination database
    pub destination_id: String,

    pub imported_date: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
