use crate::transfer::registry::EntityProvider;
use crate::transfer::schema::{ColumnDef, EntityDescriptor};

/// Release notes published per organization.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangelogPlugin;

impl EntityProvider for ChangelogPlugin {
    fn name(&self) -> &str {
        "changelog"
    }

    fn entities(&self) -> Vec<EntityDescriptor> {
        vec![
            EntityDescriptor::tenant_based("changelog")
                .column(ColumnDef::text("organization_id"))
                .column(ColumnDef::text("icon").nullable())
                .column(ColumnDef::text("title"))
                .column(ColumnDef::text("content"))
                .column(ColumnDef::timestamp("date"))
                .column(ColumnDef::boolean("is_published"))
                .belongs_to("organization_id", "organization"),
        ]
    }
}
