//! Core entity catalogue
//!
//! Declares every table the service moves between tenants, with its columns,
//! relations and unique identifiers. Registration order is the tie-break order
//! of the repository graph.

use crate::transfer::registry::EntityProvider;
use crate::transfer::schema::{ColumnDef, EntityDescriptor, PivotRef, TenantScope};

/// Built-in entities. Always registered first.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreEntities;

impl EntityProvider for CoreEntities {
    fn name(&self) -> &str {
        "core"
    }

    fn entities(&self) -> Vec<EntityDescriptor> {
        vec![
            EntityDescriptor::new("tenant", TenantScope::Root)
                .column(ColumnDef::text("name"))
                .column(ColumnDef::timestamp("created_at"))
                .column(ColumnDef::timestamp("updated_at").nullable()),
            EntityDescriptor::global("country")
                .column(ColumnDef::text("code"))
                .column(ColumnDef::text("name"))
                .column(ColumnDef::boolean("is_active"))
                .unique("code")
                .static_data(),
            EntityDescriptor::global("currency")
                .column(ColumnDef::text("code"))
                .column(ColumnDef::text("name"))
                .unique("code")
                .static_data(),
            EntityDescriptor::tenant_based("user")
                .column(ColumnDef::text("email"))
                .column(ColumnDef::text("first_name").nullable())
                .column(ColumnDef::text("last_name").nullable())
                .column(ColumnDef::boolean("is_active"))
                .column(ColumnDef::timestamp("created_at"))
                .unique("email")
                .static_data(),
            EntityDescriptor::tenant_based("role")
                .column(ColumnDef::text("name"))
                .column(ColumnDef::boolean("is_system"))
                .unique("name"),
            EntityDescriptor::tenant_based("organization")
                .column(ColumnDef::text("name"))
                .column(ColumnDef::text("currency_code").nullable())
                .column(ColumnDef::boolean("is_default"))
                .column(ColumnDef::timestamp("created_at"))
                .column(ColumnDef::text("created_by_user_id").nullable())
                .belongs_to("created_by_user_id", "user"),
            EntityDescriptor::tenant_based("user_organization")
                .column(ColumnDef::text("organization_id"))
                .column(ColumnDef::text("user_id"))
                .column(ColumnDef::boolean("is_active"))
                .belongs_to("organization_id", "organization")
                .belongs_to("user_id", "user"),
            EntityDescriptor::tenant_based("employee")
                .column(ColumnDef::text("organization_id"))
                .column(ColumnDef::text("user_id"))
                .column(ColumnDef::timestamp("start_date").nullable())
                .column(ColumnDef::float("billable_rate").nullable())
                .column(ColumnDef::boolean("is_active"))
                .belongs_to("organization_id", "organization")
                .belongs_to("user_id", "user"),
            // Global defaults carry a NULL tenant.
            EntityDescriptor::tenant_based("tag")
                .column(ColumnDef::text("tenant_id").nullable())
                .column(ColumnDef::text("organization_id").nullable())
                .column(ColumnDef::text("name"))
                .column(ColumnDef::text("color").nullable())
                .column(ColumnDef::boolean("is_system"))
                .belongs_to("organization_id", "organization")
                .unique("name"),
            EntityDescriptor::tenant_based("organization_project")
                .column(ColumnDef::text("organization_id"))
                .column(ColumnDef::text("name"))
                .column(ColumnDef::boolean("billable"))
                .column(ColumnDef::timestamp("created_at"))
                .belongs_to("organization_id", "organization")
                .many_to_many(PivotRef::new(
                    "organization_project_employee",
                    "organization_project_id",
                    "employee_id",
                    "employee",
                )),
            EntityDescriptor::tenant_based("task")
                .column(ColumnDef::text("organization_id"))
                .column(ColumnDef::text("project_id").nullable())
                .column(ColumnDef::text("parent_id").nullable())
                .column(ColumnDef::text("title"))
                .column(ColumnDef::text("status"))
                .column(ColumnDef::integer("estimate").nullable())
                .column(ColumnDef::timestamp("due_date").nullable())
                .column(ColumnDef::text("created_by_user_id").nullable())
                .belongs_to("organization_id", "organization")
                .belongs_to("project_id", "organization_project")
                .belongs_to("parent_id", "task")
                .belongs_to("created_by_user_id", "user")
                .many_to_many(PivotRef::new("tag_task", "task_id", "tag_id", "tag")),
            EntityDescriptor::tenant_based("time_log")
                .column(ColumnDef::text("organization_id"))
                .column(ColumnDef::text("employee_id"))
                .column(ColumnDef::text("task_id").nullable())
                .column(ColumnDef::timestamp("started_at"))
                .column(ColumnDef::timestamp("stopped_at").nullable())
                .column(ColumnDef::boolean("is_billable"))
                .column(ColumnDef::text("description").nullable())
                .belongs_to("organization_id", "organization")
                .belongs_to("employee_id", "employee")
                .belongs_to("task_id", "task"),
            EntityDescriptor::tenant_based("invoice")
                .column(ColumnDef::text("organization_id"))
                .column(ColumnDef::integer("invoice_number"))
                .column(ColumnDef::timestamp("invoice_date"))
                .column(ColumnDef::float("total_value"))
                .column(ColumnDef::text("currency_code"))
                .column(ColumnDef::boolean("paid"))
                .column(ColumnDef::text("sent_to_id").nullable())
                .belongs_to("organization_id", "organization")
                .belongs_to("sent_to_id", "employee"),
        ]
    }
}
