//! Entity relation registry
//!
//! Collects entity descriptors from the core catalogue and enabled plugins and
//! validates them into repository models.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use super::error::ConfigurationError;
use super::graph::RepositoryGraph;
use super::schema::{
    EntityDescriptor, ForeignKeyRef, RepositoryModel, TENANT_COLUMN, TenantScope,
    UniqueIdentifier,
};
use crate::config::AppConfig;

/// Capability implemented by anything that contributes persisted entity types.
pub trait EntityProvider: Send + Sync {
    /// Stable provider name, reported in model metadata and logs.
    fn name(&self) -> &str;

    /// Entities in dependency-friendly registration order.
    fn entities(&self) -> Vec<EntityDescriptor>;
}

/// Ordered set of entity providers.
#[derive(Clone, Default)]
pub struct EntityRegistry {
    providers: Vec<Arc<dyn EntityProvider>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the core catalogue and the plugins enabled in configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigurationError> {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::entities::CoreEntities));
        for name in &config.plugins {
            let plugin = crate::plugins::plugin_by_name(name)
                .ok_or_else(|| ConfigurationError::UnknownPlugin { name: name.clone() })?;
            info!(plugin = %name, "Enabling entity plugin");
            registry.register(plugin);
        }
        Ok(registry)
    }

    pub fn register(&mut self, provider: Arc<dyn EntityProvider>) -> &mut Self {
        self.providers.push(provider);
        self
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Produces one validated model per registered entity, in registration order.
    ///
    /// Relation targets are checked by the graph builder, which sees the full set.
    pub fn discover(&self) -> Result<Vec<RepositoryModel>, ConfigurationError> {
        let mut seen = HashSet::new();
        let mut root: Option<String> = None;
        let mut models = Vec::new();

        for provider in &self.providers {
            for descriptor in provider.entities() {
                if !seen.insert(descriptor.table_name.clone()) {
                    return Err(ConfigurationError::DuplicateTable {
                        table: descriptor.table_name,
                    });
                }
                if descriptor.scope == TenantScope::Root {
                    if let Some(first) = &root {
                        return Err(ConfigurationError::MultipleTenantRoots {
                            first: first.clone(),
                            second: descriptor.table_name,
                        });
                    }
                    root = Some(descriptor.table_name.clone());
                }
                let model = reflect(provider.name(), descriptor)?;
                debug!(
                    table = %model.table_name,
                    provider = %model.provider,
                    foreign_keys = model.foreign_keys.len(),
                    pivots = model.many_to_many.len(),
                    "Registered entity"
                );
                models.push(model);
            }
        }

        Ok(models)
    }

    /// Discovers every model and orders them into a graph.
    pub fn build_graph(&self) -> Result<RepositoryGraph, ConfigurationError> {
        RepositoryGraph::build(self.discover()?)
    }
}

fn reflect(provider: &str, descriptor: EntityDescriptor) -> Result<RepositoryModel, ConfigurationError> {
    let table = descriptor.table_name.clone();
    let unknown_column = |column: &str| ConfigurationError::UnknownColumn {
        table: table.clone(),
        column: column.to_string(),
    };

    if descriptor.scope == TenantScope::Tenant
        && !descriptor.columns.iter().any(|c| c.name == TENANT_COLUMN)
    {
        return Err(ConfigurationError::MissingTenantColumn { table });
    }

    let mut foreign_keys = Vec::with_capacity(descriptor.belongs_to.len());
    for (column, target) in &descriptor.belongs_to {
        let def = descriptor
            .columns
            .iter()
            .find(|c| &c.name == column)
            .ok_or_else(|| unknown_column(column))?;
        foreign_keys.push(ForeignKeyRef {
            column: column.clone(),
            target_table: target.clone(),
            nullable: def.nullable,
        });
    }

    let mut unique_identifiers = Vec::with_capacity(descriptor.unique_identifiers.len());
    for column in &descriptor.unique_identifiers {
        if !descriptor.columns.iter().any(|c| &c.name == column) {
            return Err(unknown_column(column));
        }
        unique_identifiers.push(UniqueIdentifier {
            column: column.clone(),
        });
    }

    Ok(RepositoryModel {
        table_name: descriptor.table_name,
        provider: provider.to_string(),
        scope: descriptor.scope,
        is_static: descriptor.is_static,
        columns: descriptor.columns,
        unique_identifiers,
        foreign_keys,
        many_to_many: descriptor.many_to_many,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::schema::ColumnDef;

    struct Fixed(&'static str, Vec<EntityDescriptor>);

    impl EntityProvider for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn entities(&self) -> Vec<EntityDescriptor> {
            self.1.clone()
        }
    }

    fn registry(entities: Vec<EntityDescriptor>) -> EntityRegistry {
        let mut registry = EntityRegistry::new();
        registry.register(Arc::new(Fixed("test", entities)));
        registry
    }

    #[test]
    fn foreign_key_nullability_follows_column() {
        let models = registry(vec![
            EntityDescriptor::global("parent"),
            EntityDescriptor::global("child")
                .column(ColumnDef::text("parent_id").nullable())
                .belongs_to("parent_id", "parent"),
        ])
        .discover()
        .unwrap();

        let fk = models[1].foreign_key("parent_id").unwrap();
        assert!(fk.nullable);
        assert_eq!(fk.target_table, "parent");
        assert_eq!(models[1].provider, "test");
    }

    #[test]
    fn duplicate_tables_are_rejected() {
        let err = registry(vec![
            EntityDescriptor::global("a"),
            EntityDescriptor::global("a"),
        ])
        .discover()
        .unwrap_err();
        assert_eq!(err, ConfigurationError::DuplicateTable { table: "a".into() });
    }

    #[test]
    fn undeclared_columns_are_rejected() {
        let err = registry(vec![
            EntityDescriptor::global("a").belongs_to("b_id", "b"),
        ])
        .discover()
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownColumn { column, .. } if column == "b_id"));

        let err = registry(vec![EntityDescriptor::global("a").unique("code")])
            .discover()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownColumn { column, .. } if column == "code"));
    }

    #[test]
    fn tenant_scope_requires_tenant_column() {
        let err = registry(vec![EntityDescriptor::new("a", TenantScope::Tenant)])
            .discover()
            .unwrap_err();
        assert_eq!(err, ConfigurationError::MissingTenantColumn { table: "a".into() });
    }

    #[test]
    fn only_one_root_is_allowed() {
        let err = registry(vec![
            EntityDescriptor::new("tenant", TenantScope::Root),
            EntityDescriptor::new("account", TenantScope::Root),
        ])
        .discover()
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::MultipleTenantRoots { .. }));
    }

    #[test]
    fn unknown_plugin_fails_configuration() {
        let config = AppConfig {
            plugins: vec!["nope".into()],
            ..AppConfig::default()
        };
        let err = EntityRegistry::from_config(&config).err().unwrap();
        assert_eq!(err, ConfigurationError::UnknownPlugin { name: "nope".into() });
    }

    #[test]
    fn plugins_register_after_core() {
        let config = AppConfig {
            plugins: vec!["changelog".into()],
            ..AppConfig::default()
        };
        let registry = EntityRegistry::from_config(&config).unwrap();
        assert_eq!(registry.provider_names(), vec!["core", "changelog"]);
    }
}
