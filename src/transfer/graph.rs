//! Repository graph
//!
//! Orders repository models so every table follows the tables it references.
//! Built once at startup and shared read-only by exports and imports.

use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use tracing::{debug, info};

use super::error::ConfigurationError;
use super::schema::{RepositoryModel, TENANT_COLUMN, TenantScope};

/// Edge weight: the referencing column on the dependent table.
#[derive(Debug, Clone)]
struct Reference {
    column: String,
    nullable: bool,
}

/// Dependency graph over model positions. Edges run from the referenced table
/// to the table holding the foreign key.
type Dependencies = DiGraph<usize, Reference>;

/// Ordered arena of repository models with a name index.
#[derive(Debug, Clone)]
pub struct RepositoryGraph {
    models: Vec<RepositoryModel>,
    index: HashMap<String, usize>,
    deferred: HashSet<(String, String)>,
}

impl RepositoryGraph {
    /// Validates relation targets and orders the models so references point backwards.
    ///
    /// Cycles are found as strongly connected components. Inside each one the
    /// first table (in registration order) whose references into the component
    /// are all nullable has them deferred, until no cycle remains. A component
    /// with no such table is a non-nullable cycle. Ties in the final ordering
    /// resolve in registration order.
    pub fn build(models: Vec<RepositoryModel>) -> Result<Self, ConfigurationError> {
        let mut positions = HashMap::with_capacity(models.len());
        for (i, model) in models.iter().enumerate() {
            if positions.insert(model.table_name.clone(), i).is_some() {
                return Err(ConfigurationError::DuplicateTable {
                    table: model.table_name.clone(),
                });
            }
        }

        let root = models.iter().position(|m| m.scope == TenantScope::Root);
        let mut deferred = HashSet::new();
        let mut graph = Dependencies::with_capacity(models.len(), models.len() * 2);
        for i in 0..models.len() {
            graph.add_node(i);
        }

        for (i, model) in models.iter().enumerate() {
            for fk in &model.foreign_keys {
                let Some(&target) = positions.get(&fk.target_table) else {
                    return Err(ConfigurationError::UnknownTarget {
                        table: model.table_name.clone(),
                        column: fk.column.clone(),
                        target: fk.target_table.clone(),
                    });
                };
                if target == i {
                    if !fk.nullable {
                        return Err(ConfigurationError::NonNullableCycle {
                            tables: vec![model.table_name.clone()],
                        });
                    }
                    deferred.insert((model.table_name.clone(), fk.column.clone()));
                    continue;
                }
                graph.add_edge(
                    NodeIndex::new(target),
                    NodeIndex::new(i),
                    Reference {
                        column: fk.column.clone(),
                        nullable: fk.nullable,
                    },
                );
            }

            for pivot in &model.many_to_many {
                if !positions.contains_key(&pivot.target_table) {
                    return Err(ConfigurationError::UnknownPivotTarget {
                        table: model.table_name.clone(),
                        pivot: pivot.pivot_table.clone(),
                        target: pivot.target_table.clone(),
                    });
                }
            }

            // Tenant rows always follow the tenant table itself.
            if let Some(root) = root
                && model.is_tenant_based()
                && root != i
            {
                graph.add_edge(
                    NodeIndex::new(root),
                    NodeIndex::new(i),
                    Reference {
                        column: TENANT_COLUMN.to_string(),
                        nullable: false,
                    },
                );
            }
        }

        break_cycles(&mut graph, &models, &mut deferred)?;
        let order = registration_ordered_toposort(&graph);

        let mut slots: Vec<Option<RepositoryModel>> = models.into_iter().map(Some).collect();
        let models: Vec<RepositoryModel> = order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect();
        let index = models
            .iter()
            .enumerate()
            .map(|(i, m)| (m.table_name.clone(), i))
            .collect();

        info!(
            tables = models.len(),
            deferred = deferred.len(),
            "Repository graph built"
        );

        Ok(Self {
            models,
            index,
            deferred,
        })
    }

    /// Models in processing order.
    pub fn ordered(&self) -> &[RepositoryModel] {
        &self.models
    }

    pub fn get(&self, table: &str) -> Option<&RepositoryModel> {
        self.index.get(table).map(|&i| &self.models[i])
    }

    pub fn position(&self, table: &str) -> Option<usize> {
        self.index.get(table).copied()
    }

    pub fn contains(&self, table: &str) -> bool {
        self.index.contains_key(table)
    }

    /// Whether the reference is written as NULL first and patched after all tables.
    pub fn is_deferred(&self, table: &str, column: &str) -> bool {
        self.deferred
            .contains(&(table.to_string(), column.to_string()))
    }

    pub fn deferred_edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.deferred
            .iter()
            .map(|(table, column)| (table.as_str(), column.as_str()))
    }

    /// Models named in `names`, in graph order. Unknown names are an error.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<&RepositoryModel>, String> {
        let mut wanted = HashSet::new();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            if !self.contains(name) {
                return Err(name.to_string());
            }
            wanted.insert(name);
        }
        Ok(self
            .models
            .iter()
            .filter(|m| wanted.contains(m.table_name.as_str()))
            .collect())
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// The tenant table, when the catalogue registers one.
    pub fn tenant_root(&self) -> Option<&RepositoryModel> {
        self.models.iter().find(|m| m.scope == TenantScope::Root)
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.table_name.as_str()).collect()
    }
}

/// Removes deferred edges until the graph is acyclic.
fn break_cycles(
    graph: &mut Dependencies,
    models: &[RepositoryModel],
    deferred: &mut HashSet<(String, String)>,
) -> Result<(), ConfigurationError> {
    loop {
        let Some(mut component) = tarjan_scc(&*graph)
            .into_iter()
            .find(|component| component.len() > 1)
        else {
            return Ok(());
        };
        component.sort_unstable();
        let members: HashSet<NodeIndex> = component.iter().copied().collect();

        let candidate = component.iter().copied().find(|&node| {
            graph
                .edges_directed(node, Direction::Incoming)
                .filter(|edge| members.contains(&edge.source()))
                .all(|edge| edge.weight().nullable)
        });

        let Some(candidate) = candidate else {
            let tables = component
                .iter()
                .map(|node| models[graph[*node]].table_name.clone())
                .collect();
            return Err(ConfigurationError::NonNullableCycle { tables });
        };

        let table = &models[graph[candidate]].table_name;
        for edge in graph
            .edges_directed(candidate, Direction::Incoming)
            .filter(|edge| members.contains(&edge.source()))
        {
            debug!(
                table = %table,
                column = %edge.weight().column,
                "Deferring nullable reference to break cycle"
            );
            deferred.insert((table.clone(), edge.weight().column.clone()));
        }
        graph.retain_edges(|g, edge| {
            g.edge_endpoints(edge)
                .is_none_or(|(source, target)| target != candidate || !members.contains(&source))
        });
    }
}

/// Kahn's algorithm over an acyclic graph, taking the lowest registration
/// position whenever several tables are ready.
fn registration_ordered_toposort(graph: &Dependencies) -> Vec<usize> {
    let mut pending: Vec<usize> = graph
        .node_indices()
        .map(|node| graph.edges_directed(node, Direction::Incoming).count())
        .collect();
    let mut ready: BTreeSet<usize> = graph
        .node_indices()
        .filter(|node| pending[node.index()] == 0)
        .map(|node| graph[node])
        .collect();

    let mut order = Vec::with_capacity(graph.node_count());
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for edge in graph.edges_directed(NodeIndex::new(next), Direction::Outgoing) {
            let dependent = edge.target().index();
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.insert(graph[edge.target()]);
            }
        }
    }
    order
}
