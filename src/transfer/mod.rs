//! Tenant data portability engine.
//!
//! The registry collects entity descriptors into repository models, the graph
//! orders them so referenced tables come first, and the exporter and importer
//! walk that order.

pub mod archive;
pub mod error;
pub mod exporter;
pub mod graph;
pub mod importer;
pub mod job;
pub mod registry;
pub mod schema;
pub mod store;
pub mod translation;

pub use error::{ConfigurationError, PortabilityError, RowError};
pub use exporter::{ExportRequest, Exporter};
pub use graph::RepositoryGraph;
pub use importer::Importer;
pub use job::{ExportJob, ExportReport, ImportJob, ImportMode, ImportReport, ImportRequest};
pub use registry::{EntityProvider, EntityRegistry};
pub use translation::TranslationStore;
