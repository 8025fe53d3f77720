//! # Repository Layer
//!
//! SeaORM access to the service's own tables. Catalogue tables are reached
//! through the transfer engine's table store instead.

pub mod import_history;
pub mod tenant;

pub use import_history::{ImportHistoryRepository, NewImportHistory};
pub use tenant::TenantRepository;
