//! # Data Models
//!
//! SeaORM entities for the tables the service manages directly. Catalogue
//! tables are read and written generically through the transfer store.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod import_history;
pub mod import_record;
pub mod tenant;

pub use import_history::Entity as ImportHistory;
pub use import_record::Entity as ImportRecord;
pub use tenant::Entity as Tenant;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "portability".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
