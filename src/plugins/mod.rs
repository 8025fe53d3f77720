//! Optional entity plugins, enabled by name through `PORTABILITY_PLUGINS`.

pub mod changelog;

use std::sync::Arc;

use crate::transfer::registry::EntityProvider;

pub use changelog::ChangelogPlugin;

/// Names accepted in configuration.
pub const AVAILABLE: &[&str] = &["changelog"];

/// Looks up a plugin by its configured name (case-insensitive).
pub fn plugin_by_name(name: &str) -> Option<Arc<dyn EntityProvider>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "changelog" => Some(Arc::new(ChangelogPlugin)),
        _ => None,
    }
}
