//! Database seeding
//!
//! Reference rows every tenant relies on: countries, currencies and global
//! default tags. Seeding is idempotent.

pub mod reference_data;

pub use reference_data::{SeedReport, seed_reference_data};
