//! # Tenant Portability Library
//!
//! Exports a tenant's data as a zip of CSV files and imports such an archive
//! into another tenant, regenerating every identifier on the way.

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod handlers;
pub mod models;
pub mod plugins;
pub mod repositories;
pub mod seeds;
pub mod server;
pub mod telemetry;
pub mod transfer;
pub use migration;
