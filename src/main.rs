//! # Portability API Entry Point

use anyhow::{Context, Result};
use portability::{
    config::ConfigLoader, db, seeds, server::run_server, telemetry, transfer::EntityRegistry,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ConfigLoader::new()
        .load()
        .context("Failed to load configuration")?;
    config.require_operator_tokens()?;

    telemetry::init_tracing(&config).context("Failed to initialize tracing")?;
    if let Ok(redacted) = config.redacted_json() {
        tracing::info!(profile = %config.profile, config = %redacted, "Configuration loaded");
    }

    // Fail fast on catalogue errors before touching the database.
    let graph = EntityRegistry::from_config(&config)?.build_graph()?;

    let db = db::init_pool(&config).await?;
    db::run_migrations(&db).await?;
    if config.seed_reference_data {
        seeds::seed_reference_data(&db).await?;
    }

    run_server(config, db, graph).await
}
