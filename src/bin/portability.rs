//! Command line access to the export/import engine, for running jobs outside
//! the API process.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use portability::{
    config::{AppConfig, ConfigLoader},
    db,
    repositories::TenantRepository,
    seeds, telemetry,
    transfer::{EntityRegistry, ExportRequest, Exporter, ImportMode, ImportRequest, Importer},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "portability", version, about = "Tenant data export and import")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply pending database migrations
    Migrate,
    /// Insert missing reference data (countries, currencies, default tags)
    Seed,
    /// Create an empty tenant and print its id
    CreateTenant {
        #[arg(long)]
        name: String,
    },
    /// Print the table processing order
    Graph,
    /// Export a tenant into a zip archive
    Export {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        out: PathBuf,
        /// Comma separated table names; all tables when omitted
        #[arg(long, value_delimiter = ',')]
        tables: Option<Vec<String>>,
        /// Header-only CSVs
        #[arg(long)]
        template: bool,
        #[arg(long)]
        organization: Option<String>,
    },
    /// Import an archive into a tenant
    Import {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = ModeArg::Merge)]
        mode: ModeArg,
        /// User attached to every imported organization
        #[arg(long)]
        user: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Clean,
    Merge,
}

impl From<ModeArg> for ImportMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Clean => ImportMode::Clean,
            ModeArg::Merge => ImportMode::Merge,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::new()
        .load()
        .context("Failed to load configuration")?;
    telemetry::init_tracing(&config).context("Failed to initialize tracing")?;

    let db = db::init_pool(&config).await?;

    match cli.command {
        Command::Migrate => db::run_migrations(&db).await?,
        Command::Seed => {
            let report = seeds::seed_reference_data(&db).await?;
            println!("{report:?}");
        }
        Command::CreateTenant { name } => {
            let tenant = TenantRepository::new(Arc::new(db)).create(&name).await?;
            println!("{}", tenant.id);
        }
        Command::Graph => {
            let graph = EntityRegistry::from_config(&config)?.build_graph()?;
            for (position, model) in graph.ordered().iter().enumerate() {
                println!("{position:>3} {} ({})", model.table_name, model.provider);
            }
        }
        Command::Export {
            tenant,
            out,
            tables,
            template,
            organization,
        } => {
            let request = ExportRequest {
                tenant_id: tenant,
                organization_id: organization,
                tables,
                template,
            };
            export(&config, db, request, out).await?;
        }
        Command::Import {
            tenant,
            file,
            mode,
            user,
        } => {
            let request = ImportRequest {
                tenant_id: tenant,
                mode: mode.into(),
                user_id: user,
            };
            import(&config, db, request, file).await?;
        }
    }

    Ok(())
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    token
}

async fn ensure_tenant(db: &DatabaseConnection, tenant_id: &str) -> Result<()> {
    if !TenantRepository::new(Arc::new(db.clone()))
        .exists(tenant_id)
        .await?
    {
        bail!("tenant {tenant_id} does not exist");
    }
    Ok(())
}

async fn export(
    config: &AppConfig,
    db: DatabaseConnection,
    request: ExportRequest,
    out: PathBuf,
) -> Result<()> {
    if !request.template {
        ensure_tenant(&db, &request.tenant_id).await?;
    }
    let graph = Arc::new(EntityRegistry::from_config(config)?.build_graph()?);
    let exporter = Exporter::new(db, graph, config.work_dir.clone());

    let (job, report) = exporter.run(&request, cancel_on_ctrl_c()).await?;
    let mut file = tokio::fs::File::create(&out)
        .await
        .with_context(|| format!("Failed to create {}", out.display()))?;
    exporter.deliver(job, &mut file).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn import(
    config: &AppConfig,
    db: DatabaseConnection,
    request: ImportRequest,
    file: PathBuf,
) -> Result<()> {
    ensure_tenant(&db, &request.tenant_id).await?;
    let graph = Arc::new(EntityRegistry::from_config(config)?.build_graph()?);
    let importer = Importer::new(db, graph, config.work_dir.clone());

    let report = importer.run(&file, request, cancel_on_ctrl_c()).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
