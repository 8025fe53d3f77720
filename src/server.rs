//! # Server Configuration
//!
//! Router, shared state and OpenAPI document for the portability API.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::auth_middleware;
use crate::config::AppConfig;
use crate::handlers;
use crate::telemetry::trace_context_middleware;
use crate::transfer::{Exporter, Importer, RepositoryGraph};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub graph: Arc<RepositoryGraph>,
    /// Cancelled on shutdown; every job runs on a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, db: DatabaseConnection, graph: Arc<RepositoryGraph>) -> Self {
        Self {
            config,
            db,
            graph,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn exporter(&self) -> Exporter {
        Exporter::new(
            self.db.clone(),
            Arc::clone(&self.graph),
            self.config.work_dir.clone(),
        )
    }

    pub fn importer(&self) -> Importer {
        Importer::new(
            self.db.clone(),
            Arc::clone(&self.graph),
            self.config.work_dir.clone(),
        )
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let api = Router::new()
        .route("/export", get(handlers::export::export_tenant))
        .route("/export/template", get(handlers::export::export_template))
        .route("/export/filter", get(handlers::export::export_filtered))
        .route("/import", post(handlers::import::import_archive))
        .route("/import/history", get(handlers::import::list_history))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes()))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .nest("/api/v1", api)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Serves the API until ctrl-c, then cancels running jobs.
pub async fn run_server(config: AppConfig, db: DatabaseConnection, graph: RepositoryGraph) -> Result<()> {
    let addr = config.bind_addr().context("Invalid server address")?;
    let state = AppState::new(Arc::new(config), db, Arc::new(graph));
    let shutdown = state.shutdown.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown requested, cancelling running jobs");
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::export::export_tenant,
        crate::handlers::export::export_template,
        crate::handlers::export::export_filtered,
        crate::handlers::import::import_archive,
        crate::handlers::import::list_history,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::models::import_history::ImportStatus,
            crate::handlers::types::ImportHistoryResponse,
            crate::handlers::import::ImportUpload,
            crate::transfer::ImportMode,
            crate::error::ApiError,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "root", description = "Service information"),
        (name = "export", description = "Tenant data export"),
        (name = "import", description = "Tenant data import"),
    ),
    info(
        title = "Tenant Portability API",
        description = "Export a tenant's data as a CSV archive and import it into another tenant",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}
