//! Export endpoints
//!
//! Each request runs one export job on its own task and streams the zip
//! archive back as an attachment.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::auth::{TenantContext, TenantHeaders};
use crate::error::{ApiError, bad_request};
use crate::handlers::ensure_tenant;
use crate::handlers::types::{ExportFilterQuery, ExportQuery};
use crate::server::AppState;
use crate::transfer::{ExportRequest, PortabilityError};

/// Export every table of the caller's tenant
#[utoipa::path(
    get,
    path = "/api/v1/export",
    params(TenantHeaders, ExportQuery),
    responses(
        (status = 200, description = "Zip archive with one CSV per non-empty table", content_type = "application/zip"),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Unknown tenant", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "export"
)]
pub async fn export_tenant(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    run_export(
        &state,
        ExportRequest {
            tenant_id: tenant.tenant_id,
            organization_id: query.organization_id,
            tables: None,
            template: false,
        },
    )
    .await
}

/// Header-only CSVs for every table, usable as an import template
#[utoipa::path(
    get,
    path = "/api/v1/export/template",
    params(TenantHeaders),
    responses(
        (status = 200, description = "Zip archive of header-only CSVs", content_type = "application/zip"),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "export"
)]
pub async fn export_template(
    State(state): State<AppState>,
    tenant: TenantContext,
) -> Result<Response, ApiError> {
    run_export(
        &state,
        ExportRequest {
            tenant_id: tenant.tenant_id,
            organization_id: None,
            tables: None,
            template: true,
        },
    )
    .await
}

/// Export only the named tables (plus the pivots they own)
#[utoipa::path(
    get,
    path = "/api/v1/export/filter",
    params(TenantHeaders, ExportFilterQuery),
    responses(
        (status = 200, description = "Zip archive restricted to the named tables", content_type = "application/zip"),
        (status = 400, description = "No names given or an unknown table name", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Unknown tenant", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "export"
)]
pub async fn export_filtered(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<ExportFilterQuery>,
) -> Result<Response, ApiError> {
    let names = query.table_names();
    if names.is_empty() {
        return Err(bad_request("At least one table name is required")
            .with_details(serde_json::json!({ "names": "must not be empty" })));
    }

    run_export(
        &state,
        ExportRequest {
            tenant_id: tenant.tenant_id,
            organization_id: query.organization_id,
            tables: Some(names),
            template: false,
        },
    )
    .await
}

async fn run_export(state: &AppState, request: ExportRequest) -> Result<Response, ApiError> {
    if !request.template {
        ensure_tenant(&state.db, &request.tenant_id).await?;
    }

    let exporter = state.exporter();
    let cancel = state.shutdown.child_token();
    let job = tokio::spawn(async move {
        let (job, _report) = exporter.run(&request, cancel).await?;
        Ok::<_, PortabilityError>(job)
    })
    .await
    .map_err(PortabilityError::from)??;

    let file = tokio::fs::File::open(job.archive_path())
        .await
        .map_err(PortabilityError::from)?;
    let length = file.metadata().await.map_err(PortabilityError::from)?.len();
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", job.archive_file_name()))
        .map_err(|e| anyhow::anyhow!("invalid archive file name: {e}"))?;
    debug!(job_id = %job.job_id, bytes = length, "Streaming export");

    // The stream owns the job; its workspace goes when the body is dropped.
    let body = ReaderStream::new(file).map(move |chunk| {
        let _workspace = &job;
        chunk
    });

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (header::CONTENT_LENGTH, HeaderValue::from(length)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(body),
    )
        .into_response())
}
