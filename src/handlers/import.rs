//! Import endpoints
//!
//! `POST /import` stages the uploaded archive, runs the import on its own task
//! and records the outcome in the import history.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, Query, State},
};
use serde::Deserialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::auth::{TenantContext, TenantHeaders};
use crate::error::{ApiError, bad_request};
use crate::handlers::ensure_tenant;
use crate::handlers::types::{HistoryQuery, ImportHistoryResponse};
use crate::models::import_history::ImportStatus;
use crate::repositories::{ImportHistoryRepository, NewImportHistory};
use crate::server::AppState;
use crate::transfer::{ImportMode, ImportRequest, PortabilityError};

const DEFAULT_UPLOAD_NAME: &str = "import.zip";

/// Multipart body of `POST /import` (documentation only)
#[derive(Debug, Deserialize, ToSchema)]
#[allow(dead_code)]
pub struct ImportUpload {
    /// Archive produced by an export
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    /// `CLEAN` purges the tenant's non-static rows first, `MERGE` keeps them
    #[serde(rename = "importType")]
    pub import_type: ImportMode,
}

struct Upload {
    file_name: String,
    data: axum::body::Bytes,
    mode: ImportMode,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut file = None;
    let mut mode = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field
                    .file_name()
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or(DEFAULT_UPLOAD_NAME)
                    .to_string();
                file = Some((file_name, field.bytes().await?));
            }
            Some("importType") => {
                let raw = field.text().await?;
                mode = Some(raw.parse::<ImportMode>().map_err(|message| {
                    bad_request(&message).with_details(serde_json::json!({ "importType": raw }))
                })?);
            }
            _ => {}
        }
    }

    let (file_name, data) = file.ok_or_else(|| {
        bad_request("Missing archive").with_details(serde_json::json!({ "file": "required" }))
    })?;
    if data.is_empty() {
        return Err(bad_request("Uploaded archive is empty"));
    }
    let mode = mode.ok_or_else(|| {
        bad_request("Missing import type")
            .with_details(serde_json::json!({ "importType": "CLEAN or MERGE required" }))
    })?;

    Ok(Upload {
        file_name,
        data,
        mode,
    })
}

/// Import an exported archive into the caller's tenant
#[utoipa::path(
    post,
    path = "/api/v1/import",
    params(TenantHeaders),
    request_body(content = ImportUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Import history entry with status SUCCESS or FAILED", body = ImportHistoryResponse),
        (status = 400, description = "Missing file or invalid importType", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Unknown tenant", body = ApiError),
        (status = 413, description = "Upload exceeds the configured limit", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "import"
)]
pub async fn import_archive(
    State(state): State<AppState>,
    tenant: TenantContext,
    multipart: Multipart,
) -> Result<Json<ImportHistoryResponse>, ApiError> {
    ensure_tenant(&state.db, &tenant.tenant_id).await?;
    let upload = read_upload(multipart).await?;

    tokio::fs::create_dir_all(&state.config.work_dir)
        .await
        .map_err(PortabilityError::from)?;
    let staged = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(".zip")
        .tempfile_in(&state.config.work_dir)
        .map_err(PortabilityError::from)?;
    tokio::fs::write(staged.path(), &upload.data)
        .await
        .map_err(PortabilityError::from)?;

    let importer = state.importer();
    let cancel = state.shutdown.child_token();
    let archive_path = staged.path().to_path_buf();
    let request = ImportRequest {
        tenant_id: tenant.tenant_id.clone(),
        mode: upload.mode,
        user_id: tenant.user_id.clone(),
    };
    let outcome = tokio::spawn(async move { importer.run(&archive_path, request, cancel).await })
        .await
        .map_err(PortabilityError::from)
        .and_then(|result| result);

    let status = match &outcome {
        Ok(report) => {
            info!(
                tenant_id = %tenant.tenant_id,
                job_id = %report.job_id,
                file = %upload.file_name,
                "Import succeeded"
            );
            ImportStatus::Success
        }
        Err(err) => {
            warn!(tenant_id = %tenant.tenant_id, file = %upload.file_name, error = %err, "Import failed");
            ImportStatus::Failed
        }
    };

    let history = ImportHistoryRepository::new(Arc::new(state.db.clone()))
        .record(NewImportHistory {
            tenant_id: tenant.tenant_id,
            file: upload.file_name,
            path: staged.path().display().to_string(),
            size: i64::try_from(upload.data.len()).unwrap_or(i64::MAX),
            status,
        })
        .await?;

    let mut response = ImportHistoryResponse::from(history);
    response.report = outcome.ok();
    Ok(Json(response))
}

/// List the caller's import history, newest first
#[utoipa::path(
    get,
    path = "/api/v1/import/history",
    params(TenantHeaders, HistoryQuery),
    responses(
        (status = 200, description = "Import history entries", body = [ImportHistoryResponse]),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "import"
)]
pub async fn list_history(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ImportHistoryResponse>>, ApiError> {
    let entries = ImportHistoryRepository::new(Arc::new(state.db.clone()))
        .list_by_tenant(&tenant.tenant_id, query.limit())
        .await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}
