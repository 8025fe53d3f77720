//! # Authentication
//!
//! Operator bearer authentication and tenant header validation for the
//! portability endpoints.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ApiError, bad_request, unauthorized};
use crate::server::AppState;

pub const TENANT_HEADER: &str = "X-Tenant-Id";
pub const USER_HEADER: &str = "X-User-Id";

/// Tenant the request is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: String,
    /// User performing the request, used to re-attach imported organizations.
    pub user_id: Option<String>,
}

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.config)
    }
}

/// Validates the bearer token and tenant headers, then stores a [`TenantContext`].
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = request.headers();
    let token = extract_bearer_token(headers)?;
    validate_token(&config, token)?;

    let context = TenantContext {
        tenant_id: extract_uuid_header(headers, TENANT_HEADER)?
            .ok_or_else(|| {
                bad_request("Missing required header")
                    .with_details(serde_json::json!({ TENANT_HEADER: "Required header is missing" }))
            })?,
        user_id: extract_uuid_header(headers, USER_HEADER)?,
    };
    tracing::debug!(tenant_id = %context.tenant_id, "Authenticated operator request");

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| unauthorized(Some("Missing Authorization header")))?
        .to_str()
        .map_err(|_| unauthorized(Some("Invalid Authorization header")))?;

    header
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized(Some("Authorization header must use Bearer scheme")))
}

fn validate_token(config: &AppConfig, token: &str) -> Result<(), ApiError> {
    let is_valid = config
        .operator_tokens
        .iter()
        .any(|configured| ConstantTimeEq::ct_eq(token.as_bytes(), configured.as_bytes()).into());

    if is_valid {
        Ok(())
    } else {
        Err(unauthorized(Some("Invalid bearer token")))
    }
}

/// Reads an optional header that must hold a UUID when present.
fn extract_uuid_header(headers: &HeaderMap, name: &str) -> Result<Option<String>, ApiError> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };
    let invalid = || {
        bad_request("Invalid identifier header")
            .with_details(serde_json::json!({ name: "Must be a valid UUID" }))
    };
    let value = value.to_str().map_err(|_| invalid())?;
    let parsed = value.trim().parse::<Uuid>().map_err(|_| invalid())?;
    Ok(Some(parsed.to_string()))
}

/// OpenAPI header parameters for tenant-scoped endpoints.
#[derive(Debug, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Header)]
pub struct TenantHeaders {
    /// Tenant identifier (UUID) that scopes the request
    #[serde(rename = "X-Tenant-Id")]
    #[param(rename = "X-Tenant-Id", value_type = String)]
    pub tenant_id: String,
    /// Importing user (UUID), attached to every imported organization
    #[serde(rename = "X-User-Id")]
    #[param(rename = "X-User-Id", value_type = Option<String>)]
    pub user_id: Option<String>,
}

impl<S> FromRequestParts<S> for TenantContext
where
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TenantContext>()
            .cloned()
            .ok_or_else(|| unauthorized(Some("Operator authentication required")))
    }
}
