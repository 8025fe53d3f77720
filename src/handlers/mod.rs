//! # API Handlers
//!
//! HTTP endpoints of the portability service.

pub mod export;
pub mod import;
pub mod types;

use crate::models::ServiceInfo;
use axum::response::Json;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Fails with 404 when the tenant does not exist.
pub(crate) async fn ensure_tenant(
    db: &sea_orm::DatabaseConnection,
    tenant_id: &str,
) -> Result<(), crate::error::ApiError> {
    let repo = crate::repositories::TenantRepository::new(std::sync::Arc::new(db.clone()));
    if repo.exists(tenant_id).await? {
        Ok(())
    } else {
        Err(crate::transfer::PortabilityError::MissingTenant(tenant_id.to_string()).into())
    }
}
