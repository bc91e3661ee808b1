use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::context::RequestScope;
use crate::error::ApiError;
use crate::services::tenant_service::{NewTenant, TenantService, TenantUpdate};
use crate::state::AppState;

/// Tenant administration is only reachable from the super-admin origin.
fn require_super_admin(scope: &RequestScope) -> Result<(), ApiError> {
    if scope.super_admin {
        Ok(())
    } else {
        Err(ApiError::forbidden("Super-admin origin required"))
    }
}

/// POST /api/tenants - Create a tenant and provision its database.
/// The response is the only place the setup passkey is ever revealed.
pub async fn create(
    State(state): State<AppState>,
    Extension(scope): Extension<Arc<RequestScope>>,
    Json(payload): Json<NewTenant>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    require_super_admin(&scope)?;

    let (tenant, passkey) = TenantService::new(state.registry.clone())
        .create_tenant(payload)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": { "tenant": tenant, "setup_passkey": passkey }
        })),
    ))
}

/// GET /api/tenants - List all tenants
pub async fn list(
    State(state): State<AppState>,
    Extension(scope): Extension<Arc<RequestScope>>,
) -> Result<Json<Value>, ApiError> {
    require_super_admin(&scope)?;

    let tenants = TenantService::new(state.registry.clone())
        .list_tenants()
        .await?;
    Ok(Json(json!({ "success": true, "data": tenants })))
}

/// PATCH /api/tenants/:id - Rename or (de)activate a tenant
pub async fn update(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(scope): Extension<Arc<RequestScope>>,
    Json(payload): Json<TenantUpdate>,
) -> Result<Json<Value>, ApiError> {
    require_super_admin(&scope)?;

    let tenant = TenantService::new(state.registry.clone())
        .update_tenant(id, payload)
        .await?;
    Ok(Json(json!({ "success": true, "data": tenant })))
}

/// DELETE /api/tenants/:id - Remove the tenant record.
/// The tenant's logical database is retained.
pub async fn remove(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(scope): Extension<Arc<RequestScope>>,
) -> Result<Json<Value>, ApiError> {
    require_super_admin(&scope)?;

    let deleted = TenantService::new(state.registry.clone())
        .delete_tenant(id)
        .await?;
    if !deleted {
        return Err(ApiError::not_found(format!("Tenant {} not found", id)));
    }
    Ok(Json(json!({
        "success": true,
        "data": { "deleted": true, "database_retained": true }
    })))
}
