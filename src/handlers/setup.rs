use axum::{extract::State, Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::middleware::CurrentTenant;
use crate::services::tenant_service::TenantService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SetupRequest {
    pub passkey: String,
}

/// POST /setup - Complete tenant onboarding with the one-time passkey.
/// This is the only tenant route reachable while setup is incomplete.
pub async fn complete(
    State(state): State<AppState>,
    Extension(CurrentTenant(tenant)): Extension<CurrentTenant>,
    Json(payload): Json<SetupRequest>,
) -> Result<Json<Value>, ApiError> {
    let tenant = TenantService::new(state.registry.clone())
        .complete_setup(tenant.id, &payload.passkey)
        .await?;

    tracing::info!("Tenant '{}' completed setup", tenant.subdomain);
    Ok(Json(json!({ "success": true, "data": tenant })))
}
