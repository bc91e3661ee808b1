use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use sqlx::PgPool;

use crate::config::{self, TenancyConfig};
use crate::context::RequestScope;
use crate::database::models::Tenant;
use crate::error::ApiError;
use crate::services::tenant_service::TenantService;
use crate::state::AppState;

/// Tenant database pool resolved for this request, injected by middleware.
/// Request code borrows this for the request's duration only; the pool
/// itself stays owned by the registry.
#[derive(Clone)]
pub struct TenantPool(pub PgPool);

/// The tenant a request resolved to. Absent on super-admin requests.
#[derive(Clone, Debug)]
pub struct CurrentTenant(pub Tenant);

/// How a Host header maps onto the tenant directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostClass {
    /// The super-admin origin; binds to the central database.
    SuperAdmin,
    /// Bare, local, or unrelated host; serves the configured default tenant.
    DefaultTenant,
    /// A distinguishable subdomain, to be looked up in the tenant directory.
    Tenant(String),
}

/// Classify a Host header value against the configured root domain.
pub fn classify_host(host: &str, tenancy: &TenancyConfig) -> HostClass {
    let host = host.split(':').next().unwrap_or("").to_ascii_lowercase();
    let root = tenancy.root_domain.to_ascii_lowercase();

    if host.is_empty() || host == root || host == "localhost" || host == "127.0.0.1" {
        return HostClass::DefaultTenant;
    }

    let prefix = match host.strip_suffix(&format!(".{}", root)) {
        Some(prefix) => prefix,
        None => return HostClass::DefaultTenant,
    };

    // The routing key is the label directly left of the root domain
    let label = prefix.rsplit('.').next().unwrap_or(prefix);
    if label == tenancy.superadmin_subdomain {
        HostClass::SuperAdmin
    } else {
        HostClass::Tenant(label.to_string())
    }
}

/// Per-request tenant resolution.
///
/// Determines the tenant from the Host header, loads its record from the
/// central database, attaches the tenant's connection pool and a populated
/// [`RequestScope`] to the request, and gates tenants that have not
/// completed setup. Runs after the bearer-auth middleware so the scope can
/// capture the actor.
pub async fn resolve_tenant_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let tenancy = &config::config().tenancy;
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let scope = RequestScope::from_request(&request);

    match classify_host(host, tenancy) {
        HostClass::SuperAdmin => {
            let pool = state.registry.central().await?;
            request.extensions_mut().insert(TenantPool(pool));
            request
                .extensions_mut()
                .insert(Arc::new(scope.as_super_admin()));
        }
        class => {
            let subdomain = match class {
                HostClass::Tenant(subdomain) => subdomain,
                _ => tenancy.default_tenant_subdomain.clone(),
            };

            let service = TenantService::new(state.registry.clone());
            let tenant = service
                .find_by_subdomain(&subdomain)
                .await
                .map_err(|err| {
                    tracing::error!("Tenant lookup failed for '{}': {}", subdomain, err);
                    ApiError::internal_server_error("Failed to resolve tenant")
                })?
                .ok_or_else(|| {
                    tracing::warn!("No active tenant for subdomain '{}'", subdomain);
                    ApiError::tenant_not_found(format!(
                        "No active tenant for subdomain '{}'",
                        subdomain
                    ))
                })?;

            let pool = state
                .registry
                .tenant_pool(&tenant.database)
                .await
                .map_err(|err| {
                    tracing::error!(
                        "Failed to get database pool for tenant '{}': {}",
                        tenant.database,
                        err
                    );
                    ApiError::internal_server_error("Tenant database unavailable")
                })?;

            // Gate everything but the setup endpoint until onboarding completes
            if !tenant.setup_complete && request.uri().path() != tenancy.setup_path {
                return Err(ApiError::setup_required(format!(
                    "Tenant '{}' has not completed setup",
                    tenant.subdomain
                )));
            }

            tracing::debug!(
                "Tenant resolution successful: {} ({})",
                tenant.name,
                tenant.database
            );

            request
                .extensions_mut()
                .insert(Arc::new(scope.for_tenant(tenant.id)));
            request.extensions_mut().insert(CurrentTenant(tenant));
            request.extensions_mut().insert(TenantPool(pool));
        }
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenancy() -> TenancyConfig {
        TenancyConfig {
            root_domain: "backoffice.example.com".to_string(),
            superadmin_subdomain: "admin".to_string(),
            default_tenant_subdomain: "demo".to_string(),
            setup_path: "/setup".to_string(),
        }
    }

    #[test]
    fn subdomain_routes_to_tenant() {
        assert_eq!(
            classify_host("acme.backoffice.example.com", &tenancy()),
            HostClass::Tenant("acme".to_string())
        );
    }

    #[test]
    fn superadmin_subdomain_is_distinguished() {
        assert_eq!(
            classify_host("admin.backoffice.example.com", &tenancy()),
            HostClass::SuperAdmin
        );
    }

    #[test]
    fn bare_and_local_hosts_fall_back_to_default() {
        assert_eq!(
            classify_host("backoffice.example.com", &tenancy()),
            HostClass::DefaultTenant
        );
        assert_eq!(
            classify_host("localhost:3000", &tenancy()),
            HostClass::DefaultTenant
        );
        assert_eq!(classify_host("127.0.0.1", &tenancy()), HostClass::DefaultTenant);
        assert_eq!(classify_host("", &tenancy()), HostClass::DefaultTenant);
    }

    #[test]
    fn unrelated_host_falls_back_to_default() {
        assert_eq!(
            classify_host("something.else.net", &tenancy()),
            HostClass::DefaultTenant
        );
    }

    #[test]
    fn port_and_case_are_ignored() {
        assert_eq!(
            classify_host("Acme.Backoffice.Example.COM:8080", &tenancy()),
            HostClass::Tenant("acme".to_string())
        );
    }

    #[test]
    fn nested_labels_use_the_one_nearest_the_root() {
        assert_eq!(
            classify_host("extra.acme.backoffice.example.com", &tenancy()),
            HostClass::Tenant("acme".to_string())
        );
    }
}
