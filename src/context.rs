use std::sync::Arc;

use axum::extract::Request;
use axum::http::header;
use uuid::Uuid;

use crate::middleware::auth::AuthUser;

/// Per-request context: who is acting, from where, and against which tenant.
///
/// Built once by the tenant-resolution middleware and carried through the
/// request as an `Arc` in the request extensions. Audited stores read
/// attribution from it instead of taking actor/network parameters on every
/// call. One instance belongs to exactly one request; it is never shared
/// across concurrent requests.
#[derive(Debug, Clone)]
pub struct RequestScope {
    pub actor: Option<AuthUser>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub method: String,
    pub url: String,
    pub tenant_id: Option<Uuid>,
    pub super_admin: bool,
}

impl RequestScope {
    /// Capture actor and network metadata from an in-flight request.
    /// Tenant fields are filled in by the resolver once lookup completes.
    pub fn from_request(request: &Request) -> Self {
        let actor = request.extensions().get::<AuthUser>().cloned();
        let ip = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string());
        let user_agent = request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        Self {
            actor,
            ip,
            user_agent,
            method: request.method().to_string(),
            url: request.uri().to_string(),
            tenant_id: None,
            super_admin: false,
        }
    }

    pub fn for_tenant(mut self, tenant_id: Uuid) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn as_super_admin(mut self) -> Self {
        self.super_admin = true;
        self
    }

    pub fn actor_id(&self) -> Option<Uuid> {
        self.actor.as_ref().map(|a| a.id)
    }

    /// A scope with no actor and no network metadata, for work that runs
    /// outside any HTTP request (startup tasks, workers, tests).
    pub fn system() -> Arc<Self> {
        Arc::new(Self {
            actor: None,
            ip: None,
            user_agent: None,
            method: "SYSTEM".to_string(),
            url: String::new(),
            tenant_id: None,
            super_admin: false,
        })
    }
}
