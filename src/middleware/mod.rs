pub mod auth;
pub mod resolve_tenant;

pub use auth::{bearer_auth_middleware, AuthUser};
pub use resolve_tenant::{resolve_tenant_middleware, CurrentTenant, TenantPool};
