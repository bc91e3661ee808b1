// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 403, distinguished code: tenant exists but onboarding is incomplete.
    // Clients branch on the code and redirect to their setup flow.
    SetupRequired(String),

    // 404 Not Found
    NotFound(String),

    // 404, distinguished code: the request's host did not resolve to a tenant
    TenantNotFound(String),

    // 409 Conflict
    Conflict(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::SetupRequired(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::TenantNotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::SetupRequired(msg)
            | ApiError::NotFound(msg)
            | ApiError::TenantNotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::InternalServerError(msg)
            | ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::SetupRequired(_) => "SETUP_REQUIRED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::TenantNotFound(_) => "TENANT_NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        json!({
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        })
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn setup_required(message: impl Into<String>) -> Self {
        ApiError::SetupRequired(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn tenant_not_found(message: impl Into<String>) -> Self {
        ApiError::TenantNotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

// Convert other error types to ApiError
impl From<crate::database::registry::RegistryError> for ApiError {
    fn from(err: crate::database::registry::RegistryError) -> Self {
        use crate::database::registry::RegistryError;
        match err {
            RegistryError::InvalidDatabaseName(name) => {
                ApiError::bad_request(format!("Invalid database name: {}", name))
            }
            RegistryError::ConfigMissing(_) | RegistryError::InvalidDatabaseUrl => {
                tracing::error!("Registry configuration error: {}", err);
                ApiError::service_unavailable("Database configuration unavailable")
            }
            RegistryError::Sqlx(sqlx_err) => {
                tracing::error!("Database connection error: {}", sqlx_err);
                ApiError::internal_server_error("Database error occurred")
            }
        }
    }
}

impl From<crate::audit::store::StoreError> for ApiError {
    fn from(err: crate::audit::store::StoreError) -> Self {
        use crate::audit::store::StoreError;
        match err {
            StoreError::NotFound(msg) => ApiError::not_found(msg),
            StoreError::InvalidField(field) => {
                ApiError::bad_request(format!("Unknown or read-only field: {}", field))
            }
            StoreError::Sqlx(sqlx_err) => {
                // Log the real error but return a generic message
                tracing::error!("SQLx error: {}", sqlx_err);
                ApiError::internal_server_error("Database error occurred")
            }
            StoreError::Serialization(e) => {
                tracing::error!("Serialization error: {}", e);
                ApiError::internal_server_error("Failed to process record")
            }
        }
    }
}

impl From<crate::services::tenant_service::TenantError> for ApiError {
    fn from(err: crate::services::tenant_service::TenantError) -> Self {
        use crate::services::tenant_service::TenantError;
        match err {
            TenantError::AlreadyExists(sub) => {
                ApiError::conflict(format!("Tenant subdomain already in use: {}", sub))
            }
            TenantError::InvalidSubdomain(msg) => ApiError::bad_request(msg),
            TenantError::InvalidPasskey => ApiError::forbidden("Invalid setup passkey"),
            TenantError::NotFound(msg) => ApiError::not_found(msg),
            TenantError::Registry(e) => e.into(),
            TenantError::Database(sqlx_err) => {
                tracing::error!("Tenant service database error: {}", sqlx_err);
                ApiError::internal_server_error("Database error occurred")
            }
        }
    }
}

impl From<crate::outbox::store::OutboxError> for ApiError {
    fn from(err: crate::outbox::store::OutboxError) -> Self {
        tracing::error!("Outbox error: {}", err);
        ApiError::internal_server_error("Failed to queue email")
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}
