use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::audit::{AuditEntity, AuditedStore, SqlAuditSink};
use crate::context::RequestScope;
use crate::entities::invoice::{self, Invoice, InvoiceUpdate, NewInvoice, SqlInvoiceStore};
use crate::error::ApiError;
use crate::middleware::{CurrentTenant, TenantPool};
use crate::outbox::NewEmail;
use crate::state::AppState;

/// Writes go through the audited store; the sink shares the tenant pool so
/// audit records land next to the data they describe.
fn audited_store(pool: &TenantPool, scope: Arc<RequestScope>) -> AuditedStore<SqlInvoiceStore> {
    AuditedStore::new(
        SqlInvoiceStore::new(pool.0.clone()),
        Arc::new(SqlAuditSink::new(pool.0.clone())),
        scope,
    )
}

/// GET /api/invoices - List recent invoices
pub async fn list(Extension(pool): Extension<TenantPool>) -> Result<Json<Value>, ApiError> {
    let invoices = SqlInvoiceStore::new(pool.0.clone()).list().await?;
    Ok(Json(json!({ "success": true, "data": invoices })))
}

/// GET /api/invoices/:id - Get a single invoice
pub async fn get_one(
    Path(id): Path<Uuid>,
    Extension(pool): Extension<TenantPool>,
    Extension(scope): Extension<Arc<RequestScope>>,
) -> Result<Json<Value>, ApiError> {
    let invoice = audited_store(&pool, scope)
        .fetch(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Invoice {} not found", id)))?;
    Ok(Json(json!({ "success": true, "data": invoice })))
}

/// POST /api/invoices - Create an invoice
pub async fn create(
    Extension(pool): Extension<TenantPool>,
    Extension(scope): Extension<Arc<RequestScope>>,
    Json(payload): Json<NewInvoice>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let invoice = Invoice::create(payload);
    let saved = audited_store(&pool, scope).insert(&invoice).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": saved })),
    ))
}

/// PUT /api/invoices/:id - Save changes to a loaded invoice
pub async fn update(
    Path(id): Path<Uuid>,
    Extension(pool): Extension<TenantPool>,
    Extension(scope): Extension<Arc<RequestScope>>,
    Json(payload): Json<InvoiceUpdate>,
) -> Result<Json<Value>, ApiError> {
    let store = audited_store(&pool, scope);
    let mut invoice = store
        .fetch(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Invoice {} not found", id)))?;
    invoice.apply(payload);
    let saved = store.update(&invoice).await?;
    Ok(Json(json!({ "success": true, "data": saved })))
}

/// PATCH /api/invoices/:id - Atomic field patch by query
pub async fn patch(
    Path(id): Path<Uuid>,
    Extension(pool): Extension<TenantPool>,
    Extension(scope): Extension<Arc<RequestScope>>,
    Json(patch): Json<Map<String, Value>>,
) -> Result<Json<Value>, ApiError> {
    let mut query = Map::new();
    query.insert("id".to_string(), json!(id));

    let updated = audited_store(&pool, scope)
        .update_one(&query, &patch)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Invoice {} not found", id)))?;
    Ok(Json(json!({ "success": true, "data": updated })))
}

/// DELETE /api/invoices/:id - Delete an invoice
pub async fn remove(
    Path(id): Path<Uuid>,
    Extension(pool): Extension<TenantPool>,
    Extension(scope): Extension<Arc<RequestScope>>,
) -> Result<Json<Value>, ApiError> {
    let deleted = audited_store(&pool, scope).delete(id).await?;
    if !deleted {
        return Err(ApiError::not_found(format!("Invoice {} not found", id)));
    }
    Ok(Json(json!({ "success": true, "data": { "deleted": true } })))
}

/// GET /api/invoices/:id/audit - Audit trail for one invoice
pub async fn audit_trail(
    Path(id): Path<Uuid>,
    Extension(pool): Extension<TenantPool>,
) -> Result<Json<Value>, ApiError> {
    let records = SqlAuditSink::list_for_entity(&pool.0, Invoice::ENTITY_TYPE, id).await?;
    Ok(Json(json!({ "success": true, "data": records })))
}

/// POST /api/invoices/:id/send - Mark the invoice sent and queue the email.
/// Returns 202: delivery happens asynchronously via the outbox worker.
pub async fn send(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(pool): Extension<TenantPool>,
    Extension(scope): Extension<Arc<RequestScope>>,
    Extension(CurrentTenant(tenant)): Extension<CurrentTenant>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let store = audited_store(&pool, scope);

    let mut query = Map::new();
    query.insert("id".to_string(), json!(id));
    let mut patch = Map::new();
    patch.insert("status".to_string(), json!(invoice::status::SENT));

    let updated = store
        .update_one(&query, &patch)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Invoice {} not found", id)))?;

    let org = tenant.org_name.clone().unwrap_or_else(|| tenant.name.clone());
    let email = NewEmail {
        to: updated.customer_email.clone(),
        subject: format!("Invoice {} from {}", updated.number, org),
        text: format!(
            "Hello {},\n\nInvoice {} for {} is ready.\n\nRegards,\n{}",
            updated.customer_name, updated.number, updated.total, org
        ),
        html: Some(format!(
            "<p>Hello {},</p><p>Invoice <strong>{}</strong> for <strong>{}</strong> is ready.</p><p>Regards,<br>{}</p>",
            updated.customer_name, updated.number, updated.total, org
        )),
        attachments: Vec::new(),
        smtp_override: None,
    };
    let job_id = state.outbox.enqueue(email).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "success": true,
            "data": { "invoice": updated, "email_job_id": job_id }
        })),
    ))
}
