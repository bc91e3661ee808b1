use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::audit::changes::{AuditAction, ChangeSet};
use crate::audit::entity::AuditEntity;
use crate::audit::store::StoreError;

/// Entity-type name under which audit records are stored. The interceptor
/// refuses to audit this type to keep the log from observing itself.
pub const AUDIT_LOG_ENTITY: &str = "audit_logs";

/// A persisted audit record: who did what to which entity, with the
/// field-level change set. Append-only; never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditRecord {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub changes: Option<Value>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub method: Option<String>,
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
}

// Structurally attachable to the interceptor like any other entity;
// the recursion guard keys off ENTITY_TYPE.
impl AuditEntity for AuditRecord {
    const ENTITY_TYPE: &'static str = AUDIT_LOG_ENTITY;

    fn entity_id(&self) -> Uuid {
        self.id
    }
}

/// An audit record about to be written, attribution already resolved.
#[derive(Debug, Clone)]
pub struct NewAuditRecord {
    pub actor_id: Option<Uuid>,
    pub action: AuditAction,
    pub entity_type: &'static str,
    pub entity_id: Uuid,
    pub changes: Option<ChangeSet>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub method: String,
    pub url: String,
}

/// Destination for audit records. The SQL implementation writes to the
/// tenant database; tests substitute an in-memory recorder.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: NewAuditRecord) -> Result<(), StoreError>;
}

pub struct SqlAuditSink {
    pool: PgPool,
}

impl SqlAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Audit trail for one entity, newest first.
    pub async fn list_for_entity(
        pool: &PgPool,
        entity_type: &str,
        entity_id: Uuid,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let records = sqlx::query_as::<_, AuditRecord>(
            r#"
            SELECT * FROM audit_logs
            WHERE entity_type = $1 AND entity_id = $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(pool)
        .await?;

        Ok(records)
    }
}

#[async_trait]
impl AuditSink for SqlAuditSink {
    async fn record(&self, record: NewAuditRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs
                (actor_id, action, entity_type, entity_id, changes, ip, user_agent, method, url)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.actor_id)
        .bind(record.action.as_str())
        .bind(record.entity_type)
        .bind(record.entity_id)
        .bind(record.changes.map(|c| c.into_value()))
        .bind(record.ip)
        .bind(record.user_agent)
        .bind(record.method)
        .bind(record.url)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
