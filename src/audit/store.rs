use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::audit::changes::{AuditAction, ChangeSet};
use crate::audit::entity::AuditEntity;
use crate::audit::sink::{AuditSink, NewAuditRecord, AUDIT_LOG_ENTITY};
use crate::context::RequestScope;

/// Errors from entity stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unknown or read-only field: {0}")]
    InvalidField(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// Field-equality query against an entity's columns.
pub type FieldQuery = Map<String, Value>;

/// Partial set of field assignments applied by `update_one`.
pub type FieldPatch = Map<String, Value>;

/// Repository-style persistence interface for one entity type.
///
/// Business handlers talk to implementations of this trait only through
/// [`AuditedStore`]; they never construct audit records themselves.
#[async_trait]
pub trait EntityStore: Send + Sync {
    type Entity: AuditEntity;

    async fn insert(&self, entity: &Self::Entity) -> Result<Self::Entity, StoreError>;

    /// Persist an already-loaded, mutated entity by identifier.
    async fn update(&self, entity: &Self::Entity) -> Result<Self::Entity, StoreError>;

    async fn fetch(&self, id: Uuid) -> Result<Option<Self::Entity>, StoreError>;

    async fn find_one(&self, query: &FieldQuery) -> Result<Option<Self::Entity>, StoreError>;

    /// Atomically update the single entity matching `query`, returning its
    /// post-update state when a row matched.
    async fn update_one(
        &self,
        query: &FieldQuery,
        patch: &FieldPatch,
    ) -> Result<Option<Self::Entity>, StoreError>;

    /// Returns true when a row was deleted.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
}

/// Audit-logging decorator over an [`EntityStore`].
///
/// Wraps every write with before/after snapshotting and emits an attributed
/// audit record, without the entity's business logic being audit-aware.
/// Audit capture is strictly best-effort: the record is written by a
/// detached task, and every failure along the way (pre-read, diff, sink
/// write) is logged and swallowed — it never fails, delays, or rolls back
/// the underlying business operation.
pub struct AuditedStore<S: EntityStore> {
    inner: S,
    sink: Arc<dyn AuditSink>,
    scope: Arc<RequestScope>,
}

impl<S: EntityStore> AuditedStore<S> {
    pub fn new(inner: S, sink: Arc<dyn AuditSink>, scope: Arc<RequestScope>) -> Self {
        Self { inner, sink, scope }
    }

    /// The audit log must not observe itself.
    fn audited() -> bool {
        S::Entity::ENTITY_TYPE != AUDIT_LOG_ENTITY
    }

    pub async fn insert(&self, entity: &S::Entity) -> Result<S::Entity, StoreError> {
        let saved = self.inner.insert(entity).await?;

        if Self::audited() {
            let changes = ChangeSet::for_creation(saved.audit_snapshot());
            self.emit(AuditAction::Create, saved.entity_id(), Some(changes));
        }
        Ok(saved)
    }

    pub async fn update(&self, entity: &S::Entity) -> Result<S::Entity, StoreError> {
        // Re-read the persisted row for "old" values rather than trusting
        // whatever the caller loaded earlier; a concurrent writer may have
        // moved the row since then.
        let before = if Self::audited() {
            self.snapshot_by_id(entity.entity_id()).await
        } else {
            None
        };

        let saved = self.inner.update(entity).await?;

        if Self::audited() {
            let changes = match before {
                Some(old) => ChangeSet::between(&old, &saved.audit_snapshot()),
                None => ChangeSet::diff_unavailable(),
            };
            // No-op saves produce no audit record
            if !changes.is_empty() {
                self.emit(AuditAction::Update, saved.entity_id(), Some(changes));
            }
        }
        Ok(saved)
    }

    pub async fn update_one(
        &self,
        query: &FieldQuery,
        patch: &FieldPatch,
    ) -> Result<Option<S::Entity>, StoreError> {
        let before = if Self::audited() {
            self.snapshot_by_query(query).await
        } else {
            None
        };

        let updated = self.inner.update_one(query, patch).await?;

        if Self::audited() {
            if let Some(entity) = &updated {
                let changes = match before {
                    Some(old) => ChangeSet::between(&old, &entity.audit_snapshot()),
                    None => ChangeSet::diff_unavailable(),
                };
                if !changes.is_empty() {
                    self.emit(AuditAction::Update, entity.entity_id(), Some(changes));
                }
            }
        }
        Ok(updated)
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        // The identifier is all that survives a delete; capture nothing else.
        let deleted = self.inner.delete(id).await?;

        if Self::audited() && deleted {
            self.emit(AuditAction::Delete, id, None);
        }
        Ok(deleted)
    }

    pub async fn fetch(&self, id: Uuid) -> Result<Option<S::Entity>, StoreError> {
        self.inner.fetch(id).await
    }

    pub async fn find_one(&self, query: &FieldQuery) -> Result<Option<S::Entity>, StoreError> {
        self.inner.find_one(query).await
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn snapshot_by_id(&self, id: Uuid) -> Option<Map<String, Value>> {
        match self.inner.fetch(id).await {
            Ok(existing) => existing.map(|e| e.audit_snapshot()),
            Err(err) => {
                tracing::warn!(
                    "Audit pre-read failed for {} {}: {}",
                    S::Entity::ENTITY_TYPE,
                    id,
                    err
                );
                None
            }
        }
    }

    async fn snapshot_by_query(&self, query: &FieldQuery) -> Option<Map<String, Value>> {
        match self.inner.find_one(query).await {
            Ok(existing) => existing.map(|e| e.audit_snapshot()),
            Err(err) => {
                tracing::warn!(
                    "Audit pre-snapshot failed for {}: {}",
                    S::Entity::ENTITY_TYPE,
                    err
                );
                None
            }
        }
    }

    /// Write the audit record on a detached task. The caller's response may
    /// already be gone by the time this lands; a failure here is observable
    /// only in the logs.
    fn emit(&self, action: AuditAction, entity_id: Uuid, changes: Option<ChangeSet>) {
        let record = NewAuditRecord {
            actor_id: self.scope.actor_id(),
            action,
            entity_type: S::Entity::ENTITY_TYPE,
            entity_id,
            changes,
            ip: self.scope.ip.clone(),
            user_agent: self.scope.user_agent.clone(),
            method: self.scope.method.clone(),
            url: self.scope.url.clone(),
        };

        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            let entity_type = record.entity_type;
            let entity_id = record.entity_id;
            if let Err(err) = sink.record(record).await {
                tracing::warn!(
                    "Audit write failed for {} {}: {}",
                    entity_type,
                    entity_id,
                    err
                );
            }
        });
    }
}
