// Generic audit interceptor: a decorator over entity stores that captures
// before/after state, diffs it, and persists attributed change records.

pub mod changes;
pub mod entity;
pub mod sink;
pub mod store;

pub use changes::{AuditAction, ChangeSet};
pub use entity::AuditEntity;
pub use sink::{AuditRecord, AuditSink, NewAuditRecord, SqlAuditSink, AUDIT_LOG_ENTITY};
pub use store::{AuditedStore, EntityStore, FieldPatch, FieldQuery, StoreError};
