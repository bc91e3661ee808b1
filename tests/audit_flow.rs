//! Behavior of the audited store decorator over an in-memory entity store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use backoffice_api::audit::{
    AuditAction, AuditEntity, AuditSink, AuditedStore, EntityStore, FieldPatch, FieldQuery,
    NewAuditRecord, StoreError, AUDIT_LOG_ENTITY,
};
use backoffice_api::context::RequestScope;
use backoffice_api::middleware::AuthUser;

#[derive(Debug, Clone, Serialize)]
struct Widget {
    id: Uuid,
    name: String,
    price: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Widget {
    fn new(name: &str, price: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            price,
            created_at: now,
            updated_at: now,
        }
    }
}

impl AuditEntity for Widget {
    const ENTITY_TYPE: &'static str = "widgets";

    fn entity_id(&self) -> Uuid {
        self.id
    }
}

#[derive(Default)]
struct MemoryWidgetStore {
    items: Mutex<HashMap<Uuid, Widget>>,
    fail_reads: std::sync::atomic::AtomicBool,
}

impl MemoryWidgetStore {
    fn fail_reads(&self) {
        self.fail_reads
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    fn reads_failing(&self) -> bool {
        self.fail_reads.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn matches(widget: &Widget, query: &FieldQuery) -> bool {
        query.iter().all(|(field, value)| match field.as_str() {
            "id" => value.as_str() == Some(widget.id.to_string().as_str()),
            "name" => value.as_str() == Some(widget.name.as_str()),
            "price" => value.as_i64() == Some(widget.price),
            _ => false,
        })
    }
}

#[async_trait]
impl EntityStore for MemoryWidgetStore {
    type Entity = Widget;

    async fn insert(&self, entity: &Widget) -> Result<Widget, StoreError> {
        let mut items = self.items.lock().unwrap();
        items.insert(entity.id, entity.clone());
        Ok(entity.clone())
    }

    async fn update(&self, entity: &Widget) -> Result<Widget, StoreError> {
        let mut items = self.items.lock().unwrap();
        if !items.contains_key(&entity.id) {
            return Err(StoreError::NotFound(format!("Widget {}", entity.id)));
        }
        items.insert(entity.id, entity.clone());
        Ok(entity.clone())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Widget>, StoreError> {
        if self.reads_failing() {
            return Err(StoreError::NotFound("simulated read failure".to_string()));
        }
        Ok(self.items.lock().unwrap().get(&id).cloned())
    }

    async fn find_one(&self, query: &FieldQuery) -> Result<Option<Widget>, StoreError> {
        if self.reads_failing() {
            return Err(StoreError::NotFound("simulated read failure".to_string()));
        }
        Ok(self
            .items
            .lock()
            .unwrap()
            .values()
            .find(|w| Self::matches(w, query))
            .cloned())
    }

    async fn update_one(
        &self,
        query: &FieldQuery,
        patch: &FieldPatch,
    ) -> Result<Option<Widget>, StoreError> {
        let mut items = self.items.lock().unwrap();
        let target = items
            .values()
            .find(|w| Self::matches(w, query))
            .map(|w| w.id);
        let id = match target {
            Some(id) => id,
            None => return Ok(None),
        };
        let widget = items.get_mut(&id).expect("target vanished");
        for (field, value) in patch {
            match field.as_str() {
                "name" => {
                    if let Some(name) = value.as_str() {
                        widget.name = name.to_string();
                    }
                }
                "price" => {
                    if let Some(price) = value.as_i64() {
                        widget.price = price;
                    }
                }
                other => return Err(StoreError::InvalidField(other.to_string())),
            }
        }
        widget.updated_at = Utc::now();
        Ok(Some(widget.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.items.lock().unwrap().remove(&id).is_some())
    }
}

#[derive(Default)]
struct MemorySink {
    records: Mutex<Vec<NewAuditRecord>>,
    fail: std::sync::atomic::AtomicBool,
}

impl MemorySink {
    fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    fn take(&self) -> Vec<NewAuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for MemorySink {
    async fn record(&self, record: NewAuditRecord) -> Result<(), StoreError> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StoreError::NotFound("sink unavailable".to_string()));
        }
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

/// Audit writes land on detached tasks; give the scheduler a chance to run
/// them before asserting.
async fn settle(sink: &MemorySink, expected: usize) {
    for _ in 0..200 {
        if sink.len() >= expected {
            break;
        }
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
}

fn scope_with_actor() -> (Arc<RequestScope>, Uuid) {
    let actor_id = Uuid::new_v4();
    let mut scope = RequestScope::system().as_ref().clone();
    scope.actor = Some(AuthUser {
        id: actor_id,
        role: "admin".to_string(),
    });
    scope.ip = Some("203.0.113.7".to_string());
    scope.user_agent = Some("integration-test".to_string());
    scope.method = "POST".to_string();
    scope.url = "/api/widgets".to_string();
    (Arc::new(scope), actor_id)
}

fn audited(
    store: Arc<MemoryWidgetStore>,
    sink: Arc<MemorySink>,
    scope: Arc<RequestScope>,
) -> AuditedStore<Arc<MemoryWidgetStore>> {
    AuditedStore::new(store, sink, scope)
}

// Arc<S> stores delegate so the test can keep a handle on the inner state.
#[async_trait]
impl EntityStore for Arc<MemoryWidgetStore> {
    type Entity = Widget;

    async fn insert(&self, entity: &Widget) -> Result<Widget, StoreError> {
        self.as_ref().insert(entity).await
    }
    async fn update(&self, entity: &Widget) -> Result<Widget, StoreError> {
        self.as_ref().update(entity).await
    }
    async fn fetch(&self, id: Uuid) -> Result<Option<Widget>, StoreError> {
        self.as_ref().fetch(id).await
    }
    async fn find_one(&self, query: &FieldQuery) -> Result<Option<Widget>, StoreError> {
        self.as_ref().find_one(query).await
    }
    async fn update_one(
        &self,
        query: &FieldQuery,
        patch: &FieldPatch,
    ) -> Result<Option<Widget>, StoreError> {
        self.as_ref().update_one(query, patch).await
    }
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        self.as_ref().delete(id).await
    }
}

#[tokio::test]
async fn create_emits_new_values_only() {
    let store = Arc::new(MemoryWidgetStore::default());
    let sink = Arc::new(MemorySink::default());
    let (scope, actor_id) = scope_with_actor();

    let widget = Widget::new("Acme", 10);
    audited(store, sink.clone(), scope)
        .insert(&widget)
        .await
        .unwrap();

    settle(&sink, 1).await;
    let records = sink.take();
    assert_eq!(records.len(), 1);

    let record = &records[0];
    assert_eq!(record.action, AuditAction::Create);
    assert_eq!(record.entity_type, "widgets");
    assert_eq!(record.entity_id, widget.id);
    assert_eq!(record.actor_id, Some(actor_id));
    assert_eq!(record.ip.as_deref(), Some("203.0.113.7"));

    let changes = record.changes.clone().unwrap();
    assert_eq!(changes.get("name"), Some(&json!({ "new": "Acme" })));
    assert_eq!(changes.get("price"), Some(&json!({ "new": 10 })));
    // Bookkeeping fields are excluded, and creates never carry "old"
    assert!(changes.get("id").is_none());
    assert!(changes.get("created_at").is_none());
}

#[tokio::test]
async fn update_emits_only_changed_fields() {
    let store = Arc::new(MemoryWidgetStore::default());
    let sink = Arc::new(MemorySink::default());
    let (scope, _) = scope_with_actor();
    let audited = audited(store, sink.clone(), scope);

    let mut widget = Widget::new("Acme", 10);
    audited.insert(&widget).await.unwrap();
    settle(&sink, 1).await;

    widget.price = 15;
    audited.update(&widget).await.unwrap();
    settle(&sink, 2).await;

    let records = sink.take();
    assert_eq!(records.len(), 2);
    let record = &records[1];
    assert_eq!(record.action, AuditAction::Update);

    let changes = record.changes.clone().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes.get("price"), Some(&json!({ "old": 10, "new": 15 })));
    assert!(changes.get("name").is_none());
}

#[tokio::test]
async fn noop_update_emits_no_record() {
    let store = Arc::new(MemoryWidgetStore::default());
    let sink = Arc::new(MemorySink::default());
    let (scope, _) = scope_with_actor();
    let audited = audited(store, sink.clone(), scope);

    let widget = Widget::new("Acme", 10);
    audited.insert(&widget).await.unwrap();
    settle(&sink, 1).await;

    // Saving the unchanged entity produces no audit record
    audited.update(&widget).await.unwrap();
    settle(&sink, 2).await;
    assert_eq!(sink.len(), 1);
}

#[tokio::test]
async fn update_by_query_diffs_old_and_new() {
    let store = Arc::new(MemoryWidgetStore::default());
    let sink = Arc::new(MemorySink::default());
    let (scope, _) = scope_with_actor();
    let audited = audited(store, sink.clone(), scope);

    let widget = Widget::new("Acme", 10);
    audited.insert(&widget).await.unwrap();
    settle(&sink, 1).await;

    let mut query = Map::new();
    query.insert("id".to_string(), json!(widget.id));
    let mut patch = Map::new();
    patch.insert("price".to_string(), json!(25));

    let updated = audited.update_one(&query, &patch).await.unwrap().unwrap();
    assert_eq!(updated.price, 25);
    settle(&sink, 2).await;

    let records = sink.take();
    let changes = records[1].changes.clone().unwrap();
    assert_eq!(changes.get("price"), Some(&json!({ "old": 10, "new": 25 })));
}

#[tokio::test]
async fn update_by_query_degrades_to_sentinel_when_preread_fails() {
    let store = Arc::new(MemoryWidgetStore::default());
    let sink = Arc::new(MemorySink::default());
    let (scope, _) = scope_with_actor();

    let widget = Widget::new("Acme", 10);
    store.insert(&widget).await.unwrap();
    store.fail_reads();

    let audited = audited(store.clone(), sink.clone(), scope);
    let mut query = Map::new();
    query.insert("id".to_string(), json!(widget.id));
    let mut patch = Map::new();
    patch.insert("price".to_string(), json!(99));

    // The update itself still succeeds
    let updated = audited.update_one(&query, &patch).await.unwrap().unwrap();
    assert_eq!(updated.price, 99);

    // ...and the audit record degrades instead of disappearing
    settle(&sink, 1).await;
    let records = sink.take();
    assert_eq!(records.len(), 1);
    let changes = records[0].changes.clone().unwrap();
    assert!(changes.get("_diff_unavailable").is_some());
}

#[tokio::test]
async fn delete_emits_identity_only() {
    let store = Arc::new(MemoryWidgetStore::default());
    let sink = Arc::new(MemorySink::default());
    let (scope, _) = scope_with_actor();
    let audited = audited(store, sink.clone(), scope);

    let widget = Widget::new("Acme", 10);
    audited.insert(&widget).await.unwrap();
    settle(&sink, 1).await;

    assert!(audited.delete(widget.id).await.unwrap());
    settle(&sink, 2).await;

    let records = sink.take();
    let record = &records[1];
    assert_eq!(record.action, AuditAction::Delete);
    assert_eq!(record.entity_id, widget.id);
    assert!(record.changes.is_none());
}

#[tokio::test]
async fn deleting_a_missing_row_emits_nothing() {
    let store = Arc::new(MemoryWidgetStore::default());
    let sink = Arc::new(MemorySink::default());
    let (scope, _) = scope_with_actor();
    let audited = audited(store, sink.clone(), scope);

    assert!(!audited.delete(Uuid::new_v4()).await.unwrap());
    settle(&sink, 1).await;
    assert_eq!(sink.len(), 0);
}

#[tokio::test]
async fn sink_failure_never_reaches_the_business_write() {
    let store = Arc::new(MemoryWidgetStore::default());
    let sink = Arc::new(MemorySink::default());
    sink.fail.store(true, std::sync::atomic::Ordering::SeqCst);
    let (scope, _) = scope_with_actor();
    let audited = audited(store.clone(), sink.clone(), scope);

    let widget = Widget::new("Acme", 10);
    // Insert succeeds even though every audit write errors
    audited.insert(&widget).await.unwrap();
    assert!(store.fetch(widget.id).await.unwrap().is_some());

    settle(&sink, 1).await;
    assert_eq!(sink.len(), 0);
}

// --- Recursion guard -------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
struct LogEntry {
    id: Uuid,
    action: String,
}

impl AuditEntity for LogEntry {
    const ENTITY_TYPE: &'static str = AUDIT_LOG_ENTITY;

    fn entity_id(&self) -> Uuid {
        self.id
    }
}

#[derive(Default)]
struct MemoryLogStore {
    items: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl EntityStore for MemoryLogStore {
    type Entity = LogEntry;

    async fn insert(&self, entity: &LogEntry) -> Result<LogEntry, StoreError> {
        self.items.lock().unwrap().push(entity.clone());
        Ok(entity.clone())
    }
    async fn update(&self, entity: &LogEntry) -> Result<LogEntry, StoreError> {
        Ok(entity.clone())
    }
    async fn fetch(&self, _id: Uuid) -> Result<Option<LogEntry>, StoreError> {
        Ok(None)
    }
    async fn find_one(&self, _query: &FieldQuery) -> Result<Option<LogEntry>, StoreError> {
        Ok(None)
    }
    async fn update_one(
        &self,
        _query: &FieldQuery,
        _patch: &FieldPatch,
    ) -> Result<Option<LogEntry>, StoreError> {
        Ok(None)
    }
    async fn delete(&self, _id: Uuid) -> Result<bool, StoreError> {
        Ok(true)
    }
}

#[tokio::test]
async fn the_audit_log_is_never_audited() {
    let sink = Arc::new(MemorySink::default());
    let (scope, _) = scope_with_actor();
    // Structurally attached like any other entity store...
    let audited: AuditedStore<MemoryLogStore> =
        AuditedStore::new(MemoryLogStore::default(), sink.clone(), scope);

    let entry = LogEntry {
        id: Uuid::new_v4(),
        action: "create".to_string(),
    };
    audited.insert(&entry).await.unwrap();
    audited.update(&entry).await.unwrap();
    audited.delete(entry.id).await.unwrap();

    // ...but the recursion guard suppresses every record
    settle(&sink, 1).await;
    assert_eq!(sink.len(), 0);
}
