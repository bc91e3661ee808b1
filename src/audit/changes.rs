use serde_json::{json, Map, Value};

/// Sentinel field emitted when an update's pre-state could not be read.
/// Partial observability is preferred over dropping the audit record.
pub const DIFF_UNAVAILABLE_KEY: &str = "_diff_unavailable";

/// What happened to the target entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field-level change map persisted on an audit record.
///
/// Creates map `field -> {"new": value}`; updates map
/// `field -> {"old": value, "new": value}` and only carry fields whose old
/// and new values actually differ. Deletes carry no change set at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet(Map<String, Value>);

impl ChangeSet {
    /// Changes for a newly created entity: every field as `{"new": value}`.
    pub fn for_creation(snapshot: Map<String, Value>) -> Self {
        let mut changes = Map::new();
        for (field, value) in snapshot {
            changes.insert(field, json!({ "new": value }));
        }
        Self(changes)
    }

    /// Field-by-field diff across the union of both snapshots' keys.
    /// A field is included only when its serialized old and new values differ;
    /// a key absent from one side diffs against JSON null.
    pub fn between(old: &Map<String, Value>, new: &Map<String, Value>) -> Self {
        let mut changes = Map::new();

        for (field, old_value) in old {
            let new_value = new.get(field).unwrap_or(&Value::Null);
            if old_value != new_value {
                changes.insert(
                    field.clone(),
                    json!({ "old": old_value, "new": new_value }),
                );
            }
        }
        for (field, new_value) in new {
            if !old.contains_key(field) && *new_value != Value::Null {
                changes.insert(
                    field.clone(),
                    json!({ "old": Value::Null, "new": new_value }),
                );
            }
        }

        Self(changes)
    }

    /// Sentinel change set for updates whose pre-state could not be obtained.
    pub fn diff_unavailable() -> Self {
        let mut changes = Map::new();
        changes.insert(DIFF_UNAVAILABLE_KEY.to_string(), json!({ "new": true }));
        Self(changes)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}
