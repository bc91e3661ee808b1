use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Fields excluded from every audit diff: the identifier and the
/// auto-maintained timestamps say nothing about what the caller changed.
pub const BOOKKEEPING_FIELDS: &[&str] = &["id", "created_at", "updated_at"];

/// An entity type the audit interceptor knows how to snapshot.
///
/// The snapshot is derived from the entity's `Serialize` impl with the
/// declared bookkeeping fields stripped, so each type states exactly which
/// fields participate in diffs without any runtime reflection.
pub trait AuditEntity: Serialize + Send + Sync {
    /// Stable name recorded as the audit record's target entity type.
    const ENTITY_TYPE: &'static str;

    fn entity_id(&self) -> Uuid;

    fn bookkeeping_fields() -> &'static [&'static str] {
        BOOKKEEPING_FIELDS
    }

    /// Serialized field map with bookkeeping fields removed.
    /// Serialization failures degrade to an empty snapshot; audit capture
    /// must never fail the write it observes.
    fn audit_snapshot(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => {
                for field in Self::bookkeeping_fields() {
                    map.remove(*field);
                }
                map
            }
            Ok(_) => Map::new(),
            Err(err) => {
                tracing::warn!(
                    "Audit snapshot serialization failed for {}: {}",
                    Self::ENTITY_TYPE,
                    err
                );
                Map::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Gadget {
        id: Uuid,
        label: String,
        created_at: String,
        updated_at: String,
    }

    impl AuditEntity for Gadget {
        const ENTITY_TYPE: &'static str = "gadgets";

        fn entity_id(&self) -> Uuid {
            self.id
        }
    }

    #[test]
    fn snapshot_strips_bookkeeping_fields() {
        let gadget = Gadget {
            id: Uuid::new_v4(),
            label: "widget".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        };

        let snapshot = gadget.audit_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("label"), Some(&serde_json::json!("widget")));
    }
}
