use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A tenant row from the central database's directory.
///
/// The setup passkey is a write-once secret handed to the tenant out of band;
/// it never appears in serialized responses and is cleared once setup
/// completes. Deleting a tenant removes this row only; the logical database
/// named by `database` is deliberately retained.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub subdomain: String,
    pub database: String,
    #[serde(skip_serializing, default)]
    pub setup_passkey: Option<String>,
    pub setup_complete: bool,
    pub is_active: bool,
    pub org_name: Option<String>,
    pub org_email: Option<String>,
    pub org_address: Option<String>,
    pub created_at: DateTime<Utc>,
}
