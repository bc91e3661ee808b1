use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::audit::entity::AuditEntity;
use crate::audit::store::{EntityStore, FieldPatch, FieldQuery, StoreError};

pub mod status {
    pub const DRAFT: &str = "draft";
    pub const SENT: &str = "sent";
    pub const PAID: &str = "paid";
}

/// Columns a field query may filter on.
const QUERYABLE_COLUMNS: &[&str] = &["id", "number", "status", "customer_email"];

/// Columns an update-by-query patch may assign.
const PATCHABLE_COLUMNS: &[&str] = &[
    "number",
    "customer_name",
    "customer_email",
    "status",
    "total",
    "notes",
];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub number: String,
    pub customer_name: String,
    pub customer_email: String,
    pub status: String,
    pub total: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AuditEntity for Invoice {
    const ENTITY_TYPE: &'static str = "invoices";

    fn entity_id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Deserialize)]
pub struct NewInvoice {
    pub number: String,
    pub customer_name: String,
    pub customer_email: String,
    #[serde(default)]
    pub total: Decimal,
    pub notes: Option<String>,
}

/// Fields a full-entity save may change. Missing fields keep their value.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InvoiceUpdate {
    pub number: Option<String>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub status: Option<String>,
    pub total: Option<Decimal>,
    pub notes: Option<String>,
}

impl Invoice {
    pub fn create(new: NewInvoice) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            number: new.number,
            customer_name: new.customer_name,
            customer_email: new.customer_email,
            status: status::DRAFT.to_string(),
            total: new.total,
            notes: new.notes,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, update: InvoiceUpdate) {
        if let Some(number) = update.number {
            self.number = number;
        }
        if let Some(customer_name) = update.customer_name {
            self.customer_name = customer_name;
        }
        if let Some(customer_email) = update.customer_email {
            self.customer_email = customer_email;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(total) = update.total {
            self.total = total;
        }
        if let Some(notes) = update.notes {
            self.notes = Some(notes);
        }
    }
}

/// A JSON value coerced to the SQL type of the column it targets.
#[derive(Debug, Clone, PartialEq)]
enum BoundValue {
    Id(Uuid),
    Text(String),
    MaybeText(Option<String>),
    Money(Decimal),
}

/// Coerce a JSON value for a known column; unknown columns are rejected
/// before any SQL is built.
fn coerce(column: &str, value: &Value) -> Result<BoundValue, StoreError> {
    match column {
        "id" => value
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(BoundValue::Id)
            .ok_or_else(|| StoreError::InvalidField(format!("{} (expected UUID)", column))),
        "total" => decimal_from(value)
            .map(BoundValue::Money)
            .ok_or_else(|| StoreError::InvalidField(format!("{} (expected number)", column))),
        "notes" => Ok(BoundValue::MaybeText(
            value.as_str().map(|s| s.to_string()),
        )),
        "number" | "customer_name" | "customer_email" | "status" => value
            .as_str()
            .map(|s| BoundValue::Text(s.to_string()))
            .ok_or_else(|| StoreError::InvalidField(format!("{} (expected string)", column))),
        other => Err(StoreError::InvalidField(other.to_string())),
    }
}

fn decimal_from(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    }
}

/// Build `col = $n AND ...` over allowlisted columns, continuing parameter
/// numbering from `first_param`.
fn build_where(
    query: &FieldQuery,
    first_param: usize,
) -> Result<(String, Vec<BoundValue>), StoreError> {
    if query.is_empty() {
        return Err(StoreError::InvalidField(
            "query must name at least one field".to_string(),
        ));
    }

    let mut parts = Vec::new();
    let mut params = Vec::new();
    let mut index = first_param;
    for (column, value) in query {
        if !QUERYABLE_COLUMNS.contains(&column.as_str()) {
            return Err(StoreError::InvalidField(column.clone()));
        }
        parts.push(format!("{} = ${}", column, index));
        params.push(coerce(column, value)?);
        index += 1;
    }
    Ok((parts.join(" AND "), params))
}

/// Build `col = $n, ...` assignments over allowlisted columns.
fn build_set(patch: &FieldPatch) -> Result<(String, Vec<BoundValue>), StoreError> {
    if patch.is_empty() {
        return Err(StoreError::InvalidField(
            "patch must assign at least one field".to_string(),
        ));
    }

    let mut parts = Vec::new();
    let mut params = Vec::new();
    for (index, (column, value)) in patch.iter().enumerate() {
        if !PATCHABLE_COLUMNS.contains(&column.as_str()) {
            return Err(StoreError::InvalidField(column.clone()));
        }
        parts.push(format!("{} = ${}", column, index + 1));
        params.push(coerce(column, value)?);
    }
    parts.push("updated_at = now()".to_string());
    Ok((parts.join(", "), params))
}

/// Invoice persistence against a tenant database.
pub struct SqlInvoiceStore {
    pool: PgPool,
}

impl SqlInvoiceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Invoice>, StoreError> {
        let invoices = sqlx::query_as::<_, Invoice>(
            "SELECT * FROM invoices ORDER BY created_at DESC LIMIT 200",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(invoices)
    }

    async fn fetch_one_bound(
        &self,
        sql: &str,
        params: Vec<BoundValue>,
    ) -> Result<Option<Invoice>, StoreError> {
        let mut query = sqlx::query_as::<_, Invoice>(sql);
        for param in params {
            query = match param {
                BoundValue::Id(v) => query.bind(v),
                BoundValue::Text(v) => query.bind(v),
                BoundValue::MaybeText(v) => query.bind(v),
                BoundValue::Money(v) => query.bind(v),
            };
        }
        Ok(query.fetch_optional(&self.pool).await?)
    }
}

#[async_trait]
impl EntityStore for SqlInvoiceStore {
    type Entity = Invoice;

    async fn insert(&self, entity: &Invoice) -> Result<Invoice, StoreError> {
        let saved = sqlx::query_as::<_, Invoice>(
            r#"
            INSERT INTO invoices
                (id, number, customer_name, customer_email, status, total, notes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(entity.id)
        .bind(&entity.number)
        .bind(&entity.customer_name)
        .bind(&entity.customer_email)
        .bind(&entity.status)
        .bind(entity.total)
        .bind(&entity.notes)
        .bind(entity.created_at)
        .bind(entity.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(saved)
    }

    async fn update(&self, entity: &Invoice) -> Result<Invoice, StoreError> {
        let saved = sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices
            SET number = $2, customer_name = $3, customer_email = $4,
                status = $5, total = $6, notes = $7, updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(entity.id)
        .bind(&entity.number)
        .bind(&entity.customer_name)
        .bind(&entity.customer_email)
        .bind(&entity.status)
        .bind(entity.total)
        .bind(&entity.notes)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("Invoice {}", entity.id)))?;
        Ok(saved)
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Invoice>, StoreError> {
        let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(invoice)
    }

    async fn find_one(&self, query: &FieldQuery) -> Result<Option<Invoice>, StoreError> {
        let (clause, params) = build_where(query, 1)?;
        let sql = format!("SELECT * FROM invoices WHERE {} LIMIT 1", clause);
        self.fetch_one_bound(&sql, params).await
    }

    async fn update_one(
        &self,
        query: &FieldQuery,
        patch: &FieldPatch,
    ) -> Result<Option<Invoice>, StoreError> {
        let (set_clause, mut params) = build_set(patch)?;
        let (where_clause, where_params) = build_where(query, params.len() + 1)?;
        params.extend(where_params);

        let sql = format!(
            "UPDATE invoices SET {} WHERE {} RETURNING *",
            set_clause, where_clause
        );
        self.fetch_one_bound(&sql, params).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM invoices WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
