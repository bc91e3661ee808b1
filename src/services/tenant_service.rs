use std::sync::Arc;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::database::models::Tenant;
use crate::database::registry::{ConnectionRegistry, RegistryError};
use crate::database::schema;

#[derive(Debug, thiserror::Error)]
pub enum TenantError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Tenant already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid subdomain: {0}")]
    InvalidSubdomain(String),

    #[error("Invalid setup passkey")]
    InvalidPasskey,

    #[error("Not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Deserialize)]
pub struct NewTenant {
    pub name: String,
    pub subdomain: String,
    pub org_name: Option<String>,
    pub org_email: Option<String>,
    pub org_address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TenantUpdate {
    pub name: Option<String>,
    pub is_active: Option<bool>,
}

/// Tenant directory operations against the central database.
pub struct TenantService {
    registry: Arc<ConnectionRegistry>,
}

impl TenantService {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Create a new tenant: provision its logical database, apply the tenant
    /// schema, and register it in the directory. Returns the tenant together
    /// with the generated setup passkey — the only time the passkey is ever
    /// handed out.
    pub async fn create_tenant(&self, new: NewTenant) -> Result<(Tenant, String), TenantError> {
        Self::validate_subdomain(&new.subdomain)?;

        let central = self.registry.central().await?;
        if self.subdomain_taken(&new.subdomain).await? {
            return Err(TenantError::AlreadyExists(new.subdomain));
        }

        let database = Self::database_name(&new.subdomain);
        self.registry.create_database(&database).await?;

        let tenant_pool = self.registry.tenant_pool(&database).await?;
        schema::apply(&tenant_pool, schema::TENANT_SCHEMA).await?;

        let passkey = Uuid::new_v4().simple().to_string();

        let tenant = sqlx::query_as::<_, Tenant>(
            r#"
            INSERT INTO tenants
                (name, subdomain, database, setup_passkey, org_name, org_email, org_address)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&new.name)
        .bind(&new.subdomain)
        .bind(&database)
        .bind(&passkey)
        .bind(&new.org_name)
        .bind(&new.org_email)
        .bind(&new.org_address)
        .fetch_one(&central)
        .await?;

        info!(
            "Created tenant '{}' ({}) on database {}",
            tenant.name, tenant.subdomain, tenant.database
        );
        Ok((tenant, passkey))
    }

    /// Active tenant for a routing subdomain, if any.
    pub async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, TenantError> {
        let central = self.registry.central().await?;
        let tenant = sqlx::query_as::<_, Tenant>(
            "SELECT * FROM tenants WHERE subdomain = $1 AND is_active = TRUE",
        )
        .bind(subdomain)
        .fetch_optional(&central)
        .await?;
        Ok(tenant)
    }

    pub async fn list_tenants(&self) -> Result<Vec<Tenant>, TenantError> {
        let central = self.registry.central().await?;
        let tenants =
            sqlx::query_as::<_, Tenant>("SELECT * FROM tenants ORDER BY created_at DESC")
                .fetch_all(&central)
                .await?;
        Ok(tenants)
    }

    pub async fn update_tenant(
        &self,
        id: Uuid,
        update: TenantUpdate,
    ) -> Result<Tenant, TenantError> {
        let central = self.registry.central().await?;
        let tenant = sqlx::query_as::<_, Tenant>(
            r#"
            UPDATE tenants
            SET name = COALESCE($2, name), is_active = COALESCE($3, is_active)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(update.name)
        .bind(update.is_active)
        .fetch_optional(&central)
        .await?
        .ok_or_else(|| TenantError::NotFound(format!("Tenant {}", id)))?;
        Ok(tenant)
    }

    /// Remove the directory row only. The tenant's logical database is
    /// deliberately retained.
    pub async fn delete_tenant(&self, id: Uuid) -> Result<bool, TenantError> {
        let central = self.registry.central().await?;
        let result = sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(id)
            .execute(&central)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Finish onboarding: the passkey is consumed and cleared in the same
    /// statement, so it can only ever be used once.
    pub async fn complete_setup(
        &self,
        tenant_id: Uuid,
        passkey: &str,
    ) -> Result<Tenant, TenantError> {
        let central = self.registry.central().await?;
        let tenant = sqlx::query_as::<_, Tenant>(
            r#"
            UPDATE tenants
            SET setup_complete = TRUE, setup_passkey = NULL
            WHERE id = $1 AND setup_passkey = $2
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(passkey)
        .fetch_optional(&central)
        .await?
        .ok_or(TenantError::InvalidPasskey)?;
        Ok(tenant)
    }

    async fn subdomain_taken(&self, subdomain: &str) -> Result<bool, TenantError> {
        let central = self.registry.central().await?;
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM tenants WHERE subdomain = $1")
                .bind(subdomain)
                .fetch_one(&central)
                .await?;
        Ok(count > 0)
    }

    /// Hash the subdomain to a stable database name
    fn database_name(subdomain: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(subdomain.as_bytes());
        let hash = format!("{:x}", hasher.finalize());
        format!("tenant_{}", &hash[..16])
    }

    fn validate_subdomain(subdomain: &str) -> Result<(), TenantError> {
        if subdomain.len() < 2 || subdomain.len() > 63 {
            return Err(TenantError::InvalidSubdomain(
                "Subdomain must be between 2 and 63 characters".to_string(),
            ));
        }
        if !subdomain
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(TenantError::InvalidSubdomain(
                "Subdomain may only contain lowercase letters, digits, and hyphens".to_string(),
            ));
        }
        if subdomain.starts_with('-') || subdomain.ends_with('-') {
            return Err(TenantError::InvalidSubdomain(
                "Subdomain may not start or end with a hyphen".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_name_is_stable_and_prefixed() {
        let a = TenantService::database_name("acme");
        let b = TenantService::database_name("acme");
        assert_eq!(a, b);
        assert!(a.starts_with("tenant_"));
        assert_eq!(a.len(), "tenant_".len() + 16);
    }

    #[test]
    fn distinct_subdomains_get_distinct_databases() {
        assert_ne!(
            TenantService::database_name("acme"),
            TenantService::database_name("globex")
        );
    }

    #[test]
    fn validates_subdomains() {
        assert!(TenantService::validate_subdomain("acme").is_ok());
        assert!(TenantService::validate_subdomain("acme-2").is_ok());
        assert!(TenantService::validate_subdomain("a").is_err());
        assert!(TenantService::validate_subdomain("Acme").is_err());
        assert!(TenantService::validate_subdomain("-acme").is_err());
        assert!(TenantService::validate_subdomain("acme.shop").is_err());
    }
}
