use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

use crate::outbox::job::SmtpConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub tenancy: TenancyConfig,
    pub smtp: SmtpSettings,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

/// Host routing rules: which subdomain is the super-admin origin, which
/// tenant serves bare/developer hosts, and where the onboarding endpoint lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    pub root_domain: String,
    pub superadmin_subdomain: String,
    pub default_tenant_subdomain: String,
    pub setup_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpSettings {
    pub default_transport: SmtpConfig,
    pub poll_interval_secs: u64,
    pub max_attempts: i32,
    pub retry_backoff_secs: u64,
    pub send_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_ACQUIRE_TIMEOUT_SECS") {
            self.database.acquire_timeout_secs =
                v.parse().unwrap_or(self.database.acquire_timeout_secs);
        }

        // Tenancy overrides
        if let Ok(v) = env::var("TENANCY_ROOT_DOMAIN") {
            self.tenancy.root_domain = v;
        }
        if let Ok(v) = env::var("TENANCY_SUPERADMIN_SUBDOMAIN") {
            self.tenancy.superadmin_subdomain = v;
        }
        if let Ok(v) = env::var("TENANCY_DEFAULT_TENANT") {
            self.tenancy.default_tenant_subdomain = v;
        }

        // SMTP overrides
        if let Ok(v) = env::var("SMTP_HOST") {
            self.smtp.default_transport.host = v;
        }
        if let Ok(v) = env::var("SMTP_PORT") {
            self.smtp.default_transport.port =
                v.parse().unwrap_or(self.smtp.default_transport.port);
        }
        if let Ok(v) = env::var("SMTP_SECURE") {
            self.smtp.default_transport.secure =
                v.parse().unwrap_or(self.smtp.default_transport.secure);
        }
        if let Ok(v) = env::var("SMTP_USER") {
            self.smtp.default_transport.username = v;
        }
        if let Ok(v) = env::var("SMTP_PASSWORD") {
            self.smtp.default_transport.password = v;
        }
        if let Ok(v) = env::var("SMTP_FROM_NAME") {
            self.smtp.default_transport.from_name = v;
        }
        if let Ok(v) = env::var("SMTP_FROM_ADDRESS") {
            self.smtp.default_transport.from_address = v;
        }
        if let Ok(v) = env::var("SMTP_POLL_INTERVAL_SECS") {
            self.smtp.poll_interval_secs = v.parse().unwrap_or(self.smtp.poll_interval_secs);
        }
        if let Ok(v) = env::var("SMTP_MAX_ATTEMPTS") {
            self.smtp.max_attempts = v.parse().unwrap_or(self.smtp.max_attempts);
        }
        if let Ok(v) = env::var("SMTP_RETRY_BACKOFF_SECS") {
            self.smtp.retry_backoff_secs = v.parse().unwrap_or(self.smtp.retry_backoff_secs);
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }

        self
    }

    fn base_smtp() -> SmtpSettings {
        SmtpSettings {
            default_transport: SmtpConfig {
                host: "localhost".to_string(),
                port: 1025,
                secure: false,
                username: String::new(),
                password: String::new(),
                from_name: "Back Office".to_string(),
                from_address: "noreply@localhost".to_string(),
            },
            poll_interval_secs: 5,
            max_attempts: 3,
            retry_backoff_secs: 300,
            send_timeout_secs: 10,
        }
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                max_connections: 10,
                acquire_timeout_secs: 30,
            },
            tenancy: TenancyConfig {
                root_domain: "localhost".to_string(),
                superadmin_subdomain: "admin".to_string(),
                default_tenant_subdomain: "demo".to_string(),
                setup_path: "/setup".to_string(),
            },
            smtp: Self::base_smtp(),
            security: SecurityConfig {
                jwt_secret: "dev-secret-do-not-use-in-production".to_string(),
                jwt_expiry_hours: 24 * 7,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                max_connections: 20,
                acquire_timeout_secs: 10,
            },
            tenancy: TenancyConfig {
                root_domain: "staging.example.com".to_string(),
                superadmin_subdomain: "admin".to_string(),
                default_tenant_subdomain: "demo".to_string(),
                setup_path: "/setup".to_string(),
            },
            smtp: Self::base_smtp(),
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                max_connections: 50,
                acquire_timeout_secs: 5,
            },
            tenancy: TenancyConfig {
                root_domain: "app.example.com".to_string(),
                superadmin_subdomain: "admin".to_string(),
                default_tenant_subdomain: "demo".to_string(),
                setup_path: "/setup".to_string(),
            },
            smtp: Self::base_smtp(),
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 4,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_defaults() {
        let config = AppConfig::development();
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.tenancy.superadmin_subdomain, "admin");
        assert_eq!(config.smtp.max_attempts, 3);
        assert_eq!(config.smtp.retry_backoff_secs, 300);
    }

    #[test]
    fn production_defaults() {
        let config = AppConfig::production();
        assert_eq!(config.database.max_connections, 50);
        assert!(config.security.jwt_secret.is_empty());
        assert_eq!(config.smtp.send_timeout_secs, 10);
    }
}
