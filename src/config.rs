//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.
//! Loading never fails outright: malformed or missing values are collected
//! as validation problems so the startup sequence can decide, per
//! environment, whether they are fatal.

use crate::db::Backend;
use crate::seed::UpsertPolicy;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEV_DATABASE_URL: &str = "sqlite://data/dev.db?mode=rwc";
const DEV_TENANT_ID: &str = "default";
const DEV_SEED_PASSWORD: &str = "changeme123";
const MIN_PRODUCTION_SECRET_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" | "test" => Some(Environment::Development),
            "staging" | "stage" => Some(Environment::Staging),
            "production" | "prod" => Some(Environment::Production),
            _ => None,
        }
    }

    /// Production posture: fail fast instead of degrading
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub backend: Backend,
    pub max_pool_size: usize,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>, max_pool_size: usize) -> Result<Self, ConfigError> {
        let url = url.into();
        let backend = Backend::from_url(&url).map_err(|e| ConfigError::UnsupportedBackend(e.to_string()))?;
        if backend == Backend::ServerRelational {
            url::Url::parse(&url).map_err(|e| {
                ConfigError::InvalidValue(format!("Invalid DATABASE_URL format (expected postgresql://...): {}", e))
            })?;
        }
        Ok(Self {
            url,
            backend,
            max_pool_size,
        })
    }
}

/// Baseline tenant and staff seeding configuration
#[derive(Debug, Clone)]
pub struct TenantConfig {
    pub tenant_id: String,
    pub hotel_name: String,
    pub subscription_plan: String,
    pub staff_password: String,
    pub upsert_policy: UpsertPolicy,
    pub hash_cost: u32,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            tenant_id: DEV_TENANT_ID.to_string(),
            hotel_name: "Demo Hotel".to_string(),
            subscription_plan: "trial".to_string(),
            staff_password: DEV_SEED_PASSWORD.to_string(),
            upsert_policy: UpsertPolicy::SkipIfExists,
            hash_cost: bcrypt::DEFAULT_COST,
        }
    }
}

/// Migrating phase and post-startup timing
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub timeout: Duration,
    pub lock_lease: Duration,
    pub lock_poll_interval: Duration,
    pub health_ping_count: u32,
    pub health_ping_interval: Duration,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            lock_lease: Duration::from_secs(120),
            lock_poll_interval: Duration::from_secs(1),
            health_ping_count: 3,
            health_ping_interval: Duration::from_millis(2000),
        }
    }
}

/// Outcome of `Settings::validate`
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    /// Missing or inconsistent required configuration
    pub errors: Vec<String>,
    /// Advisory problems that never block startup
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Complete application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub environment: Environment,
    pub database_url: Option<String>,
    pub max_pool_size: usize,
    pub jwt_secret: Option<String>,
    pub tenant: TenantConfig,
    pub migration: MigrationConfig,
    pub report_path: Option<PathBuf>,
    tenant_id_configured: bool,
    seed_password_configured: bool,
    load_problems: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            database_url: None,
            max_pool_size: 10,
            jwt_secret: None,
            tenant: TenantConfig::default(),
            migration: MigrationConfig::default(),
            report_path: None,
            tenant_id_configured: false,
            seed_password_configured: false,
            load_problems: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings from the process environment
    pub fn load() -> Self {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut problems = Vec::new();
        let defaults = Settings::default();

        let environment = match var("APP_ENV").or_else(|| var("ENVIRONMENT")) {
            None => Environment::Development,
            Some(raw) => Environment::parse(&raw).unwrap_or_else(|| {
                problems.push(format!(
                    "APP_ENV '{}' is not one of development, staging, production",
                    raw
                ));
                Environment::Production
            }),
        };

        let mut parse_num = |key: &str, default: u64| -> u64 {
            match var(key) {
                None => default,
                Some(raw) => raw.parse().unwrap_or_else(|_| {
                    problems.push(format!("{} must be a non-negative integer, got '{}'", key, raw));
                    default
                }),
            }
        };

        let max_pool_size = parse_num("DB_MAX_CONNECTIONS", defaults.max_pool_size as u64) as usize;
        let hash_cost = parse_num("BCRYPT_COST", u64::from(bcrypt::DEFAULT_COST)) as u32;
        let migration = MigrationConfig {
            timeout: Duration::from_secs(parse_num("MIGRATION_TIMEOUT_SECS", 30)),
            lock_lease: Duration::from_secs(parse_num("MIGRATION_LOCK_LEASE_SECS", 120)),
            lock_poll_interval: defaults.migration.lock_poll_interval,
            health_ping_count: parse_num("HEALTH_PING_COUNT", 3) as u32,
            health_ping_interval: Duration::from_millis(parse_num("HEALTH_PING_INTERVAL_MS", 2000)),
        };

        if !(4..=31).contains(&hash_cost) {
            problems.push(format!("BCRYPT_COST must be between 4 and 31, got {}", hash_cost));
        }

        let reset_credentials = var("SEED_RESET_CREDENTIALS")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let tenant_id = var("DEFAULT_TENANT_ID");
        let seed_password = var("SEED_DEFAULT_PASSWORD");

        let tenant = TenantConfig {
            tenant_id: tenant_id.clone().unwrap_or_else(|| DEV_TENANT_ID.to_string()),
            hotel_name: var("DEFAULT_HOTEL_NAME").unwrap_or(defaults.tenant.hotel_name),
            subscription_plan: var("DEFAULT_SUBSCRIPTION_PLAN").unwrap_or(defaults.tenant.subscription_plan),
            staff_password: seed_password.clone().unwrap_or_else(|| DEV_SEED_PASSWORD.to_string()),
            upsert_policy: if reset_credentials {
                UpsertPolicy::ReplaceCredentialsEveryRun
            } else {
                UpsertPolicy::SkipIfExists
            },
            hash_cost: hash_cost.clamp(4, 31),
        };

        Self {
            environment,
            database_url: var("DATABASE_URL"),
            max_pool_size,
            jwt_secret: var("JWT_SECRET"),
            tenant,
            migration,
            report_path: var("REPORT_PATH").map(PathBuf::from),
            tenant_id_configured: tenant_id.is_some(),
            seed_password_configured: seed_password.is_some(),
            load_problems: problems,
        }
    }

    /// Resolve the database configuration, falling back to a local SQLite
    /// file only in development
    pub fn database(&self) -> Result<DatabaseConfig, ConfigError> {
        match &self.database_url {
            Some(url) => DatabaseConfig::new(url.clone(), self.max_pool_size),
            None if self.environment.is_development() => {
                DatabaseConfig::new(DEV_DATABASE_URL, self.max_pool_size)
            }
            None => Err(ConfigError::MissingVar("DATABASE_URL".to_string())),
        }
    }

    /// Check required configuration is present and internally consistent
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport {
            errors: self.load_problems.clone(),
            warnings: Vec::new(),
        };

        if let Err(e) = self.database() {
            report.errors.push(e.to_string());
        }

        match &self.jwt_secret {
            None => report.errors.push(ConfigError::MissingVar("JWT_SECRET".to_string()).to_string()),
            Some(secret) if self.environment.is_production() && secret.len() < MIN_PRODUCTION_SECRET_LEN => {
                report.errors.push(format!(
                    "JWT_SECRET must be at least {} characters in production",
                    MIN_PRODUCTION_SECRET_LEN
                ));
            }
            Some(_) => {}
        }

        if !self.tenant_id_configured {
            if self.environment.is_development() {
                report
                    .warnings
                    .push(format!("DEFAULT_TENANT_ID not set, using '{}'", DEV_TENANT_ID));
            } else {
                report
                    .errors
                    .push(ConfigError::MissingVar("DEFAULT_TENANT_ID".to_string()).to_string());
            }
        }

        if !self.seed_password_configured {
            report
                .warnings
                .push("SEED_DEFAULT_PASSWORD not set, default staff accounts use the development password".to_string());
        }

        if self.migration.timeout.is_zero() {
            report.errors.push("MIGRATION_TIMEOUT_SECS must be greater than zero".to_string());
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_to_development_sqlite() {
        let settings = settings(&[]);
        assert_eq!(settings.environment, Environment::Development);
        let db = settings.database().unwrap();
        assert_eq!(db.backend, Backend::Embedded);
        assert_eq!(settings.tenant.tenant_id, "default");
        assert_eq!(settings.tenant.upsert_policy, UpsertPolicy::SkipIfExists);
    }

    #[test]
    fn test_production_requires_database_url_tenant_and_secret() {
        let settings = settings(&[("APP_ENV", "production")]);
        let report = settings.validate();
        assert!(!report.is_valid());
        assert!(report.errors.iter().any(|e| e.contains("DATABASE_URL")));
        assert!(report.errors.iter().any(|e| e.contains("JWT_SECRET")));
        assert!(report.errors.iter().any(|e| e.contains("DEFAULT_TENANT_ID")));
    }

    #[test]
    fn test_production_rejects_short_secret() {
        let settings = settings(&[
            ("APP_ENV", "prod"),
            ("DATABASE_URL", "postgresql://app:pw@db:5432/hotel"),
            ("DEFAULT_TENANT_ID", "grand-hotel"),
            ("JWT_SECRET", "short"),
        ]);
        let report = settings.validate();
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("at least 32"));
    }

    #[test]
    fn test_complete_production_config_is_valid() {
        let settings = settings(&[
            ("APP_ENV", "production"),
            ("DATABASE_URL", "postgresql://app:pw@db:5432/hotel"),
            ("DEFAULT_TENANT_ID", "grand-hotel"),
            ("JWT_SECRET", "0123456789abcdef0123456789abcdef"),
            ("SEED_DEFAULT_PASSWORD", "s3cret-pass"),
        ]);
        let report = settings.validate();
        assert!(report.is_valid(), "{:?}", report.errors);
        assert!(report.warnings.is_empty());
        assert_eq!(settings.database().unwrap().backend, Backend::ServerRelational);
    }

    #[test]
    fn test_unknown_environment_is_strict() {
        let settings = settings(&[("APP_ENV", "qa-cluster")]);
        assert_eq!(settings.environment, Environment::Production);
        assert!(settings.validate().errors.iter().any(|e| e.contains("qa-cluster")));
    }

    #[test]
    fn test_unsupported_backend_is_reported() {
        let settings = settings(&[("DATABASE_URL", "mysql://root@localhost/app")]);
        assert!(matches!(settings.database(), Err(ConfigError::UnsupportedBackend(_))));
        assert!(!settings.validate().is_valid());
    }

    #[test]
    fn test_malformed_numbers_become_problems() {
        let settings = settings(&[("MIGRATION_TIMEOUT_SECS", "soon"), ("JWT_SECRET", "x")]);
        assert_eq!(settings.migration.timeout, Duration::from_secs(30));
        assert!(settings
            .validate()
            .errors
            .iter()
            .any(|e| e.contains("MIGRATION_TIMEOUT_SECS")));
    }

    #[test]
    fn test_reset_credentials_flag() {
        let settings = settings(&[("SEED_RESET_CREDENTIALS", "true")]);
        assert_eq!(settings.tenant.upsert_policy, UpsertPolicy::ReplaceCredentialsEveryRun);
    }
}
