//! Shared fixtures for unit tests

use crate::config::{DatabaseConfig, TenantConfig};
use crate::db::sqlite::SqliteDatabase;
use tempfile::TempDir;

/// Single-connection in-memory SQLite database
pub async fn memory_db() -> SqliteDatabase {
    let config = DatabaseConfig::new("sqlite::memory:", 1).unwrap();
    SqliteDatabase::connect(&config).await.unwrap()
}

/// File-backed SQLite database inside `dir`, with a real pool
pub async fn file_db(dir: &TempDir) -> SqliteDatabase {
    let path = dir.path().join("reconciler.db");
    let config = DatabaseConfig::new(format!("sqlite://{}", path.display()), 4).unwrap();
    SqliteDatabase::connect(&config).await.unwrap()
}

/// Tenant settings with the cheapest bcrypt cost
pub fn test_tenant() -> TenantConfig {
    TenantConfig {
        tenant_id: "grand-hotel".to_string(),
        hotel_name: "Grand Hotel".to_string(),
        staff_password: "front-desk-pass".to_string(),
        hash_cost: 4,
        ..TenantConfig::default()
    }
}
