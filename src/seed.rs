//! Baseline seeding
//!
//! Ensures the default tenant, its hotel profile and the default staff
//! accounts exist. Everything runs in one transaction: a failure leaves
//! the database as it was before the run.

mod password;

pub use password::{hash_password, verify_password};

use crate::config::TenantConfig;
use crate::db::{Backend, Database, SqlValue, Transaction};
use crate::error::SeedError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{info, warn};

/// How existing staff rows are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpsertPolicy {
    /// Delete and recreate every default account, resetting its password
    ReplaceCredentialsEveryRun,
    /// Leave existing accounts untouched
    #[default]
    SkipIfExists,
}

/// Default staff roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Administrator,
    Manager,
    FrontDesk,
    Technical,
}

impl StaffRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaffRole::Administrator => "admin",
            StaffRole::Manager => "manager",
            StaffRole::FrontDesk => "front_desk",
            StaffRole::Technical => "technical",
        }
    }

    pub fn default_permissions(&self) -> &'static [&'static str] {
        match self {
            StaffRole::Administrator => &["*"],
            StaffRole::Manager => &["dashboard", "calls", "requests", "staff", "reports"],
            StaffRole::FrontDesk => &["dashboard", "calls", "requests"],
            StaffRole::Technical => &["dashboard", "requests", "maintenance"],
        }
    }
}

impl fmt::Display for StaffRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A staff account to ensure
#[derive(Debug, Clone)]
pub struct StaffAccount {
    pub username: String,
    pub role: StaffRole,
    pub full_name: String,
}

impl StaffAccount {
    pub fn new(username: impl Into<String>, role: StaffRole, full_name: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            role,
            full_name: full_name.into(),
        }
    }
}

/// One account per default role
pub fn default_accounts() -> Vec<StaffAccount> {
    vec![
        StaffAccount::new("admin", StaffRole::Administrator, "Administrator"),
        StaffAccount::new("manager", StaffRole::Manager, "Hotel Manager"),
        StaffAccount::new("frontdesk", StaffRole::FrontDesk, "Front Desk"),
        StaffAccount::new("technical", StaffRole::Technical, "Technical Support"),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountAction {
    Created,
    Replaced,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeededAccount {
    pub username: String,
    pub role: StaffRole,
    pub action: AccountAction,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
}

/// What the seeding run ensured
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedRecord {
    pub tenant_id: String,
    pub tenant_created: bool,
    pub hotel_profile_id: i64,
    pub hotel_profile_created: bool,
    pub staff_accounts: Vec<SeededAccount>,
}

impl SeedRecord {
    /// Usernames inserted during this run (created or replaced)
    pub fn created_usernames(&self) -> Vec<&str> {
        self.staff_accounts
            .iter()
            .filter(|a| a.action != AccountAction::Skipped)
            .map(|a| a.username.as_str())
            .collect()
    }
}

/// Ensures baseline records exist
pub struct SeedCoordinator<'a> {
    db: &'a dyn Database,
}

impl<'a> SeedCoordinator<'a> {
    pub fn new(db: &'a dyn Database) -> Self {
        Self { db }
    }

    pub async fn ensure_baseline(
        &self,
        tenant: &TenantConfig,
        accounts: &[StaffAccount],
    ) -> Result<SeedRecord, SeedError> {
        let mut seen = HashSet::new();
        for account in accounts {
            if !seen.insert(account.username.as_str()) {
                return Err(SeedError::DuplicateUsername(account.username.clone()));
            }
        }

        let mut tx = self.db.begin().await?;
        match self.seed(&mut *tx, tenant, accounts).await {
            Ok(record) => {
                tx.commit().await?;
                info!(
                    "🌱 Baseline ensured for tenant '{}': {} account(s) written",
                    record.tenant_id,
                    record.created_usernames().len()
                );
                Ok(record)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!("Seed rollback failed: {}", rollback);
                }
                Err(e)
            }
        }
    }

    async fn seed(
        &self,
        tx: &mut dyn Transaction,
        tenant: &TenantConfig,
        accounts: &[StaffAccount],
    ) -> Result<SeedRecord, SeedError> {
        let backend = self.db.backend();
        let tenant_created = ensure_tenant(tx, backend, tenant).await?;
        let (hotel_profile_id, hotel_profile_created) = ensure_hotel_profile(tx, backend, tenant).await?;

        let mut staff_accounts = Vec::with_capacity(accounts.len());
        for account in accounts {
            staff_accounts.push(ensure_account(tx, backend, tenant, account).await?);
        }

        Ok(SeedRecord {
            tenant_id: tenant.tenant_id.clone(),
            tenant_created,
            hotel_profile_id,
            hotel_profile_created,
            staff_accounts,
        })
    }
}

async fn ensure_tenant(
    tx: &mut dyn Transaction,
    backend: Backend,
    tenant: &TenantConfig,
) -> Result<bool, SeedError> {
    let existing = tx
        .query(
            &format!("SELECT id FROM tenants WHERE id = {}", backend.param(1)),
            &[SqlValue::from(tenant.tenant_id.as_str())],
        )
        .await?;
    if !existing.is_empty() {
        info!("Tenant '{}' already exists", tenant.tenant_id);
        return Ok(false);
    }

    tx.execute(
        &format!(
            "INSERT INTO tenants (id, hotel_name, subscription_plan) VALUES ({}, {}, {})",
            backend.param(1),
            backend.param(2),
            backend.param(3)
        ),
        &[
            SqlValue::from(tenant.tenant_id.as_str()),
            SqlValue::from(tenant.hotel_name.as_str()),
            SqlValue::from(tenant.subscription_plan.as_str()),
        ],
    )
    .await?;
    info!("✅ Created tenant '{}' ({})", tenant.tenant_id, tenant.hotel_name);
    Ok(true)
}

async fn ensure_hotel_profile(
    tx: &mut dyn Transaction,
    backend: Backend,
    tenant: &TenantConfig,
) -> Result<(i64, bool), SeedError> {
    let select = format!("SELECT id FROM hotel_profiles WHERE tenant_id = {}", backend.param(1));
    let tenant_param = [SqlValue::from(tenant.tenant_id.as_str())];

    if let Some(id) = tx.query(&select, &tenant_param).await?.first().and_then(|r| r.get_i64("id")) {
        return Ok((id, false));
    }

    tx.execute(
        &format!(
            "INSERT INTO hotel_profiles (tenant_id, name) VALUES ({}, {})",
            backend.param(1),
            backend.param(2)
        ),
        &[
            SqlValue::from(tenant.tenant_id.as_str()),
            SqlValue::from(tenant.hotel_name.as_str()),
        ],
    )
    .await?;

    let id = tx
        .query(&select, &tenant_param)
        .await?
        .first()
        .and_then(|r| r.get_i64("id"))
        .ok_or_else(|| {
            SeedError::Database(crate::db::DbError::other(format!(
                "hotel profile for '{}' missing after insert",
                tenant.tenant_id
            )))
        })?;
    info!("✅ Created hotel profile {} for tenant '{}'", id, tenant.tenant_id);
    Ok((id, true))
}

async fn ensure_account(
    tx: &mut dyn Transaction,
    backend: Backend,
    tenant: &TenantConfig,
    account: &StaffAccount,
) -> Result<SeededAccount, SeedError> {
    let username = [SqlValue::from(account.username.as_str())];
    let exists = !tx
        .query(
            &format!("SELECT id FROM staff WHERE username = {}", backend.param(1)),
            &username,
        )
        .await?
        .is_empty();

    let action = match (exists, tenant.upsert_policy) {
        (true, UpsertPolicy::SkipIfExists) => {
            info!("Staff account '{}' exists, leaving credentials untouched", account.username);
            return Ok(SeededAccount {
                username: account.username.clone(),
                role: account.role,
                action: AccountAction::Skipped,
                password_hash: None,
            });
        }
        (true, UpsertPolicy::ReplaceCredentialsEveryRun) => {
            tx.execute(
                &format!("DELETE FROM staff WHERE username = {}", backend.param(1)),
                &username,
            )
            .await?;
            AccountAction::Replaced
        }
        (false, _) => AccountAction::Created,
    };

    let password_hash = hash_password(&account.username, &tenant.staff_password, tenant.hash_cost)?;
    let permissions = serde_json::to_string(account.role.default_permissions())
        .unwrap_or_else(|_| "[]".to_string());

    tx.execute(
        &format!(
            "INSERT INTO staff (tenant_id, username, password, role, full_name, permissions) VALUES ({}, {}, {}, {}, {}, {})",
            backend.param(1),
            backend.param(2),
            backend.param(3),
            backend.param(4),
            backend.param(5),
            backend.param(6)
        ),
        &[
            SqlValue::from(tenant.tenant_id.as_str()),
            SqlValue::from(account.username.as_str()),
            SqlValue::from(password_hash.as_str()),
            SqlValue::from(account.role.as_str()),
            SqlValue::from(account.full_name.as_str()),
            SqlValue::from(permissions),
        ],
    )
    .await?;

    // Read back what was stored and prove the plaintext still verifies
    let stored = tx
        .query(
            &format!("SELECT password FROM staff WHERE username = {}", backend.param(1)),
            &username,
        )
        .await?;
    let stored_hash = stored.first().and_then(|r| r.get_str("password")).unwrap_or_default();
    if !verify_password(&account.username, &tenant.staff_password, stored_hash).unwrap_or(false) {
        return Err(SeedError::VerificationFailed(account.username.clone()));
    }

    info!(
        "✅ Staff account '{}' ({}) {}",
        account.username,
        account.role,
        if action == AccountAction::Replaced { "replaced" } else { "created" }
    );

    Ok(SeededAccount {
        username: account.username.clone(),
        role: account.role,
        action,
        password_hash: Some(password_hash),
    })
}
