//! Advisory migration lock
//!
//! A single-row lease table guards the migrating phase so that two
//! processes starting against the same database do not race each other's
//! DDL. A lease that outlives its holder expires and can be taken over.

use super::queries::{CREATE_LOCK_TABLE, LOCK_ROW_ID};
use super::{Database, DatabaseErrorCode, DbError, SqlValue};
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct MigrationLock {
    holder: String,
    lease: Duration,
}

impl MigrationLock {
    pub fn new(lease: Duration) -> Self {
        Self {
            holder: Uuid::new_v4().to_string(),
            lease,
        }
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Take the lease if it is free, expired, or already ours
    pub async fn try_acquire(&self, db: &dyn Database) -> Result<bool, DbError> {
        match db.execute(CREATE_LOCK_TABLE, &[]).await {
            Ok(_) => {}
            // Concurrent CREATE TABLE IF NOT EXISTS can still collide on PostgreSQL
            Err(e) if matches!(e.code, DatabaseErrorCode::DuplicateTable | DatabaseErrorCode::UniqueViolation) => {}
            Err(e) => return Err(e),
        }

        let backend = db.backend();
        let now = Utc::now().timestamp();
        let expires_at = now + self.lease.as_secs() as i64;

        let reaped = db
            .execute(
                &format!(
                    "DELETE FROM schema_migration_lock WHERE id = {} AND expires_at < {}",
                    LOCK_ROW_ID, now
                ),
                &[],
            )
            .await?;
        if reaped > 0 {
            warn!("Reclaimed an expired migration lock");
        }

        let insert = format!(
            "INSERT INTO schema_migration_lock (id, holder, acquired_at, expires_at) VALUES ({}, {}, {}, {})",
            LOCK_ROW_ID,
            backend.param(1),
            now,
            expires_at
        );
        match db.execute(&insert, &[SqlValue::from(self.holder.as_str())]).await {
            Ok(_) => {
                info!("🔒 Migration lock acquired by {}", self.holder);
                Ok(true)
            }
            Err(e) if e.code == DatabaseErrorCode::UniqueViolation => {
                let rows = db
                    .query(
                        &format!("SELECT holder FROM schema_migration_lock WHERE id = {}", LOCK_ROW_ID),
                        &[],
                    )
                    .await?;
                let current = rows.first().and_then(|r| r.get_str("holder")).unwrap_or_default();
                if current == self.holder {
                    db.execute(
                        &format!(
                            "UPDATE schema_migration_lock SET expires_at = {} WHERE id = {}",
                            expires_at, LOCK_ROW_ID
                        ),
                        &[],
                    )
                    .await?;
                    return Ok(true);
                }
                debug!("Migration lock held by {}", current);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Poll until the lease is ours; bound the wait with a timeout at the call site
    pub async fn acquire(&self, db: &dyn Database, poll_interval: Duration) -> Result<(), DbError> {
        let mut announced = false;
        loop {
            if self.try_acquire(db).await? {
                return Ok(());
            }
            if !announced {
                info!("⏳ Waiting for another process to finish migrating...");
                announced = true;
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    pub async fn release(&self, db: &dyn Database) -> Result<(), DbError> {
        db.execute(
            &format!(
                "DELETE FROM schema_migration_lock WHERE id = {} AND holder = {}",
                LOCK_ROW_ID,
                db.backend().param(1)
            ),
            &[SqlValue::from(self.holder.as_str())],
        )
        .await?;
        debug!("🔓 Migration lock released by {}", self.holder);
        Ok(())
    }
}
