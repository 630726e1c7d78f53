//! Startup orchestration
//!
//! Drives a run through `Validating → Migrating → Seeding → Ready`, with
//! `Failed` reachable from every phase before Ready. Production fails fast;
//! other environments degrade and keep going wherever that is safe.

use crate::config::{Environment, Settings};
use crate::db::lock::MigrationLock;
use crate::db::{self, Backend, Database};
use crate::drift::{DriftDetector, DriftPlan};
use crate::error::EngineError;
use crate::introspection::SchemaIntrospector;
use crate::migration::{ExecutionResult, MigrationExecutor};
use crate::report::{ConsistencyReport, ConsistencyReporter};
use crate::schema::ExpectedSchema;
use crate::seed::{default_accounts, SeedCoordinator, SeedRecord, StaffAccount};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use tokio::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StartupPhase {
    Validating,
    Migrating,
    Seeding,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthPing {
    pub attempt: u32,
    pub ok: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What an HTTP layer consults before accepting traffic
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadySignal {
    pub ready: bool,
    pub degraded: bool,
    pub report: Option<ConsistencyReport>,
}

/// Structured result of one startup run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartupOutcome {
    pub phase: StartupPhase,
    pub environment: Environment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<Backend>,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub warnings: Vec<String>,
    pub plan_log: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migration: Option<ExecutionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converged: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<SeedRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ConsistencyReport>,
    pub health_pings: Vec<HealthPing>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl StartupOutcome {
    fn new(environment: Environment) -> Self {
        Self {
            phase: StartupPhase::Validating,
            environment,
            backend: None,
            degraded: false,
            failure: None,
            warnings: Vec::new(),
            plan_log: Vec::new(),
            migration: None,
            converged: None,
            seed: None,
            report: None,
            health_pings: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    fn fail(&mut self, err: impl std::fmt::Display) {
        error!("❌ Startup failed during {:?}: {}", self.phase, err);
        self.failure = Some(err.to_string());
        self.phase = StartupPhase::Failed;
    }

    fn degrade(&mut self, message: String) {
        warn!("⚠️  {}", message);
        self.degraded = true;
        self.warnings.push(message);
    }

    fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn is_ready(&self) -> bool {
        self.phase == StartupPhase::Ready
    }

    pub fn ready_signal(&self) -> ReadySignal {
        ReadySignal {
            ready: self.is_ready(),
            degraded: self.degraded,
            report: self.report.clone(),
        }
    }

    /// 0 for Ready (degraded included), 1 for Failed
    pub fn exit_code(&self) -> i32 {
        match self.phase {
            StartupPhase::Failed => 1,
            _ => 0,
        }
    }

    pub fn write_to(&self, path: &Path) -> Result<(), EngineError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| EngineError::Report(format!("{}: {}", parent.display(), e)))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| EngineError::Report(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| EngineError::Report(format!("{}: {}", path.display(), e)))?;
        info!("📝 Startup report written to {}", path.display());
        Ok(())
    }
}

pub struct StartupOrchestrator {
    settings: Settings,
    expected: ExpectedSchema,
    accounts: Vec<StaffAccount>,
}

impl StartupOrchestrator {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            expected: ExpectedSchema::standard(),
            accounts: default_accounts(),
        }
    }

    pub fn with_expected_schema(mut self, expected: ExpectedSchema) -> Self {
        self.expected = expected;
        self
    }

    pub fn with_accounts(mut self, accounts: Vec<StaffAccount>) -> Self {
        self.accounts = accounts;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Validate, connect, then run every phase
    pub async fn run(&self) -> StartupOutcome {
        let mut outcome = StartupOutcome::new(self.settings.environment);
        if !self.validate(&mut outcome) {
            return outcome.finish();
        }

        let config = match self.settings.database() {
            Ok(config) => config,
            Err(e) => {
                outcome.fail(EngineError::Connection(e.to_string()));
                return outcome.finish();
            }
        };
        info!("🔌 Connecting to {}", db::redact(&config.url));

        let database = match db::connect(&config).await {
            Ok(database) => database,
            Err(e) => {
                outcome.fail(e);
                return outcome.finish();
            }
        };

        self.proceed(database.as_ref(), outcome).await
    }

    /// Run every phase against an already connected database
    pub async fn run_with_database(&self, database: &dyn Database) -> StartupOutcome {
        let mut outcome = StartupOutcome::new(self.settings.environment);
        if !self.validate(&mut outcome) {
            return outcome.finish();
        }
        self.proceed(database, outcome).await
    }

    async fn proceed(&self, database: &dyn Database, mut outcome: StartupOutcome) -> StartupOutcome {
        outcome.backend = Some(database.backend());

        outcome.phase = StartupPhase::Migrating;
        self.migrating(database, &mut outcome).await;
        if outcome.phase == StartupPhase::Failed {
            return outcome.finish();
        }

        outcome.phase = StartupPhase::Seeding;
        self.seeding(database, &mut outcome).await;

        outcome.phase = StartupPhase::Ready;
        self.ready(database, &mut outcome).await;

        if outcome.degraded {
            warn!("🟡 Startup complete in degraded mode ({} warning(s))", outcome.warnings.len());
        } else {
            info!("🟢 Startup complete, ready to serve");
        }
        outcome.finish()
    }

    fn validate(&self, outcome: &mut StartupOutcome) -> bool {
        info!("🔍 Validating configuration ({:?})", self.settings.environment);
        let report = self.settings.validate();

        for warning in &report.warnings {
            warn!("   {}", warning);
        }
        outcome.warnings.extend(report.warnings.iter().cloned());

        if report.is_valid() {
            return true;
        }

        if self.settings.environment.is_production() {
            outcome.fail(EngineError::ConfigValidation(report.errors));
            return false;
        }

        for problem in report.errors {
            warn!("   {} (continuing outside production)", problem);
            outcome.warnings.push(problem);
        }
        true
    }

    async fn migrating(&self, database: &dyn Database, outcome: &mut StartupOutcome) {
        let timeout = self.settings.migration.timeout;
        let deadline = Instant::now() + timeout;
        let lock = MigrationLock::new(self.settings.migration.lock_lease);

        // Lock wait and catalog reads may be cut short; issued DDL never is
        let prepared = match tokio::time::timeout_at(deadline, self.prepare(database, &lock)).await {
            Ok(prepared) => prepared,
            Err(_) => {
                self.release_after_timeout(database, &lock).await;
                Err(EngineError::Timeout(timeout))
            }
        };
        let plan = match prepared {
            Ok(plan) => plan,
            Err(err) => return self.migration_error(outcome, err),
        };

        plan.log();
        outcome.plan_log = plan.action_log();

        let applied = if plan.is_empty() {
            outcome.converged = Some(true);
            Ok(())
        } else {
            self.apply(database, &plan, deadline, outcome).await
        };
        if let Err(e) = lock.release(database).await {
            warn!("Could not release migration lock: {}", e);
        }
        if let Err(err) = applied {
            return self.migration_error(outcome, err);
        }

        let Some(execution) = &outcome.migration else {
            return;
        };
        if execution.timed_out {
            let message = format!(
                "{} ({} of {} migration unit(s) applied)",
                EngineError::Timeout(timeout),
                execution.applied.len(),
                execution.unit_count()
            );
            self.migration_problem(outcome, message);
        } else if execution.is_total_failure() {
            let message = format!("all {} migration unit(s) failed", execution.failed.len());
            self.migration_problem(outcome, message);
        } else if !execution.is_success() {
            let message = format!(
                "{} of {} migration unit(s) failed",
                execution.failed.len(),
                execution.unit_count()
            );
            outcome.degrade(message);
        }
    }

    fn migration_error(&self, outcome: &mut StartupOutcome, err: EngineError) {
        if is_fatal(&err) {
            outcome.fail(err);
        } else {
            self.migration_problem(outcome, err.to_string());
        }
    }

    /// Timeout and total failure end the run in production only
    fn migration_problem(&self, outcome: &mut StartupOutcome, message: String) {
        if self.settings.environment.is_production() {
            outcome.fail(message);
        } else {
            outcome.degrade(message);
        }
    }

    /// The lease expires on its own if this does not get through
    async fn release_after_timeout(&self, database: &dyn Database, lock: &MigrationLock) {
        let grace = self.settings.migration.lock_poll_interval;
        match tokio::time::timeout(grace, lock.release(database)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Could not release migration lock after timeout: {}", e),
            Err(_) => warn!("Migration lock release timed out, lease will expire"),
        }
    }

    /// Take the lock and work out what has drifted
    async fn prepare(&self, database: &dyn Database, lock: &MigrationLock) -> Result<DriftPlan, EngineError> {
        lock.acquire(database, self.settings.migration.lock_poll_interval)
            .await
            .map_err(|e| {
                if e.is_connection() {
                    EngineError::Connection(e.message)
                } else {
                    EngineError::Lock(e.message)
                }
            })?;

        match SchemaIntrospector::introspect(database).await {
            Ok(actual) => Ok(DriftDetector::detect(&self.expected, &actual)),
            Err(e) => {
                if let Err(release) = lock.release(database).await {
                    warn!("Could not release migration lock: {}", release);
                }
                Err(e.into())
            }
        }
    }

    async fn apply(
        &self,
        database: &dyn Database,
        plan: &DriftPlan,
        deadline: Instant,
        outcome: &mut StartupOutcome,
    ) -> Result<(), EngineError> {
        let execution = MigrationExecutor::new(database)
            .apply_before(&plan.units, deadline)
            .await;
        let aborted = execution.aborted;
        let succeeded = execution.is_success();
        outcome.migration = Some(execution);

        if aborted {
            return Err(EngineError::Connection(
                "connection lost while applying migrations".to_string(),
            ));
        }
        if !succeeded {
            return Ok(());
        }

        let after = match tokio::time::timeout_at(deadline, SchemaIntrospector::introspect(database)).await {
            Ok(after) => after?,
            Err(_) => {
                warn!("Convergence check skipped, migration deadline reached");
                outcome
                    .warnings
                    .push("Convergence check skipped, migration deadline reached".to_string());
                return Ok(());
            }
        };
        let residual = DriftDetector::detect(&self.expected, &after);
        if residual.is_empty() {
            outcome.converged = Some(true);
        } else {
            error!("Schema did not converge after migration:");
            for line in residual.action_log() {
                error!("   residual drift: {}", line);
            }
            outcome.converged = Some(false);
            outcome.degrade(format!(
                "{} action(s) still pending after migration",
                residual.action_count()
            ));
        }
        Ok(())
    }

    /// Seeding problems never stop startup
    async fn seeding(&self, database: &dyn Database, outcome: &mut StartupOutcome) {
        match SeedCoordinator::new(database)
            .ensure_baseline(&self.settings.tenant, &self.accounts)
            .await
        {
            Ok(record) => outcome.seed = Some(record),
            Err(e) => outcome.degrade(format!("Seeding failed: {}", e)),
        }
    }

    async fn ready(&self, database: &dyn Database, outcome: &mut StartupOutcome) {
        match SchemaIntrospector::introspect(database).await {
            Ok(actual) => {
                let report = ConsistencyReporter::report(&self.expected, &actual);
                report.log();
                outcome.report = Some(report);
            }
            Err(e) => {
                warn!("Consistency report unavailable: {}", e);
                outcome.warnings.push(format!("Consistency report unavailable: {}", e));
            }
        }

        let count = self.settings.migration.health_ping_count;
        for attempt in 1..=count {
            let started = Instant::now();
            let result = database.ping().await;
            let latency_ms = started.elapsed().as_millis() as u64;
            match &result {
                Ok(()) => info!("💓 Health ping {}/{}: ok ({}ms)", attempt, count, latency_ms),
                Err(e) => warn!("💔 Health ping {}/{}: {}", attempt, count, e),
            }
            outcome.health_pings.push(HealthPing {
                attempt,
                ok: result.is_ok(),
                latency_ms,
                error: result.err().map(|e| e.to_string()),
            });
            if attempt < count {
                tokio::time::sleep(self.settings.migration.health_ping_interval).await;
            }
        }
    }
}

fn is_fatal(err: &EngineError) -> bool {
    match err {
        EngineError::Connection(_) => true,
        EngineError::Introspection(e) => e.is_connection(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::SqliteDatabase;
    use crate::db::{DbError, Row, SqlValue, Transaction};
    use crate::test_support::{memory_db, test_tenant};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Every call fails as if the server went away
    struct UnreachableDatabase;

    #[async_trait]
    impl Database for UnreachableDatabase {
        fn backend(&self) -> Backend {
            Backend::ServerRelational
        }

        async fn ping(&self) -> Result<(), DbError> {
            Err(DbError::connection("connection refused"))
        }

        async fn query(&self, _sql: &str, _params: &[SqlValue]) -> Result<Vec<Row>, DbError> {
            Err(DbError::connection("connection refused"))
        }

        async fn execute(&self, _sql: &str, _params: &[SqlValue]) -> Result<u64, DbError> {
            Err(DbError::connection("connection refused"))
        }

        async fn begin(&self) -> Result<Box<dyn Transaction>, DbError> {
            Err(DbError::connection("connection refused"))
        }
    }

    /// Reads answer with nothing, writes never finish
    struct StalledDatabase;

    #[async_trait]
    impl Database for StalledDatabase {
        fn backend(&self) -> Backend {
            Backend::Embedded
        }

        async fn ping(&self) -> Result<(), DbError> {
            Ok(())
        }

        async fn query(&self, _sql: &str, _params: &[SqlValue]) -> Result<Vec<Row>, DbError> {
            Ok(Vec::new())
        }

        async fn execute(&self, _sql: &str, _params: &[SqlValue]) -> Result<u64, DbError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(0)
        }

        async fn begin(&self) -> Result<Box<dyn Transaction>, DbError> {
            Err(DbError::other("transactions unavailable"))
        }
    }

    /// SQLite, except that creating `call_logs` outlasts the migration budget
    struct SlowCreateDatabase {
        inner: SqliteDatabase,
        delay: Duration,
    }

    struct SlowCreateTransaction {
        inner: Box<dyn Transaction>,
        delay: Duration,
    }

    #[async_trait]
    impl Database for SlowCreateDatabase {
        fn backend(&self) -> Backend {
            self.inner.backend()
        }

        async fn ping(&self) -> Result<(), DbError> {
            self.inner.ping().await
        }

        async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DbError> {
            self.inner.query(sql, params).await
        }

        async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, DbError> {
            self.inner.execute(sql, params).await
        }

        async fn begin(&self) -> Result<Box<dyn Transaction>, DbError> {
            Ok(Box::new(SlowCreateTransaction {
                inner: self.inner.begin().await?,
                delay: self.delay,
            }))
        }
    }

    #[async_trait]
    impl Transaction for SlowCreateTransaction {
        async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DbError> {
            self.inner.query(sql, params).await
        }

        async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DbError> {
            if sql.starts_with("CREATE TABLE") && sql.contains("\"call_logs\"") {
                tokio::time::sleep(self.delay).await;
            }
            self.inner.execute(sql, params).await
        }

        async fn commit(self: Box<Self>) -> Result<(), DbError> {
            self.inner.commit().await
        }

        async fn rollback(self: Box<Self>) -> Result<(), DbError> {
            self.inner.rollback().await
        }
    }

    async fn slow_create_db() -> SlowCreateDatabase {
        SlowCreateDatabase {
            inner: memory_db().await,
            delay: Duration::from_millis(800),
        }
    }

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut settings = Settings::from_lookup(|key| map.get(key).cloned());
        settings.tenant = test_tenant();
        settings.migration.health_ping_count = 2;
        settings.migration.health_ping_interval = Duration::from_millis(1);
        settings.migration.lock_poll_interval = Duration::from_millis(10);
        settings
    }

    fn production() -> Vec<(&'static str, &'static str)> {
        vec![
            ("APP_ENV", "production"),
            ("DATABASE_URL", "sqlite::memory:"),
            ("DEFAULT_TENANT_ID", "grand-hotel"),
            ("JWT_SECRET", "0123456789abcdef0123456789abcdef"),
            ("SEED_DEFAULT_PASSWORD", "front-desk-pass"),
        ]
    }

    #[tokio::test]
    async fn test_production_with_missing_config_fails_before_touching_database() {
        let orchestrator = StartupOrchestrator::new(settings(&[("APP_ENV", "production")]));
        let outcome = orchestrator.run_with_database(&UnreachableDatabase).await;

        assert_eq!(outcome.phase, StartupPhase::Failed);
        assert_eq!(outcome.exit_code(), 1);
        assert!(outcome.failure.unwrap().contains("JWT_SECRET"));
        assert!(outcome.backend.is_none());
    }

    #[tokio::test]
    async fn test_development_warns_and_reaches_ready() {
        let db = memory_db().await;
        let outcome = StartupOrchestrator::new(settings(&[]))
            .run_with_database(&db)
            .await;

        assert_eq!(outcome.phase, StartupPhase::Ready);
        assert_eq!(outcome.exit_code(), 0);
        assert!(outcome.warnings.iter().any(|w| w.contains("JWT_SECRET")));
        assert!(!outcome.degraded, "{:?}", outcome.warnings);
        assert_eq!(outcome.converged, Some(true));
        assert_eq!(outcome.seed.as_ref().unwrap().created_usernames().len(), 4);
        assert_eq!(outcome.health_pings.len(), 2);

        let signal = outcome.ready_signal();
        assert!(signal.ready);
        assert_eq!(signal.report.unwrap().consistency_percentage, 100.0);
    }

    #[tokio::test]
    async fn test_second_run_has_nothing_to_do() {
        let db = memory_db().await;
        let orchestrator = StartupOrchestrator::new(settings(&production()));

        let first = orchestrator.run_with_database(&db).await;
        assert!(first.is_ready(), "{:?}", first.failure);
        assert!(!first.plan_log.is_empty());

        let second = orchestrator.run_with_database(&db).await;
        assert!(second.is_ready());
        assert!(second.plan_log.is_empty());
        assert!(second.migration.is_none());
        assert!(second.seed.unwrap().created_usernames().is_empty());
    }

    #[tokio::test]
    async fn test_lost_connection_is_always_fatal() {
        let outcome = StartupOrchestrator::new(settings(&[]))
            .run_with_database(&UnreachableDatabase)
            .await;
        assert_eq!(outcome.phase, StartupPhase::Failed);
        assert!(outcome.failure.unwrap().contains("connection refused"));
        assert!(outcome.seed.is_none());
    }

    #[tokio::test]
    async fn test_timeout_degrades_in_development() {
        let mut settings = settings(&[]);
        settings.migration.timeout = Duration::from_millis(50);
        let outcome = StartupOrchestrator::new(settings)
            .run_with_database(&StalledDatabase)
            .await;

        assert_eq!(outcome.phase, StartupPhase::Ready);
        assert!(outcome.degraded);
        assert!(outcome.warnings.iter().any(|w| w.contains("timed out")));
        assert!(outcome.warnings.iter().any(|w| w.contains("Seeding failed")));
        assert_eq!(outcome.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_timeout_is_fatal_in_production() {
        let mut settings = settings(&production());
        settings.migration.timeout = Duration::from_millis(50);
        let outcome = StartupOrchestrator::new(settings)
            .run_with_database(&StalledDatabase)
            .await;

        assert_eq!(outcome.phase, StartupPhase::Failed);
        assert_eq!(outcome.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_deadline_lets_started_ddl_finish_and_records_it() {
        let db = slow_create_db().await;
        let mut settings = settings(&[]);
        settings.migration.timeout = Duration::from_millis(300);

        let outcome = StartupOrchestrator::new(settings).run_with_database(&db).await;

        assert_eq!(outcome.phase, StartupPhase::Ready);
        assert!(outcome.degraded);
        assert!(outcome.warnings.iter().any(|w| w.contains("300ms")));
        assert_eq!(outcome.plan_log.len(), 5);

        let migration = outcome.migration.as_ref().unwrap();
        assert!(migration.timed_out);
        let applied: Vec<&str> = migration.applied.iter().map(|u| u.unit.as_str()).collect();
        assert_eq!(applied, vec!["create_table:call_logs"]);
        assert_eq!(migration.failed.len(), 4);
        assert!(migration
            .failed
            .iter()
            .all(|f| f.error.contains("deadline") && f.statement.is_none()));

        let live = SchemaIntrospector::introspect(&db.inner).await.unwrap();
        assert_eq!(live.keys().collect::<Vec<_>>(), vec!["call_logs"]);
    }

    #[tokio::test]
    async fn test_deadline_fails_production_but_keeps_migration_record() {
        let db = slow_create_db().await;
        let mut settings = settings(&production());
        settings.migration.timeout = Duration::from_millis(300);

        let outcome = StartupOrchestrator::new(settings).run_with_database(&db).await;

        assert_eq!(outcome.phase, StartupPhase::Failed);
        assert_eq!(outcome.exit_code(), 1);
        let migration = outcome.migration.as_ref().unwrap();
        assert_eq!(migration.applied.len(), 1);
        assert!(migration.timed_out);
    }

    #[tokio::test]
    async fn test_partial_failure_degrades_but_seeds() {
        let db = memory_db().await;
        // An index squatting on an expected table name makes its CREATE fail
        db.execute("CREATE TABLE archive (id INTEGER)", &[]).await.unwrap();
        db.execute("CREATE INDEX call_logs ON archive (id)", &[])
            .await
            .unwrap();

        let outcome = StartupOrchestrator::new(settings(&production()))
            .run_with_database(&db)
            .await;

        assert_eq!(outcome.phase, StartupPhase::Ready);
        assert!(outcome.degraded);
        let migration = outcome.migration.as_ref().unwrap();
        assert_eq!(migration.failed.len(), 1);
        assert_eq!(migration.failed[0].table, "call_logs");
        assert!(outcome.seed.is_some());
        assert!(outcome.report.unwrap().consistency_percentage < 100.0);
    }

    #[tokio::test]
    async fn test_outcome_is_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("startup.json");
        let db = memory_db().await;
        let outcome = StartupOrchestrator::new(settings(&[]))
            .run_with_database(&db)
            .await;

        outcome.write_to(&path).unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["phase"], "ready");
        assert_eq!(written["report"]["consistencyPercentage"], 100.0);
        assert!(written["seed"]["staffAccounts"][0].get("passwordHash").is_none());
    }
}
