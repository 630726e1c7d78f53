//! Migration executor
//!
//! Applies migration units one at a time, each in its own transaction.
//! A failing unit is rolled back and recorded; it never stops the units
//! after it, except when the connection itself is gone. With a deadline,
//! no unit starts once it has passed, but a unit already started always
//! runs to completion.

pub mod ddl;

use crate::db::{Database, DatabaseErrorCode, DbError, Transaction};
use crate::drift::MigrationUnit;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// A unit that committed
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedUnit {
    pub unit: String,
    pub table: String,
    /// Statements that changed the schema
    pub statements: Vec<String>,
    /// Statements whose target already existed
    pub already_satisfied: Vec<String>,
    pub notes: Vec<String>,
}

/// A unit that was rolled back
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedUnit {
    pub unit: String,
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,
    pub code: DatabaseErrorCode,
    pub error: String,
}

/// Outcome of applying a plan
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub applied: Vec<AppliedUnit>,
    pub failed: Vec<FailedUnit>,
    /// Set when the connection dropped and remaining units were not attempted
    pub aborted: bool,
    /// Set when the deadline passed before every unit was started
    pub timed_out: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.aborted
    }

    /// Every attempted unit failed
    pub fn is_total_failure(&self) -> bool {
        !self.failed.is_empty() && self.applied.is_empty()
    }

    pub fn unit_count(&self) -> usize {
        self.applied.len() + self.failed.len()
    }
}

/// Statement-level failure inside a unit
struct UnitError {
    statement: Option<String>,
    source: DbError,
}

/// Executes migration units against one database
pub struct MigrationExecutor<'a> {
    db: &'a dyn Database,
}

impl<'a> MigrationExecutor<'a> {
    pub fn new(db: &'a dyn Database) -> Self {
        Self { db }
    }

    /// Render the DDL the plan would run, without executing anything
    pub fn render(&self, units: &[MigrationUnit]) -> Vec<String> {
        let backend = self.db.backend();
        units
            .iter()
            .flat_map(|unit| unit.actions.iter())
            .map(|action| ddl::for_action(action, backend).sql)
            .collect()
    }

    /// Apply units in order. Unit failures are collected, never returned.
    pub async fn apply(&self, units: &[MigrationUnit]) -> ExecutionResult {
        self.run(units, None).await
    }

    /// Like `apply`, but units not yet started when `deadline` passes are
    /// recorded as failed instead of attempted
    pub async fn apply_before(&self, units: &[MigrationUnit], deadline: Instant) -> ExecutionResult {
        self.run(units, Some(deadline)).await
    }

    async fn run(&self, units: &[MigrationUnit], deadline: Option<Instant>) -> ExecutionResult {
        let started = Instant::now();
        let mut result = ExecutionResult {
            applied: Vec::new(),
            failed: Vec::new(),
            aborted: false,
            timed_out: false,
            started_at: Utc::now(),
            duration_ms: 0,
        };

        for (idx, unit) in units.iter().enumerate() {
            if result.aborted {
                break;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                result.timed_out = true;
                skip_units(
                    &mut result,
                    &units[idx..],
                    DatabaseErrorCode::Other,
                    "not attempted: migration deadline reached",
                );
                break;
            }
            info!("Applying [{}]", unit.name);

            match self.apply_unit(unit).await {
                Ok(applied) => {
                    for stmt in &applied.statements {
                        info!("✅ [{}] applied: {}", applied.unit, first_line(stmt));
                    }
                    for stmt in &applied.already_satisfied {
                        info!("✅ [{}] already satisfied: {}", applied.unit, first_line(stmt));
                    }
                    result.applied.push(applied);
                }
                Err(err) => {
                    error!(
                        "❌ [{}] failed and rolled back ({:?}): {}",
                        unit.name, err.source.code, err.source.message
                    );
                    let connection_lost = err.source.is_connection();
                    result.failed.push(FailedUnit {
                        unit: unit.name.clone(),
                        table: unit.table.clone(),
                        statement: err.statement,
                        code: err.source.code,
                        error: err.source.message,
                    });

                    if connection_lost {
                        result.aborted = true;
                        skip_units(
                            &mut result,
                            &units[idx + 1..],
                            DatabaseErrorCode::ConnectionFailure,
                            "not attempted: connection lost",
                        );
                    }
                }
            }
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "Migration finished: {} applied, {} failed in {}ms",
            result.applied.len(),
            result.failed.len(),
            result.duration_ms
        );
        result
    }

    async fn apply_unit(&self, unit: &MigrationUnit) -> Result<AppliedUnit, UnitError> {
        let mut tx = self.db.begin().await.map_err(|source| UnitError {
            statement: None,
            source,
        })?;

        let mut applied = AppliedUnit {
            unit: unit.name.clone(),
            table: unit.table.clone(),
            statements: Vec::new(),
            already_satisfied: Vec::new(),
            notes: Vec::new(),
        };

        match self.run_actions(&mut *tx, unit, &mut applied).await {
            Ok(()) => {
                tx.commit().await.map_err(|source| UnitError {
                    statement: Some("COMMIT".to_string()),
                    source,
                })?;
                Ok(applied)
            }
            Err(err) => {
                if let Err(e) = tx.rollback().await {
                    warn!("[{}] rollback failed: {}", unit.name, e);
                }
                Err(err)
            }
        }
    }

    /// Each action runs under a savepoint so a duplicate-object error can be
    /// undone without aborting the surrounding transaction
    async fn run_actions(
        &self,
        tx: &mut dyn Transaction,
        unit: &MigrationUnit,
        applied: &mut AppliedUnit,
    ) -> Result<(), UnitError> {
        let backend = self.db.backend();

        for (idx, action) in unit.actions.iter().enumerate() {
            let statement = ddl::for_action(action, backend);
            for note in &statement.notes {
                warn!("[{}] {}", unit.name, note);
            }
            applied.notes.extend(statement.notes.iter().cloned());

            let savepoint = format!("drift_action_{}", idx);
            exec(tx, &format!("SAVEPOINT {}", savepoint)).await?;

            match tx.execute(&statement.sql, &[]).await {
                Ok(_) => {
                    exec(tx, &format!("RELEASE SAVEPOINT {}", savepoint)).await?;
                    applied.statements.push(statement.sql);
                }
                Err(e) if e.code.is_already_satisfied() => {
                    info!("[{}] {} already present ({:?})", unit.name, action.table_name(), e.code);
                    exec(tx, &format!("ROLLBACK TO SAVEPOINT {}", savepoint)).await?;
                    exec(tx, &format!("RELEASE SAVEPOINT {}", savepoint)).await?;
                    applied.already_satisfied.push(statement.sql);
                }
                Err(source) => {
                    return Err(UnitError {
                        statement: Some(statement.sql),
                        source,
                    })
                }
            }
        }

        Ok(())
    }
}

fn skip_units(result: &mut ExecutionResult, units: &[MigrationUnit], code: DatabaseErrorCode, reason: &str) {
    for unit in units {
        warn!("[{}] {}", unit.name, reason);
        result.failed.push(FailedUnit {
            unit: unit.name.clone(),
            table: unit.table.clone(),
            statement: None,
            code,
            error: reason.to_string(),
        });
    }
}

async fn exec(tx: &mut dyn Transaction, sql: &str) -> Result<(), UnitError> {
    tx.execute(sql, &[]).await.map(|_| ()).map_err(|source| UnitError {
        statement: Some(sql.to_string()),
        source,
    })
}

fn first_line(sql: &str) -> &str {
    sql.lines().next().unwrap_or(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drift::{DriftAction, DriftDetector};
    use crate::introspection::SchemaIntrospector;
    use crate::schema::{ColumnSchema, DataType, ExpectedSchema, TableSchema};
    use crate::test_support::{file_db, memory_db};

    fn scenario_schema() -> ExpectedSchema {
        ExpectedSchema::new(vec![
            TableSchema::new(
                "tenants",
                vec![
                    ColumnSchema::new("id", DataType::Text).primary_key(),
                    ColumnSchema::new("hotel_name", DataType::Text).not_null(),
                    ColumnSchema::new("subscription_plan", DataType::Text),
                ],
            ),
            TableSchema::new(
                "staff",
                vec![
                    ColumnSchema::new("id", DataType::Serial).primary_key(),
                    ColumnSchema::new("username", DataType::Text).not_null(),
                    ColumnSchema::new("password", DataType::Text).not_null(),
                    ColumnSchema::new("role", DataType::Text),
                ],
            ),
        ])
    }

    #[tokio::test]
    async fn test_empty_database_converges_in_one_run() {
        let db = memory_db().await;
        let expected = scenario_schema();

        let actual = SchemaIntrospector::introspect(&db).await.unwrap();
        let plan = DriftDetector::detect(&expected, &actual);
        assert_eq!(plan.units.len(), 2);

        let result = MigrationExecutor::new(&db).apply(&plan.units).await;
        assert!(result.is_success());
        assert_eq!(result.applied.len(), 2);

        let after = SchemaIntrospector::introspect(&db).await.unwrap();
        for table in expected.tables() {
            let live = &after[&table.name];
            for column in &table.columns {
                assert!(live.has_column(&column.name), "{}.{}", table.name, column.name);
            }
        }
        assert!(DriftDetector::detect(&expected, &after).is_empty());
    }

    #[tokio::test]
    async fn test_standard_schema_is_idempotent_on_partial_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = file_db(&dir).await;
        db.execute(
            "CREATE TABLE staff (id INTEGER PRIMARY KEY, username TEXT NOT NULL, legacy_pin TEXT)",
            &[],
        )
        .await
        .unwrap();
        db.execute("INSERT INTO staff (username) VALUES ('existing')", &[])
            .await
            .unwrap();

        let expected = ExpectedSchema::standard();
        let plan = DriftDetector::detect(&expected, &SchemaIntrospector::introspect(&db).await.unwrap());
        let result = MigrationExecutor::new(&db).apply(&plan.units).await;
        assert!(result.is_success(), "{:?}", result.failed);

        let after = SchemaIntrospector::introspect(&db).await.unwrap();
        assert!(DriftDetector::detect(&expected, &after).is_empty());
        // Hand-added columns and existing rows survive
        assert!(after["staff"].has_column("legacy_pin"));
        let rows = db.query("SELECT COUNT(*) AS n FROM staff", &[]).await.unwrap();
        assert_eq!(rows[0].get_i64("n"), Some(1));
    }

    #[tokio::test]
    async fn test_add_column_already_present_counts_as_satisfied() {
        let db = memory_db().await;
        db.execute("CREATE TABLE staff (id INTEGER PRIMARY KEY, permissions TEXT)", &[])
            .await
            .unwrap();

        // A stale plan: the column was added after detection ran
        let unit = MigrationUnit {
            name: "add_column:staff.permissions".to_string(),
            table: "staff".to_string(),
            actions: vec![DriftAction::AddColumn {
                table: "staff".to_string(),
                column: ColumnSchema::new("permissions", DataType::Text).default_value("'[]'"),
            }],
        };

        let result = MigrationExecutor::new(&db).apply(&[unit]).await;
        assert!(result.is_success());
        assert_eq!(result.applied[0].already_satisfied.len(), 1);
        assert!(result.applied[0].statements.is_empty());
    }

    #[tokio::test]
    async fn test_failed_unit_does_not_block_others() {
        let db = memory_db().await;
        let expected = scenario_schema();
        let tenants = expected.table("tenants").unwrap().clone();

        let units = vec![
            MigrationUnit {
                name: "create_table:tenants".to_string(),
                table: "tenants".to_string(),
                actions: vec![DriftAction::CreateTable { table: tenants }],
            },
            // staff does not exist, so the ALTER must fail
            MigrationUnit {
                name: "add_column:staff.permissions".to_string(),
                table: "staff".to_string(),
                actions: vec![DriftAction::AddColumn {
                    table: "staff".to_string(),
                    column: ColumnSchema::new("permissions", DataType::Text),
                }],
            },
        ];

        let result = MigrationExecutor::new(&db).apply(&units).await;
        assert_eq!(result.applied.len(), 1);
        assert_eq!(result.applied[0].table, "tenants");
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].table, "staff");
        assert!(!result.aborted);
        assert!(!result.is_total_failure());

        let after = SchemaIntrospector::introspect(&db).await.unwrap();
        assert!(after.contains_key("tenants"));
        assert!(!after.contains_key("staff"));
    }

    #[tokio::test]
    async fn test_failed_unit_rolls_back_its_own_changes() {
        let db = memory_db().await;
        let unit = MigrationUnit {
            name: "create_table:broken".to_string(),
            table: "broken".to_string(),
            actions: vec![
                DriftAction::CreateTable {
                    table: TableSchema::new("broken", vec![ColumnSchema::new("id", DataType::Integer)]),
                },
                DriftAction::AddColumn {
                    table: "missing_table".to_string(),
                    column: ColumnSchema::new("x", DataType::Text),
                },
            ],
        };

        let result = MigrationExecutor::new(&db).apply(&[unit]).await;
        assert!(result.is_total_failure());
        let after = SchemaIntrospector::introspect(&db).await.unwrap();
        assert!(!after.contains_key("broken"));
    }

    #[tokio::test]
    async fn test_missing_permissions_column_is_added_with_default() {
        let db = memory_db().await;
        let expected = ExpectedSchema::new(vec![TableSchema::new(
            "staff",
            vec![
                ColumnSchema::new("id", DataType::Serial).primary_key(),
                ColumnSchema::new("username", DataType::Text).not_null(),
                ColumnSchema::new("permissions", DataType::Text)
                    .not_null()
                    .default_value("'[]'"),
            ],
        )]);
        db.execute(
            "CREATE TABLE staff (id INTEGER PRIMARY KEY AUTOINCREMENT, username TEXT NOT NULL)",
            &[],
        )
        .await
        .unwrap();
        db.execute("INSERT INTO staff (username) VALUES ('frontdesk')", &[])
            .await
            .unwrap();

        let plan = DriftDetector::detect(&expected, &SchemaIntrospector::introspect(&db).await.unwrap());
        let names: Vec<&str> = plan.units.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["add_column:staff.permissions"]);

        let result = MigrationExecutor::new(&db).apply(&plan.units).await;
        assert!(result.is_success(), "{:?}", result.failed);

        let after = SchemaIntrospector::introspect(&db).await.unwrap();
        let permissions = after["staff"].column("permissions").unwrap();
        assert_eq!(permissions.default_value.as_deref(), Some("'[]'"));
        assert!(DriftDetector::detect(&expected, &after).action_log().is_empty());

        let rows = db
            .query("SELECT permissions FROM staff WHERE username = 'frontdesk'", &[])
            .await
            .unwrap();
        assert_eq!(rows[0].get_str("permissions"), Some("[]"));
    }

    #[tokio::test]
    async fn test_units_after_deadline_are_not_started() {
        let db = memory_db().await;
        let plan = DriftDetector::detect(&scenario_schema(), &Default::default());

        let result = MigrationExecutor::new(&db)
            .apply_before(&plan.units, Instant::now())
            .await;
        assert!(result.timed_out);
        assert!(!result.aborted);
        assert!(result.applied.is_empty());
        assert_eq!(result.failed.len(), 2);
        assert!(result.failed.iter().all(|f| f.statement.is_none()));
        assert!(SchemaIntrospector::introspect(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deadline_in_future_applies_everything() {
        let db = memory_db().await;
        let plan = DriftDetector::detect(&scenario_schema(), &Default::default());
        let deadline = Instant::now() + std::time::Duration::from_secs(60);

        let result = MigrationExecutor::new(&db).apply_before(&plan.units, deadline).await;
        assert!(result.is_success());
        assert!(!result.timed_out);
        assert_eq!(result.applied.len(), 2);
    }

    #[tokio::test]
    async fn test_render_does_not_execute() {
        let db = memory_db().await;
        let plan = DriftDetector::detect(&scenario_schema(), &Default::default());
        let statements = MigrationExecutor::new(&db).render(&plan.units);
        assert_eq!(statements.len(), 2);
        assert!(SchemaIntrospector::introspect(&db).await.unwrap().is_empty());
    }
}
