//! Drift detection
//!
//! Compares the expected schema with an introspected one and produces the
//! additive actions that close the gap. Structure that exists only in the
//! live database is recorded, never acted on.

use crate::schema::{find_table, ColumnSchema, ExpectedSchema, SchemaMap, TableSchema};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// A single corrective action. There is intentionally no variant that
/// removes or rewrites existing structure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DriftAction {
    CreateTable { table: TableSchema },
    AddColumn { table: String, column: ColumnSchema },
}

impl DriftAction {
    pub fn table_name(&self) -> &str {
        match self {
            DriftAction::CreateTable { table } => &table.name,
            DriftAction::AddColumn { table, .. } => table,
        }
    }

    /// One-line description used in the action log
    pub fn describe(&self) -> String {
        match self {
            DriftAction::CreateTable { table } => format!(
                "CreateTable({}) [{}]",
                table.name,
                table.column_names().join(", ")
            ),
            DriftAction::AddColumn { table, column } => format!(
                "AddColumn({}.{} {}{}{})",
                table,
                column.name,
                column.data_type,
                if column.nullable { "" } else { " NOT NULL" },
                column
                    .default_value
                    .as_ref()
                    .map(|d| format!(" DEFAULT {}", d))
                    .unwrap_or_default()
            ),
        }
    }
}

/// Transaction-scoped batch of actions for one table
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationUnit {
    pub name: String,
    pub table: String,
    pub actions: Vec<DriftAction>,
}

impl MigrationUnit {
    fn create_table(table: &TableSchema) -> Self {
        Self {
            name: format!("create_table:{}", table.name),
            table: table.name.clone(),
            actions: vec![DriftAction::CreateTable { table: table.clone() }],
        }
    }

    fn add_column(table: &str, column: &ColumnSchema) -> Self {
        Self {
            name: format!("add_column:{}.{}", table, column.name),
            table: table.to_string(),
            actions: vec![DriftAction::AddColumn {
                table: table.to_string(),
                column: column.clone(),
            }],
        }
    }
}

/// Ordered drift result
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftPlan {
    pub units: Vec<MigrationUnit>,
    /// Tables present only in the live database
    pub extra_tables: Vec<String>,
    /// Columns present only in the live database, by table
    pub extra_columns: BTreeMap<String, Vec<String>>,
}

impl DriftPlan {
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn action_count(&self) -> usize {
        self.units.iter().map(|u| u.actions.len()).sum()
    }

    /// Deterministic, line-per-action log of the plan
    pub fn action_log(&self) -> Vec<String> {
        self.units
            .iter()
            .flat_map(|unit| {
                unit.actions
                    .iter()
                    .map(move |action| format!("{}: {}", unit.name, action.describe()))
            })
            .collect()
    }

    /// Log every drift item individually
    pub fn log(&self) {
        if self.is_empty() {
            info!("✅ No schema drift detected");
        } else {
            warn!(
                "Schema drift detected: {} unit(s), {} action(s)",
                self.units.len(),
                self.action_count()
            );
            for line in self.action_log() {
                warn!("  drift: {}", line);
            }
        }

        for table in &self.extra_tables {
            info!("  extra table (left untouched): {}", table);
        }
        for (table, columns) in &self.extra_columns {
            info!("  extra columns on {} (left untouched): {}", table, columns.join(", "));
        }
    }
}

/// Diffs expected against actual structure
pub struct DriftDetector;

impl DriftDetector {
    /// Produce the ordered additive plan. Tables are visited in
    /// lexicographic order; a table's CreateTable precedes any AddColumn.
    pub fn detect(expected: &ExpectedSchema, actual: &SchemaMap) -> DriftPlan {
        let mut plan = DriftPlan::default();

        for table in expected.tables() {
            match find_table(actual, &table.name) {
                None => plan.units.push(MigrationUnit::create_table(table)),
                Some(live) => {
                    for column in &table.columns {
                        if !live.has_column(&column.name) {
                            plan.units.push(MigrationUnit::add_column(&table.name, column));
                        }
                    }

                    let extras: Vec<String> = live
                        .columns
                        .iter()
                        .filter(|c| !table.has_column(&c.name))
                        .map(|c| c.name.clone())
                        .collect();
                    if !extras.is_empty() {
                        plan.extra_columns.insert(table.name.clone(), extras);
                    }
                }
            }
        }

        plan.extra_tables = actual
            .values()
            .filter(|t| expected.table(&t.name).is_none())
            .map(|t| t.name.clone())
            .collect();

        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DataType;
    use pretty_assertions::assert_eq;

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
                    ColumnSchema::new("permissions", DataType::Text)
                        .not_null()
                        .default_value("'[]'"),
                ],
            ),
        ])
    }

    fn live(tables: Vec<TableSchema>) -> SchemaMap {
        tables.into_iter().map(|t| (t.name.clone(), t)).collect()
    }

    #[test]
    fn test_empty_database_creates_every_table_in_order() {
        let plan = DriftDetector::detect(&scenario_schema(), &SchemaMap::new());
        let names: Vec<&str> = plan.units.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["create_table:staff", "create_table:tenants"]);
        assert_eq!(plan.action_count(), 2);
    }

    #[test]
    fn test_missing_column_yields_single_add_column() {
        let expected = scenario_schema();
        let mut staff = expected.table("staff").unwrap().clone();
        staff.columns.retain(|c| c.name != "permissions");
        let actual = live(vec![staff, expected.table("tenants").unwrap().clone()]);

        let plan = DriftDetector::detect(&expected, &actual);
        assert_eq!(plan.units.len(), 1);
        match &plan.units[0].actions[..] {
            [DriftAction::AddColumn { table, column }] => {
                assert_eq!(table, "staff");
                assert_eq!(column.name, "permissions");
                assert_eq!(column.default_value.as_deref(), Some("'[]'"));
            }
            other => panic!("unexpected actions: {:?}", other),
        }
    }

    #[test]
    fn test_matching_schema_has_no_drift() {
        let expected = scenario_schema();
        let actual = live(expected.tables().cloned().collect());
        assert!(DriftDetector::detect(&expected, &actual).is_empty());
    }

    #[test]
    fn test_extras_are_recorded_not_acted_on() {
        let expected = scenario_schema();
        let mut tenants = expected.table("tenants").unwrap().clone();
        tenants.columns.push(ColumnSchema::new("legacy_code", DataType::Text));
        let actual = live(vec![
            tenants,
            expected.table("staff").unwrap().clone(),
            TableSchema::new("audit_trail", vec![]),
        ]);

        let plan = DriftDetector::detect(&expected, &actual);
        assert!(plan.is_empty());
        assert_eq!(plan.extra_tables, vec!["audit_trail".to_string()]);
        assert_eq!(plan.extra_columns["tenants"], vec!["legacy_code".to_string()]);
    }

    #[test]
    fn test_table_names_match_case_insensitively() {
        let expected = scenario_schema();
        let mut staff = expected.table("staff").unwrap().clone();
        staff.name = "Staff".to_string();
        let actual = live(vec![staff, expected.table("tenants").unwrap().clone()]);
        assert!(DriftDetector::detect(&expected, &actual).is_empty());
    }

    #[test]
    fn test_action_log_is_deterministic() {
        let expected = ExpectedSchema::standard();
        let actual = live(vec![TableSchema::new(
            "staff",
            vec![ColumnSchema::new("id", DataType::Integer)],
        )]);
        let first = DriftDetector::detect(&expected, &actual).action_log();
        let second = DriftDetector::detect(&expected, &actual).action_log();
        assert_eq!(first, second);
        assert!(first[0].starts_with("create_table:call_logs"));
    }

    #[test]
    fn test_actions_are_never_destructive() {
        let plan = DriftDetector::detect(&ExpectedSchema::standard(), &SchemaMap::new());
        for action in plan.units.iter().flat_map(|u| &u.actions) {
            // Exhaustive match: a removal variant would fail to compile here
            match action {
                DriftAction::CreateTable { .. } | DriftAction::AddColumn { .. } => {}
            }
        }
    }
}
