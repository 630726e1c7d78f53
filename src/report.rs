//! Consistency reporting
//!
//! Pure comparison of an introspected snapshot against the expected schema.
//! Safe to call from diagnostics: no I/O happens here.

use crate::introspection::fingerprint;
use crate::schema::{find_table, ExpectedSchema, SchemaMap};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{info, warn};

/// Coverage bucket of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Verdict {
    Excellent,
    Good,
    NeedsAttention,
}

impl Verdict {
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 90.0 {
            Verdict::Excellent
        } else if percentage >= 70.0 {
            Verdict::Good
        } else {
            Verdict::NeedsAttention
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Verdict::Excellent => "excellent / production-ready",
            Verdict::Good => "good / minor gaps",
            Verdict::NeedsAttention => "needs attention",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub expected_tables: usize,
    pub actual_tables: usize,
    pub matching_tables: usize,
    pub missing_tables: BTreeSet<String>,
    /// Only tables that exist; a missing table's columns are implied
    pub missing_columns_by_table: BTreeMap<String, BTreeSet<String>>,
    pub extra_tables: BTreeSet<String>,
    pub expected_columns: usize,
    pub matching_columns: usize,
    pub column_consistency_percentage: f64,
    pub consistency_percentage: f64,
    pub verdict: Verdict,
    pub schema_fingerprint: String,
}

impl ConsistencyReport {
    pub fn is_complete(&self) -> bool {
        self.missing_tables.is_empty() && self.missing_columns_by_table.is_empty()
    }

    pub fn missing_column_count(&self) -> usize {
        self.missing_columns_by_table.values().map(|c| c.len()).sum()
    }

    pub fn log(&self) {
        info!("📊 Schema consistency report");
        info!(
            "   Tables: {}/{} present ({:.1}%), {} in database",
            self.matching_tables, self.expected_tables, self.consistency_percentage, self.actual_tables
        );
        info!(
            "   Columns: {}/{} present ({:.1}%)",
            self.matching_columns, self.expected_columns, self.column_consistency_percentage
        );

        for table in &self.missing_tables {
            warn!("   missing table: {}", table);
        }
        for (table, columns) in &self.missing_columns_by_table {
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            warn!("   missing columns on {}: {}", table, columns.join(", "));
        }
        if !self.extra_tables.is_empty() {
            let extras: Vec<&str> = self.extra_tables.iter().map(String::as_str).collect();
            info!("   extra tables: {}", extras.join(", "));
        }

        match self.verdict {
            Verdict::NeedsAttention => warn!("   Verdict: {}", self.verdict),
            _ => info!("   Verdict: {}", self.verdict),
        }
    }
}

pub struct ConsistencyReporter;

impl ConsistencyReporter {
    pub fn report(expected: &ExpectedSchema, actual: &SchemaMap) -> ConsistencyReport {
        let mut missing_tables = BTreeSet::new();
        let mut missing_columns_by_table = BTreeMap::new();
        let mut matching_tables = 0;
        let mut expected_columns = 0;
        let mut matching_columns = 0;

        for table in expected.tables() {
            expected_columns += table.columns.len();
            let Some(live) = find_table(actual, &table.name) else {
                missing_tables.insert(table.name.clone());
                continue;
            };
            matching_tables += 1;

            let missing: BTreeSet<String> = table
                .columns
                .iter()
                .filter(|c| !live.has_column(&c.name))
                .map(|c| c.name.clone())
                .collect();
            matching_columns += table.columns.len() - missing.len();
            if !missing.is_empty() {
                missing_columns_by_table.insert(table.name.clone(), missing);
            }
        }

        let extra_tables = actual
            .values()
            .filter(|t| expected.table(&t.name).is_none())
            .map(|t| t.name.clone())
            .collect();

        let consistency_percentage = percentage(matching_tables, expected.table_count());

        ConsistencyReport {
            expected_tables: expected.table_count(),
            actual_tables: actual.len(),
            matching_tables,
            missing_tables,
            missing_columns_by_table,
            extra_tables,
            expected_columns,
            matching_columns,
            column_consistency_percentage: percentage(matching_columns, expected_columns),
            consistency_percentage,
            verdict: Verdict::from_percentage(consistency_percentage),
            schema_fingerprint: fingerprint(actual),
        }
    }
}

/// Nothing expected counts as fully consistent
fn percentage(matching: usize, expected: usize) -> f64 {
    if expected == 0 {
        return 100.0;
    }
    (matching as f64 / expected as f64 * 100.0).clamp(0.0, 100.0)
}
