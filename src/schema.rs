//! Schema model
//!
//! Backend-neutral table and column descriptions. Both the introspected
//! catalog and the expected schema are expressed in these types so drift
//! detection never needs to know which engine produced them.

pub mod expected;

pub use expected::ExpectedSchema;

use crate::db::Backend;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Tables keyed by name; ordered so iteration is deterministic
pub type SchemaMap = BTreeMap<String, TableSchema>;

/// Normalized column data type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataType {
    /// Auto-incrementing integer key
    Serial,
    Integer,
    BigInt,
    Real,
    Boolean,
    Text,
    Timestamp,
    Json,
    /// Anything the catalog reports that we do not model
    Other(String),
}

impl DataType {
    /// Normalize a catalog type name reported by `backend`
    pub fn from_catalog(backend: Backend, raw: &str) -> Self {
        let upper = raw.trim().to_ascii_uppercase();
        match backend {
            Backend::ServerRelational => match upper.as_str() {
                "INTEGER" | "SMALLINT" => DataType::Integer,
                "BIGINT" => DataType::BigInt,
                "REAL" | "DOUBLE PRECISION" | "NUMERIC" => DataType::Real,
                "BOOLEAN" => DataType::Boolean,
                "TEXT" | "CHARACTER VARYING" | "CHARACTER" => DataType::Text,
                "JSON" | "JSONB" => DataType::Json,
                t if t.starts_with("TIMESTAMP") => DataType::Timestamp,
                _ => DataType::Other(raw.trim().to_string()),
            },
            // Declared types follow SQLite's affinity rules
            Backend::Embedded => {
                if upper == "BIGINT" {
                    DataType::BigInt
                } else if upper.contains("INT") {
                    DataType::Integer
                } else if upper.contains("BOOL") {
                    DataType::Boolean
                } else if upper.contains("TIMESTAMP") || upper.contains("DATETIME") {
                    DataType::Timestamp
                } else if upper.contains("JSON") {
                    DataType::Json
                } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
                    DataType::Text
                } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
                    DataType::Real
                } else {
                    DataType::Other(raw.trim().to_string())
                }
            }
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Serial => f.write_str("serial"),
            DataType::Integer => f.write_str("integer"),
            DataType::BigInt => f.write_str("bigint"),
            DataType::Real => f.write_str("real"),
            DataType::Boolean => f.write_str("boolean"),
            DataType::Text => f.write_str("text"),
            DataType::Timestamp => f.write_str("timestamp"),
            DataType::Json => f.write_str("json"),
            DataType::Other(raw) => f.write_str(raw),
        }
    }
}

/// Column representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    /// Default as a SQL expression, e.g. `'[]'` or `CURRENT_TIMESTAMP`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub unique: bool,
}

impl ColumnSchema {
    /// Nullable column with no default
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            default_value: None,
            primary_key: false,
            unique: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, expr: impl Into<String>) -> Self {
        self.default_value = Some(expr.into());
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Table representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSchema>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Case-insensitive lookup, matching how both engines resolve identifiers
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Case-insensitive table lookup in an introspected schema
pub fn find_table<'a>(schema: &'a SchemaMap, name: &str) -> Option<&'a TableSchema> {
    schema
        .get(name)
        .or_else(|| schema.values().find(|t| t.name.eq_ignore_ascii_case(name)))
}
