//! Dialect-specific DDL generation

use crate::db::Backend;
use crate::drift::DriftAction;
use crate::schema::{ColumnSchema, DataType, TableSchema};

/// A generated statement plus any adjustments made to fit the dialect
#[derive(Debug, Clone, PartialEq)]
pub struct Ddl {
    pub sql: String,
    pub notes: Vec<String>,
}

/// Double-quoted identifier; both engines accept this form
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn sql_type(data_type: &DataType, backend: Backend) -> String {
    let name = match (data_type, backend) {
        (DataType::Serial, Backend::ServerRelational) => "SERIAL",
        (DataType::Serial, Backend::Embedded) => "INTEGER",
        (DataType::Integer, _) => "INTEGER",
        (DataType::BigInt, Backend::ServerRelational) => "BIGINT",
        (DataType::BigInt, Backend::Embedded) => "INTEGER",
        (DataType::Real, Backend::ServerRelational) => "DOUBLE PRECISION",
        (DataType::Real, Backend::Embedded) => "REAL",
        (DataType::Boolean, _) => "BOOLEAN",
        (DataType::Text, _) => "TEXT",
        (DataType::Timestamp, Backend::ServerRelational) => "TIMESTAMPTZ",
        (DataType::Timestamp, Backend::Embedded) => "TIMESTAMP",
        (DataType::Json, Backend::ServerRelational) => "JSONB",
        (DataType::Json, Backend::Embedded) => "TEXT",
        (DataType::Other(raw), _) => return raw.clone(),
    };
    name.to_string()
}

/// SQLite refuses `ALTER TABLE ... ADD COLUMN` with a non-constant default
fn is_constant_default(expr: &str) -> bool {
    let upper = expr.trim().to_ascii_uppercase();
    !(upper.starts_with('(') || upper.starts_with("CURRENT_") || upper.contains("()"))
}

/// `CREATE TABLE IF NOT EXISTS` with every expected column
pub fn create_table(table: &TableSchema, backend: Backend) -> Ddl {
    let keys: Vec<&ColumnSchema> = table.columns.iter().filter(|c| c.primary_key).collect();
    let inline_key = keys.len() == 1;

    let mut definitions: Vec<String> = table
        .columns
        .iter()
        .map(|column| {
            let mut def = format!("{} {}", quote_ident(&column.name), sql_type(&column.data_type, backend));
            if column.primary_key && inline_key {
                def.push_str(" PRIMARY KEY");
                if column.data_type == DataType::Serial && backend == Backend::Embedded {
                    def.push_str(" AUTOINCREMENT");
                }
            } else if !column.nullable {
                def.push_str(" NOT NULL");
            }
            if column.unique && !column.primary_key {
                def.push_str(" UNIQUE");
            }
            if let Some(default) = &column.default_value {
                def.push_str(&format!(" DEFAULT {}", default));
            }
            def
        })
        .collect();

    if keys.len() > 1 {
        let cols: Vec<String> = keys.iter().map(|c| quote_ident(&c.name)).collect();
        definitions.push(format!("PRIMARY KEY ({})", cols.join(", ")));
    }

    Ddl {
        sql: format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
            quote_ident(&table.name),
            definitions.join(",\n  ")
        ),
        notes: Vec::new(),
    }
}

/// `ALTER TABLE ... ADD COLUMN`, relaxed where the dialect cannot add the
/// column as declared on a populated table
pub fn add_column(table: &str, column: &ColumnSchema, backend: Backend) -> Ddl {
    let mut notes = Vec::new();
    let mut default = column.default_value.clone();

    if backend == Backend::Embedded {
        if let Some(expr) = default.as_deref() {
            if !is_constant_default(expr) {
                notes.push(format!(
                    "{}.{}: non-constant default {} omitted",
                    table, column.name, expr
                ));
                default = None;
            }
        }
    }

    let mut def = format!("{} {}", quote_ident(&column.name), sql_type(&column.data_type, backend));

    if column.primary_key {
        notes.push(format!(
            "{}.{}: primary key cannot be added to an existing table",
            table, column.name
        ));
    }

    if !column.nullable {
        if default.is_some() {
            def.push_str(" NOT NULL");
        } else {
            notes.push(format!(
                "{}.{}: added as nullable, NOT NULL needs a default for existing rows",
                table, column.name
            ));
        }
    }

    if column.unique {
        match backend {
            Backend::ServerRelational => def.push_str(" UNIQUE"),
            Backend::Embedded => notes.push(format!(
                "{}.{}: UNIQUE cannot be added by ALTER TABLE",
                table, column.name
            )),
        }
    }

    if let Some(expr) = default {
        def.push_str(&format!(" DEFAULT {}", expr));
    }

    Ddl {
        sql: format!("ALTER TABLE {} ADD COLUMN {}", quote_ident(table), def),
        notes,
    }
}

pub fn for_action(action: &DriftAction, backend: Backend) -> Ddl {
    match action {
        DriftAction::CreateTable { table } => create_table(table, backend),
        DriftAction::AddColumn { table, column } => add_column(table, column, backend),
    }
}
