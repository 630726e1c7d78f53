//! Schema Introspection Module
//!
//! Reads the live catalog of a connected database and normalizes it into
//! the shared schema model. No retries happen here; a lost connection is
//! surfaced immediately.

use crate::db::queries::{
    PG_LIST_COLUMNS, PG_LIST_TABLES, SQLITE_LIST_TABLES, SQLITE_TABLE_INFO,
};
use crate::db::{Backend, Database, DbError, Row, SqlValue};
use crate::error::IntrospectionError;
use crate::schema::{ColumnSchema, DataType, SchemaMap, TableSchema};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Engine bookkeeping tables, never part of the application schema
const INTERNAL_TABLES: &[&str] = &["schema_migration_lock"];

/// Schema introspector for both backends
pub struct SchemaIntrospector;

impl SchemaIntrospector {
    /// Introspect every user table and its columns
    pub async fn introspect(db: &dyn Database) -> Result<SchemaMap, IntrospectionError> {
        let backend = db.backend();
        let tables = match backend {
            Backend::ServerRelational => Self::introspect_postgres(db).await?,
            Backend::Embedded => Self::introspect_sqlite(db).await?,
        };

        let schema: SchemaMap = tables
            .into_iter()
            .filter(|t| !INTERNAL_TABLES.contains(&t.name.as_str()))
            .map(|t| (t.name.clone(), t))
            .collect();

        debug!(
            "Introspected {} schema with {} tables, {} columns",
            backend,
            schema.len(),
            schema.values().map(|t| t.columns.len()).sum::<usize>()
        );

        Ok(schema)
    }

    /// Standard catalog views, public schema only
    async fn introspect_postgres(db: &dyn Database) -> Result<Vec<TableSchema>, IntrospectionError> {
        let table_rows = db
            .query(PG_LIST_TABLES, &[])
            .await
            .map_err(|e| catalog_error("information_schema.tables", e))?;
        let column_rows = db
            .query(PG_LIST_COLUMNS, &[])
            .await
            .map_err(|e| catalog_error("information_schema.columns", e))?;

        let mut tables: Vec<TableSchema> = table_rows
            .iter()
            .filter_map(|row| row.get_str("table_name"))
            .map(|name| TableSchema::new(name, Vec::new()))
            .collect();

        for row in &column_rows {
            let Some(table_name) = row.get_str("table_name") else {
                continue;
            };
            // Columns of views are listed too; only keep base tables
            if let Some(table) = tables.iter_mut().find(|t| t.name == table_name) {
                if let Some(column) = column_from_row(Backend::ServerRelational, row) {
                    table.columns.push(column);
                }
            }
        }

        Ok(tables)
    }

    /// Master catalog plus the per-table structure pragma
    async fn introspect_sqlite(db: &dyn Database) -> Result<Vec<TableSchema>, IntrospectionError> {
        let table_rows = db
            .query(SQLITE_LIST_TABLES, &[])
            .await
            .map_err(|e| catalog_error("sqlite_master", e))?;

        let mut tables = Vec::with_capacity(table_rows.len());
        for name in table_rows.iter().filter_map(|row| row.get_str("table_name")) {
            let column_rows = db
                .query(SQLITE_TABLE_INFO, &[SqlValue::from(name)])
                .await
                .map_err(|e| catalog_error(&format!("pragma_table_info({})", name), e))?;

            let columns = column_rows
                .iter()
                .filter_map(|row| column_from_row(Backend::Embedded, row))
                .collect();
            tables.push(TableSchema::new(name, columns));
        }

        Ok(tables)
    }
}

/// Map one catalog row onto a column; both catalog queries alias their
/// fields differently, so look for either spelling
fn column_from_row(backend: Backend, row: &Row) -> Option<ColumnSchema> {
    let (name, raw_type, nullable, default, primary_key) = match backend {
        Backend::ServerRelational => (
            row.get_str("column_name")?,
            row.get_str("data_type").unwrap_or_default(),
            row.get_bool("is_nullable").unwrap_or(true),
            row.get_str("column_default"),
            row.get_bool("is_primary_key").unwrap_or(false),
        ),
        Backend::Embedded => (
            row.get_str("name")?,
            row.get_str("type").unwrap_or_default(),
            !row.get_bool("notnull").unwrap_or(false),
            row.get_str("dflt_value"),
            row.get_i64("pk").unwrap_or(0) > 0,
        ),
    };

    Some(ColumnSchema {
        name: name.to_string(),
        data_type: DataType::from_catalog(backend, raw_type),
        nullable,
        default_value: default.map(normalize_default),
        primary_key,
        unique: false,
    })
}

/// Strip the cast PostgreSQL appends to literal defaults (`'[]'::text`)
pub fn normalize_default(raw: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with('\'') {
        if let Some(idx) = raw.rfind("'::") {
            return raw[..=idx].to_string();
        }
    }
    raw.to_string()
}

fn catalog_error(target: &str, source: DbError) -> IntrospectionError {
    if source.is_connection() {
        IntrospectionError::Connection(source.message)
    } else {
        IntrospectionError::Catalog {
            target: target.to_string(),
            source,
        }
    }
}

/// Stable fingerprint of an introspected schema
pub fn fingerprint(schema: &SchemaMap) -> String {
    let mut hasher = Sha256::new();
    for table in schema.values() {
        let mut columns: Vec<String> = table
            .columns
            .iter()
            .map(|c| format!("{}.{}:{}", table.name, c.name, c.data_type))
            .collect();
        columns.sort();

        hasher.update(table.name.as_bytes());
        for col in &columns {
            hasher.update(col.as_bytes());
        }
    }
    format!("{:x}", hasher.finalize())
}
