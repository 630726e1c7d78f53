//! Embedded backend (SQLite via sqlx)

use super::{Backend, Database, DatabaseErrorCode, DbError, Row, SqlValue, Transaction};
use crate::config::DatabaseConfig;
use crate::error::EngineError;
use async_trait::async_trait;
use sqlx::error::ErrorKind;
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Column, Row as _, Sqlite, SqlitePool, TypeInfo, ValueRef};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// SQLite pool wrapper
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, EngineError> {
        let in_memory = config.url.contains(":memory:");
        let mut connect_opts = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| EngineError::Connection(format!("invalid database url: {e}")))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        if !in_memory {
            connect_opts = connect_opts
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);

            if let Some(parent) = connect_opts.get_filename().parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        EngineError::Connection(format!(
                            "cannot create database directory {}: {e}",
                            parent.display()
                        ))
                    })?;
                }
            }
        }

        // Every connection to :memory: is a separate database, so pin one
        let pool_opts = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(config.max_pool_size.max(1) as u32)
        };

        let pool = pool_opts
            .connect_with(connect_opts)
            .await
            .map_err(|e| EngineError::Connection(format!("db connect failed: {e}")))?;

        info!("SQLite pool opened ({})", if in_memory { "in-memory" } else { "file" });
        Ok(Self { pool })
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    fn backend(&self) -> Backend {
        Backend::Embedded
    }

    async fn ping(&self) -> Result<(), DbError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DbError> {
        let rows = bind_params(sqlx::query(sql), params)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.iter().map(convert_row).collect())
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, DbError> {
        let result = bind_params(sqlx::query(sql), params)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, DbError> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(Box::new(SqliteTransaction { tx }))
    }
}

/// Dropping an uncommitted sqlx transaction rolls it back
pub struct SqliteTransaction {
    tx: sqlx::Transaction<'static, Sqlite>,
}

#[async_trait]
impl Transaction for SqliteTransaction {
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DbError> {
        let rows = bind_params(sqlx::query(sql), params)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.iter().map(convert_row).collect())
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DbError> {
        let result = bind_params(sqlx::query(sql), params)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        self.tx.rollback().await.map_err(map_sqlx_error)
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[SqlValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Text(s) => query.bind(s.clone()),
        };
    }
    query
}

fn convert_row(row: &SqliteRow) -> Row {
    let columns = row.columns().iter().map(|c| c.name().to_string()).collect();
    let values = (0..row.len()).map(|idx| decode(row, idx)).collect();
    Row::new(columns, values)
}

/// Decode by the value's storage class, not the declared column type
fn decode(row: &SqliteRow, idx: usize) -> SqlValue {
    let storage = match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return SqlValue::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return SqlValue::Null,
    };

    let value = match storage.as_str() {
        "INTEGER" => row.try_get_unchecked::<i64, _>(idx).map(SqlValue::Int),
        "REAL" => row.try_get_unchecked::<f64, _>(idx).map(SqlValue::Float),
        "BOOLEAN" => row.try_get_unchecked::<bool, _>(idx).map(SqlValue::Bool),
        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(idx)
            .map(|b| SqlValue::Text(String::from_utf8_lossy(&b).to_string())),
        _ => row.try_get_unchecked::<String, _>(idx).map(SqlValue::Text),
    };
    value.unwrap_or(SqlValue::Null)
}

fn map_sqlx_error(err: sqlx::Error) -> DbError {
    match &err {
        sqlx::Error::Database(db) => {
            let message = db.message().to_string();
            let code = match db.kind() {
                ErrorKind::UniqueViolation => DatabaseErrorCode::UniqueViolation,
                _ => classify_sqlite_message(&message),
            };
            DbError::new(code, message)
        }
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => DbError::connection(err.to_string()),
        _ => DbError::other(err.to_string()),
    }
}

/// SQLite reports these as a bare SQLITE_ERROR, so the text is the only signal
fn classify_sqlite_message(message: &str) -> DatabaseErrorCode {
    let lower = message.to_ascii_lowercase();
    if lower.starts_with("duplicate column name") {
        DatabaseErrorCode::DuplicateColumn
    } else if lower.starts_with("table") && lower.ends_with("already exists") {
        DatabaseErrorCode::DuplicateTable
    } else if lower.starts_with("no such table") {
        DatabaseErrorCode::UndefinedTable
    } else if lower.starts_with("unique constraint failed") {
        DatabaseErrorCode::UniqueViolation
    } else {
        DatabaseErrorCode::Other
    }
}
