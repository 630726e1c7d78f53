//! Database connection management
//!
//! Defines the connection collaborator the engine consumes, the backend
//! capability value threaded through every component, and the structured
//! classification of driver errors.

pub mod lock;
pub mod postgres;
pub mod queries;
pub mod sqlite;

use crate::config::DatabaseConfig;
use crate::error::EngineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Database engine family, resolved once from the connection string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Backend {
    /// Single-file embedded engine (SQLite)
    Embedded,
    /// Client-server engine (PostgreSQL)
    ServerRelational,
}

impl Backend {
    /// Resolve the backend from a connection URL scheme
    pub fn from_url(url: &str) -> Result<Self, EngineError> {
        let scheme = url
            .split_once(':')
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .ok_or_else(|| EngineError::UnsupportedBackend(format!("no scheme in '{}'", redact(url))))?;

        match scheme.as_str() {
            "sqlite" => Ok(Backend::Embedded),
            "postgres" | "postgresql" => Ok(Backend::ServerRelational),
            other => Err(EngineError::UnsupportedBackend(format!(
                "scheme '{}' (expected sqlite: or postgres://)",
                other
            ))),
        }
    }

    /// Positional bind placeholder for parameter `n` (1-based)
    pub fn param(&self, n: usize) -> String {
        match self {
            Backend::Embedded => format!("?{}", n),
            Backend::ServerRelational => format!("${}", n),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Embedded => "sqlite",
            Backend::ServerRelational => "postgresql",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A bind parameter or a decoded result cell
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

/// Backend-neutral result row
#[derive(Debug, Clone, Default)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|idx| self.values.get(idx))
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        match self.get(column) {
            Some(SqlValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        match self.get(column) {
            Some(SqlValue::Int(i)) => Some(*i),
            Some(SqlValue::Bool(b)) => Some(i64::from(*b)),
            Some(SqlValue::Text(s)) => s.parse().ok(),
            _ => None,
        }
    }

    /// Interprets integer flags (`notnull`, `pk`) and `YES`/`NO` strings too
    pub fn get_bool(&self, column: &str) -> Option<bool> {
        match self.get(column) {
            Some(SqlValue::Bool(b)) => Some(*b),
            Some(SqlValue::Int(i)) => Some(*i != 0),
            Some(SqlValue::Text(s)) => match s.to_ascii_uppercase().as_str() {
                "YES" | "TRUE" | "T" | "1" => Some(true),
                "NO" | "FALSE" | "F" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Driver-independent classification of database errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseErrorCode {
    DuplicateColumn,
    DuplicateTable,
    UniqueViolation,
    UndefinedTable,
    ConnectionFailure,
    Other,
}

impl DatabaseErrorCode {
    /// Errors meaning "the object we tried to add is already there"
    pub fn is_already_satisfied(&self) -> bool {
        matches!(self, DatabaseErrorCode::DuplicateColumn | DatabaseErrorCode::DuplicateTable)
    }
}

/// Error raised by a backend implementation
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct DbError {
    pub code: DatabaseErrorCode,
    pub message: String,
}

impl DbError {
    pub fn new(code: DatabaseErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorCode::ConnectionFailure, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorCode::Other, message)
    }

    pub fn is_connection(&self) -> bool {
        self.code == DatabaseErrorCode::ConnectionFailure
    }
}

/// Connection/pool collaborator consumed by every engine component
#[async_trait]
pub trait Database: Send + Sync {
    /// Dialect capability of this connection
    fn backend(&self) -> Backend;

    /// Cheap liveness probe
    async fn ping(&self) -> Result<(), DbError>;

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DbError>;

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, DbError>;

    /// Start a transaction on a dedicated connection
    async fn begin(&self) -> Result<Box<dyn Transaction>, DbError>;
}

/// An open transaction; must end in `commit` or `rollback`
#[async_trait]
pub trait Transaction: Send {
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DbError>;

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DbError>;

    async fn commit(self: Box<Self>) -> Result<(), DbError>;

    async fn rollback(self: Box<Self>) -> Result<(), DbError>;
}

/// Open a pool for the configured backend and verify it answers
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn Database>, EngineError> {
    let db: Arc<dyn Database> = match config.backend {
        Backend::ServerRelational => Arc::new(postgres::PostgresDatabase::connect(config).await?),
        Backend::Embedded => Arc::new(sqlite::SqliteDatabase::connect(config).await?),
    };

    db.ping()
        .await
        .map_err(|e| EngineError::Connection(format!("Failed to verify database connection: {}", e)))?;

    info!("✅ Database connection successful ({})", db.backend());
    Ok(db)
}

/// Strip credentials from a connection string before it reaches a log line
pub fn redact(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("****"));
            parsed.to_string()
        }
        _ => url.to_string(),
    }
}
