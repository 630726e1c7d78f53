//! Error handling module
//!
//! Provides the error taxonomy shared by every stage of the reconciliation run.
//! Unit-scoped migration failures are deliberately absent here: they never
//! escape the executor and are reported as data instead.

use crate::db::DbError;
use std::time::Duration;
use thiserror::Error;

/// Run-level error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),

    #[error("Introspection error: {0}")]
    Introspection(#[from] IntrospectionError),

    #[error("Configuration validation failed: {}", .0.join("; "))]
    ConfigValidation(Vec<String>),

    #[error("Seed error: {0}")]
    Seed(#[from] SeedError),

    #[error("Migration lock error: {0}")]
    Lock(String),

    #[error("Migration phase timed out after {0:?}")]
    Timeout(Duration),

    #[error("Report error: {0}")]
    Report(String),
}

/// Failures while reading the live catalog
#[derive(Error, Debug)]
pub enum IntrospectionError {
    #[error("Lost database connection during introspection: {0}")]
    Connection(String),

    #[error("Catalog query failed for {target}: {source}")]
    Catalog {
        target: String,
        #[source]
        source: DbError,
    },
}

impl IntrospectionError {
    /// Whether the failure means the connection itself is gone
    pub fn is_connection(&self) -> bool {
        matches!(self, IntrospectionError::Connection(_))
    }
}

/// Failures while ensuring baseline records
#[derive(Error, Debug)]
pub enum SeedError {
    #[error("Database error while seeding: {0}")]
    Database(#[from] DbError),

    #[error("Failed to hash password for {username}: {message}")]
    Hash { username: String, message: String },

    #[error("Password verification failed for {0} after insert")]
    VerificationFailed(String),

    #[error("Duplicate seed username: {0}")]
    DuplicateUsername(String),
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        EngineError::Connection(err.to_string())
    }
}
