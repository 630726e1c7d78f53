//! Server-class backend (PostgreSQL)
//!
//! Connection pooling through deadpool-postgres, with rustls when the target
//! requires TLS.

use super::{Backend, Database, DatabaseErrorCode, DbError, Row, SqlValue, Transaction};
use crate::config::DatabaseConfig;
use crate::error::EngineError;
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Object, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{ToSql, Type};
use tracing::{debug, info, warn};

static NULL_TEXT: Option<String> = None;

/// PostgreSQL pool wrapper
pub struct PostgresDatabase {
    pool: Pool,
}

impl PostgresDatabase {
    /// Build a pool from a postgres:// connection string
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, EngineError> {
        let pg_config = config
            .url
            .parse::<tokio_postgres::Config>()
            .map_err(|e| EngineError::Connection(format!("Failed to parse DATABASE_URL: {}", e)))?;

        let host = match pg_config.get_hosts().first() {
            Some(tokio_postgres::config::Host::Tcp(h)) => h.clone(),
            Some(_) => {
                return Err(EngineError::Connection(
                    "Unix socket connections are not supported".to_string(),
                ))
            }
            None => return Err(EngineError::Connection("No host in DATABASE_URL".to_string())),
        };
        let port = pg_config.get_ports().first().copied().unwrap_or(5432);

        let mut cfg = Config::new();
        cfg.host = Some(host.clone());
        cfg.port = Some(port);
        cfg.user = pg_config.get_user().map(str::to_string);
        cfg.password = pg_config
            .get_password()
            .map(|p| String::from_utf8_lossy(p).to_string());
        cfg.dbname = pg_config.get_dbname().map(str::to_string);
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig::new(config.max_pool_size.max(1)));

        // Managed providers (Neon and friends) refuse plaintext connections
        let use_tls = host.contains("neon.tech") || config.url.contains("sslmode=require");

        let pool = if use_tls {
            let certs = rustls_native_certs::load_native_certs();
            let mut root_store = rustls::RootCertStore::empty();
            for cert in certs.certs {
                root_store.add(cert).ok();
            }

            let tls_config = rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth();

            let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);
            cfg.create_pool(Some(Runtime::Tokio1), tls)
                .map_err(|e| EngineError::Connection(format!("Failed to create TLS pool: {}", e)))?
        } else {
            cfg.create_pool(Some(Runtime::Tokio1), tokio_postgres::NoTls)
                .map_err(|e| EngineError::Connection(format!("Failed to create pool: {}", e)))?
        };

        info!("PostgreSQL pool created for {}:{} (TLS: {})", host, port, use_tls);
        Ok(Self { pool })
    }

    async fn client(&self) -> Result<Object, DbError> {
        self.pool
            .get()
            .await
            .map_err(|e| DbError::connection(format!("Database pool error: {}", e)))
    }
}

#[async_trait]
impl Database for PostgresDatabase {
    fn backend(&self) -> Backend {
        Backend::ServerRelational
    }

    async fn ping(&self) -> Result<(), DbError> {
        let client = self.client().await?;
        client.query_one("SELECT 1 AS ok", &[]).await.map_err(map_pg_error)?;
        Ok(())
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DbError> {
        let client = self.client().await?;
        run_query(&client, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, DbError> {
        let client = self.client().await?;
        run_execute(&client, sql, params).await
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, DbError> {
        let client = self.client().await?;
        client.batch_execute("BEGIN").await.map_err(map_pg_error)?;
        Ok(Box::new(PostgresTransaction { client: Some(client) }))
    }
}

/// Transaction pinned to one pooled connection
pub struct PostgresTransaction {
    client: Option<Object>,
}

impl PostgresTransaction {
    fn client(&self) -> Result<&Object, DbError> {
        self.client
            .as_ref()
            .ok_or_else(|| DbError::other("transaction already finished"))
    }

    async fn finish(mut self: Box<Self>, statement: &str) -> Result<(), DbError> {
        let client = self
            .client
            .take()
            .ok_or_else(|| DbError::other("transaction already finished"))?;
        client.batch_execute(statement).await.map_err(map_pg_error)
    }
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DbError> {
        run_query(self.client()?, sql, params).await
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DbError> {
        run_execute(self.client()?, sql, params).await
    }

    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for PostgresTransaction {
    fn drop(&mut self) {
        // Never hand a connection with an open transaction back to the pool
        if let Some(client) = self.client.take() {
            warn!("Transaction dropped without commit or rollback, rolling back");
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Err(e) = client.batch_execute("ROLLBACK").await {
                        warn!("Rollback of abandoned transaction failed: {}", e);
                    }
                });
            }
        }
    }
}

async fn run_query(client: &Object, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DbError> {
    let refs = to_sql_params(params);
    let rows = client.query(sql, &refs).await.map_err(map_pg_error)?;
    Ok(rows.iter().map(convert_row).collect())
}

async fn run_execute(client: &Object, sql: &str, params: &[SqlValue]) -> Result<u64, DbError> {
    if params.is_empty() {
        // Simple protocol: DDL, savepoints and multi-statement batches
        client.batch_execute(sql).await.map_err(map_pg_error)?;
        return Ok(0);
    }
    let refs = to_sql_params(params);
    client.execute(sql, &refs).await.map_err(map_pg_error)
}

fn to_sql_params(params: &[SqlValue]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|p| match p {
            SqlValue::Null => &NULL_TEXT as &(dyn ToSql + Sync),
            SqlValue::Bool(b) => b as &(dyn ToSql + Sync),
            SqlValue::Int(i) => i as &(dyn ToSql + Sync),
            SqlValue::Float(f) => f as &(dyn ToSql + Sync),
            SqlValue::Text(s) => s as &(dyn ToSql + Sync),
        })
        .collect()
}

fn convert_row(row: &tokio_postgres::Row) -> Row {
    let columns = row.columns().iter().map(|c| c.name().to_string()).collect();
    let values = (0..row.len()).map(|idx| decode(row, idx)).collect();
    Row::new(columns, values)
}

fn decode(row: &tokio_postgres::Row, idx: usize) -> SqlValue {
    let ty = row.columns()[idx].type_();
    let value = if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx).ok().flatten().map(SqlValue::Bool)
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx).ok().flatten().map(|v| SqlValue::Int(v.into()))
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx).ok().flatten().map(|v| SqlValue::Int(v.into()))
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx).ok().flatten().map(SqlValue::Int)
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx).ok().flatten().map(|v| SqlValue::Float(v.into()))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx).ok().flatten().map(SqlValue::Float)
    } else {
        match row.try_get::<_, Option<String>>(idx) {
            Ok(v) => v.map(SqlValue::Text),
            Err(e) => {
                debug!("Column {} of type {} decoded as NULL: {}", idx, ty, e);
                None
            }
        }
    };
    value.unwrap_or(SqlValue::Null)
}

/// Map a driver error onto the structured classification via SQLSTATE
fn map_pg_error(err: tokio_postgres::Error) -> DbError {
    let code = match err.code() {
        Some(state) => classify_sqlstate(state),
        None if err.is_closed() => DatabaseErrorCode::ConnectionFailure,
        None => DatabaseErrorCode::Other,
    };
    let message = err
        .as_db_error()
        .map(|db| db.message().to_string())
        .unwrap_or_else(|| err.to_string());
    DbError::new(code, message)
}

fn classify_sqlstate(state: &SqlState) -> DatabaseErrorCode {
    if *state == SqlState::DUPLICATE_COLUMN {
        DatabaseErrorCode::DuplicateColumn
    } else if *state == SqlState::DUPLICATE_TABLE {
        DatabaseErrorCode::DuplicateTable
    } else if *state == SqlState::UNIQUE_VIOLATION {
        DatabaseErrorCode::UniqueViolation
    } else if *state == SqlState::UNDEFINED_TABLE {
        DatabaseErrorCode::UndefinedTable
    } else if state.code().starts_with("08") {
        DatabaseErrorCode::ConnectionFailure
    } else {
        DatabaseErrorCode::Other
    }
}
