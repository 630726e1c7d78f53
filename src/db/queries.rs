//! SQL query constants and builders
//!
//! Catalog queries used by the introspector and the lock/seed statements
//! that are identical across dialects.

/// List base tables in the public schema (PostgreSQL)
pub const PG_LIST_TABLES: &str = r#"
    SELECT t.table_name::text AS table_name
    FROM information_schema.tables t
    WHERE t.table_schema = 'public'
      AND t.table_type = 'BASE TABLE'
    ORDER BY t.table_name
"#;

/// Get column information for every public table (PostgreSQL)
pub const PG_LIST_COLUMNS: &str = r#"
    SELECT
        c.table_name::text AS table_name,
        c.column_name::text AS column_name,
        c.data_type::text AS data_type,
        c.is_nullable::text AS is_nullable,
        c.column_default::text AS column_default,
        COALESCE(pk.is_pk, false) AS is_primary_key
    FROM information_schema.columns c
    LEFT JOIN (
        SELECT kcu.table_name, kcu.column_name, true AS is_pk
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
        WHERE tc.constraint_type = 'PRIMARY KEY'
            AND tc.table_schema = 'public'
    ) pk ON c.table_name = pk.table_name AND c.column_name = pk.column_name
    WHERE c.table_schema = 'public'
    ORDER BY c.table_name, c.ordinal_position
"#;

/// List user tables from the master catalog (SQLite)
pub const SQLITE_LIST_TABLES: &str = r#"
    SELECT name AS table_name
    FROM sqlite_master
    WHERE type = 'table'
      AND name NOT LIKE 'sqlite_%'
    ORDER BY name
"#;

/// Per-table structure pragma (SQLite); bind the table name
pub const SQLITE_TABLE_INFO: &str = r#"
    SELECT name, type, "notnull", dflt_value, pk
    FROM pragma_table_info(?1)
    ORDER BY cid
"#;

/// Advisory lock table, shared by both dialects
pub const CREATE_LOCK_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS schema_migration_lock (
        id INTEGER PRIMARY KEY,
        holder TEXT NOT NULL,
        acquired_at BIGINT NOT NULL,
        expires_at BIGINT NOT NULL
    )
"#;

/// Row id of the single lease row
pub const LOCK_ROW_ID: i64 = 1;
