//! Expected schema
//!
//! The declarative "golden" description of every table and column the
//! application needs. Drift is always measured against this model.

use super::{ColumnSchema, DataType, SchemaMap, TableSchema};

/// Required tables and columns
#[derive(Debug, Clone, Default)]
pub struct ExpectedSchema {
    tables: SchemaMap,
}

impl ExpectedSchema {
    pub fn new(tables: Vec<TableSchema>) -> Self {
        let tables = tables
            .into_iter()
            .map(|t| (t.name.to_ascii_lowercase(), t))
            .collect();
        Self { tables }
    }

    /// The schema the hotel voice-assistant application runs against
    pub fn standard() -> Self {
        Self::new(vec![
            tenants(),
            hotel_profiles(),
            staff(),
            call_logs(),
            service_requests(),
        ])
    }

    /// Tables in lexicographic order
    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(&name.to_ascii_lowercase())
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn column_count(&self) -> usize {
        self.tables.values().map(|t| t.columns.len()).sum()
    }
}

fn created_at() -> ColumnSchema {
    ColumnSchema::new("created_at", DataType::Timestamp)
        .not_null()
        .default_value("CURRENT_TIMESTAMP")
}

fn tenants() -> TableSchema {
    TableSchema::new(
        "tenants",
        vec![
            ColumnSchema::new("id", DataType::Text).primary_key(),
            ColumnSchema::new("hotel_name", DataType::Text).not_null(),
            ColumnSchema::new("subscription_plan", DataType::Text)
                .not_null()
                .default_value("'trial'"),
            ColumnSchema::new("status", DataType::Text)
                .not_null()
                .default_value("'active'"),
            ColumnSchema::new("contact_email", DataType::Text),
            created_at(),
            ColumnSchema::new("updated_at", DataType::Timestamp).default_value("CURRENT_TIMESTAMP"),
        ],
    )
}

fn hotel_profiles() -> TableSchema {
    TableSchema::new(
        "hotel_profiles",
        vec![
            ColumnSchema::new("id", DataType::Serial).primary_key(),
            ColumnSchema::new("tenant_id", DataType::Text).not_null().unique(),
            ColumnSchema::new("name", DataType::Text).not_null(),
            ColumnSchema::new("address", DataType::Text),
            ColumnSchema::new("phone", DataType::Text),
            ColumnSchema::new("timezone", DataType::Text)
                .not_null()
                .default_value("'UTC'"),
            ColumnSchema::new("language", DataType::Text)
                .not_null()
                .default_value("'en'"),
            ColumnSchema::new("room_count", DataType::Integer)
                .not_null()
                .default_value("0"),
            created_at(),
        ],
    )
}

fn staff() -> TableSchema {
    TableSchema::new(
        "staff",
        vec![
            ColumnSchema::new("id", DataType::Serial).primary_key(),
            ColumnSchema::new("tenant_id", DataType::Text),
            ColumnSchema::new("username", DataType::Text).not_null().unique(),
            ColumnSchema::new("password", DataType::Text).not_null(),
            ColumnSchema::new("role", DataType::Text)
                .not_null()
                .default_value("'front_desk'"),
            ColumnSchema::new("full_name", DataType::Text),
            ColumnSchema::new("permissions", DataType::Text)
                .not_null()
                .default_value("'[]'"),
            ColumnSchema::new("is_active", DataType::Boolean)
                .not_null()
                .default_value("TRUE"),
            ColumnSchema::new("last_login", DataType::Timestamp),
            created_at(),
        ],
    )
}

fn call_logs() -> TableSchema {
    TableSchema::new(
        "call_logs",
        vec![
            ColumnSchema::new("id", DataType::Serial).primary_key(),
            ColumnSchema::new("tenant_id", DataType::Text).not_null(),
            ColumnSchema::new("room_number", DataType::Text),
            ColumnSchema::new("caller_id", DataType::Text),
            ColumnSchema::new("started_at", DataType::Timestamp)
                .not_null()
                .default_value("CURRENT_TIMESTAMP"),
            ColumnSchema::new("duration_seconds", DataType::Integer)
                .not_null()
                .default_value("0"),
            ColumnSchema::new("intent", DataType::Text),
            ColumnSchema::new("transcript", DataType::Text),
            ColumnSchema::new("status", DataType::Text)
                .not_null()
                .default_value("'completed'"),
        ],
    )
}

fn service_requests() -> TableSchema {
    TableSchema::new(
        "service_requests",
        vec![
            ColumnSchema::new("id", DataType::Serial).primary_key(),
            ColumnSchema::new("tenant_id", DataType::Text).not_null(),
            ColumnSchema::new("call_id", DataType::Integer),
            ColumnSchema::new("room_number", DataType::Text),
            ColumnSchema::new("category", DataType::Text).not_null(),
            ColumnSchema::new("description", DataType::Text),
            ColumnSchema::new("priority", DataType::Text)
                .not_null()
                .default_value("'normal'"),
            ColumnSchema::new("status", DataType::Text)
                .not_null()
                .default_value("'open'"),
            ColumnSchema::new("assigned_to", DataType::Integer),
            created_at(),
            ColumnSchema::new("resolved_at", DataType::Timestamp),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_schema_is_ordered() {
        let schema = ExpectedSchema::standard();
        let names: Vec<&str> = schema.tables().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["call_logs", "hotel_profiles", "service_requests", "staff", "tenants"]
        );
    }

    #[test]
    fn test_staff_permissions_default() {
        let schema = ExpectedSchema::standard();
        let staff = schema.table("staff").unwrap();
        let permissions = staff.column("permissions").unwrap();
        assert_eq!(permissions.default_value.as_deref(), Some("'[]'"));
        assert!(staff.column("username").unwrap().unique);
    }

    #[test]
    fn test_every_table_has_one_primary_key() {
        for table in ExpectedSchema::standard().tables() {
            let keys = table.columns.iter().filter(|c| c.primary_key).count();
            assert_eq!(keys, 1, "table {}", table.name);
        }
    }
}
