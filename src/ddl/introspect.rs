use sqlx::PgPool;
use std::collections::{HashMap, HashSet};

/// What already exists in the target schema.
#[derive(Clone, Debug, Default)]
pub struct LiveSchema {
    pub schema_exists: bool,
    /// table name -> physical column names
    pub tables: HashMap<String, HashSet<String>>,
    pub indexes: HashSet<String>,
    pub constraints: HashSet<String>,
}

impl LiveSchema {
    pub async fn load(pool: &PgPool, schema: &str) -> Result<Self, sqlx::Error> {
        let schema_exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM information_schema.schemata WHERE schema_name = $1)",
        )
        .bind(schema)
        .fetch_one(pool)
        .await?;

        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT table_name::text, column_name::text FROM information_schema.columns WHERE table_schema = $1",
        )
        .bind(schema)
        .fetch_all(pool)
        .await?;
        let mut tables: HashMap<String, HashSet<String>> = HashMap::new();
        for (table, column) in rows {
            tables.entry(table).or_default().insert(column);
        }

        let indexes: Vec<String> = sqlx::query_scalar("SELECT indexname::text FROM pg_indexes WHERE schemaname = $1")
            .bind(schema)
            .fetch_all(pool)
            .await?;
        let constraints: Vec<String> = sqlx::query_scalar(
            "SELECT c.conname::text FROM pg_constraint c JOIN pg_namespace n ON n.oid = c.connamespace WHERE n.nspname = $1",
        )
        .bind(schema)
        .fetch_all(pool)
        .await?;

        tracing::debug!(schema = %schema, tables = tables.len(), "introspected live schema");
        Ok(LiveSchema {
            schema_exists,
            tables,
            indexes: indexes.into_iter().collect(),
            constraints: constraints.into_iter().collect(),
        })
    }

    pub fn columns(&self, table: &str) -> Option<&HashSet<String>> {
        self.tables.get(table)
    }

    pub fn has_index(&self, name: &str) -> bool {
        self.indexes.contains(name)
    }

    pub fn has_constraint(&self, name: &str) -> bool {
        self.constraints.contains(name)
    }
}
