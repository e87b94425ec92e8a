//! Entity rows in PostgreSQL, addressed by `reference_id`.

use crate::action::EntityStore;
use crate::error::StoreError;
use crate::schema::TableDefinition;
use crate::sql::{delete, delete_all, insert, select_by_reference, text_param, update, QueryBuf};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::PgPool;

#[derive(Clone)]
pub struct PgEntityStore {
    pool: PgPool,
    schema: String,
}

impl PgEntityStore {
    /// Store over the entity tables in `schema`.
    pub fn new(pool: PgPool, schema: &str) -> Self {
        PgEntityStore {
            pool,
            schema: schema.to_string(),
        }
    }

    async fn fetch_row(&self, q: &QueryBuf) -> Result<Option<Value>, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query_scalar::<_, Value>(&q.sql);
        for p in &q.params {
            query = query.bind(text_param(p));
        }
        Ok(query.fetch_optional(&self.pool).await?)
    }

    fn not_found(table: &TableDefinition, reference_id: &str) -> StoreError {
        StoreError::NotFound {
            entity: table.table_name.clone(),
            reference_id: reference_id.to_string(),
        }
    }
}

#[async_trait]
impl EntityStore for PgEntityStore {
    async fn find_by_reference_id(
        &self,
        table: &TableDefinition,
        reference_id: &str,
    ) -> Result<Option<Value>, StoreError> {
        self.fetch_row(&select_by_reference(&self.schema, table, reference_id)).await
    }

    async fn create(&self, table: &TableDefinition, mut attributes: Map<String, Value>) -> Result<Value, StoreError> {
        let has_reference = attributes
            .get("reference_id")
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty());
        if !has_reference {
            attributes.insert("reference_id".into(), Value::String(uuid::Uuid::new_v4().to_string()));
        }
        if table.has_column("permission") && attributes.get("permission").map_or(true, Value::is_null) {
            attributes.insert("permission".into(), Value::from(table.default_permission));
        }
        self.fetch_row(&insert(&self.schema, table, &attributes))
            .await?
            .ok_or_else(|| StoreError::Invalid(format!("insert into {} returned no row", table.table_name)))
    }

    async fn update(
        &self,
        table: &TableDefinition,
        reference_id: &str,
        attributes: Map<String, Value>,
    ) -> Result<Value, StoreError> {
        self.fetch_row(&update(&self.schema, table, reference_id, &attributes))
            .await?
            .ok_or_else(|| Self::not_found(table, reference_id))
    }

    async fn delete(&self, table: &TableDefinition, reference_id: &str) -> Result<Value, StoreError> {
        self.fetch_row(&delete(&self.schema, table, reference_id))
            .await?
            .ok_or_else(|| Self::not_found(table, reference_id))
    }

    async fn truncate(&self, table: &TableDefinition) -> Result<u64, StoreError> {
        let q = delete_all(&self.schema, table);
        tracing::debug!(sql = %q.sql, "query");
        let done = sqlx::query(&q.sql).execute(&self.pool).await?;
        Ok(done.rows_affected())
    }
}
