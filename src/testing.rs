//! In-memory collaborators for unit tests.

use crate::action::{CallerIdentity, CapabilityChecker, EntityStore};
use crate::compiler::CompileOptions;
use crate::config::{ActionConfig, EngineSnapshot, FullConfig};
use crate::error::StoreError;
use crate::schema::TableDefinition;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
struct Tables {
    rows: HashMap<String, Vec<Map<String, Value>>>,
    next_id: i64,
    truncated: Vec<String>,
}

/// Rows kept per table name. Tables named in `failing_on` reject every write.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    failing: HashSet<String>,
}

impl MemoryStore {
    pub fn failing_on(mut self, table: &str) -> Self {
        self.failing.insert(table.to_string());
        self
    }

    /// Insert a row directly, bypassing failure simulation.
    pub fn seed(&self, table: &str, row: Value) -> Value {
        let attributes = match row {
            Value::Object(m) => m,
            _ => Map::new(),
        };
        self.insert(table, attributes)
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        let tables = self.tables.lock().unwrap();
        tables
            .rows
            .get(table)
            .map(|rows| rows.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    /// Tables truncated so far, in call order.
    pub fn truncated(&self) -> Vec<String> {
        self.tables.lock().unwrap().truncated.clone()
    }

    fn insert(&self, table: &str, mut attributes: Map<String, Value>) -> Value {
        let mut tables = self.tables.lock().unwrap();
        tables.next_id += 1;
        let id = tables.next_id;
        attributes.insert("id".into(), Value::from(id));
        if !attributes.get("reference_id").is_some_and(Value::is_string) {
            attributes.insert("reference_id".into(), Value::String(uuid::Uuid::new_v4().to_string()));
        }
        tables.rows.entry(table.to_string()).or_default().push(attributes.clone());
        Value::Object(attributes)
    }

    fn check_writable(&self, table: &TableDefinition) -> Result<(), StoreError> {
        if self.failing.contains(&table.table_name) {
            return Err(StoreError::Invalid(format!("writes to {} are rejected", table.table_name)));
        }
        Ok(())
    }

    fn not_found(table: &TableDefinition, reference_id: &str) -> StoreError {
        StoreError::NotFound {
            entity: table.table_name.clone(),
            reference_id: reference_id.to_string(),
        }
    }
}

fn has_reference(row: &Map<String, Value>, reference_id: &str) -> bool {
    row.get("reference_id").and_then(Value::as_str) == Some(reference_id)
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn find_by_reference_id(
        &self,
        table: &TableDefinition,
        reference_id: &str,
    ) -> Result<Option<Value>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .rows
            .get(&table.table_name)
            .and_then(|rows| rows.iter().find(|r| has_reference(r, reference_id)))
            .cloned()
            .map(Value::Object))
    }

    async fn create(&self, table: &TableDefinition, attributes: Map<String, Value>) -> Result<Value, StoreError> {
        self.check_writable(table)?;
        Ok(self.insert(&table.table_name, attributes))
    }

    async fn update(
        &self,
        table: &TableDefinition,
        reference_id: &str,
        attributes: Map<String, Value>,
    ) -> Result<Value, StoreError> {
        self.check_writable(table)?;
        let mut tables = self.tables.lock().unwrap();
        let row = tables
            .rows
            .get_mut(&table.table_name)
            .and_then(|rows| rows.iter_mut().find(|r| has_reference(r, reference_id)))
            .ok_or_else(|| Self::not_found(table, reference_id))?;
        row.extend(attributes);
        Ok(Value::Object(row.clone()))
    }

    async fn delete(&self, table: &TableDefinition, reference_id: &str) -> Result<Value, StoreError> {
        self.check_writable(table)?;
        let mut tables = self.tables.lock().unwrap();
        let rows = tables
            .rows
            .get_mut(&table.table_name)
            .ok_or_else(|| Self::not_found(table, reference_id))?;
        let index = rows
            .iter()
            .position(|r| has_reference(r, reference_id))
            .ok_or_else(|| Self::not_found(table, reference_id))?;
        Ok(Value::Object(rows.remove(index)))
    }

    async fn truncate(&self, table: &TableDefinition) -> Result<u64, StoreError> {
        self.check_writable(table)?;
        let mut tables = self.tables.lock().unwrap();
        tables.truncated.push(table.table_name.clone());
        Ok(tables
            .rows
            .remove(&table.table_name)
            .map(|rows| rows.len() as u64)
            .unwrap_or(0))
    }
}

/// Denies every action.
pub struct DenyAll;

#[async_trait]
impl CapabilityChecker for DenyAll {
    async fn can_execute_action(&self, _caller: &CallerIdentity, _entity_type: &str, _action: &str) -> bool {
        false
    }

    async fn can_execute_row(&self, _caller: &CallerIdentity, _entity_type: &str, _row: &Value) -> bool {
        false
    }
}

/// Snapshot over `tables` and `actions` (JSON list of action declarations), without system
/// declarations or audit tables.
pub fn snapshot(tables: Vec<TableDefinition>, actions: Value) -> EngineSnapshot {
    let actions: Vec<ActionConfig> = serde_json::from_value(actions).unwrap();
    let snapshot = EngineSnapshot::build(
        FullConfig {
            tables,
            relations: Vec::new(),
            actions,
        },
        &CompileOptions {
            system_relations: false,
            audit_tables: false,
        },
    );
    assert!(snapshot.diagnostics.is_empty(), "{:?}", snapshot.diagnostics);
    snapshot
}
