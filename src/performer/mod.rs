//! Named native handlers invoked by EXECUTE outcomes.

mod import;
mod random_data;

pub use import::ImportDataPerformer;
pub use random_data::RandomDataPerformer;

use crate::action::{ActionInvocation, ActionResponse, EntityStore};
use crate::compiler::CompiledSchema;
use crate::error::{ConfigError, PerformerError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// What a performer sees of the invocation that reached it.
pub struct PerformerRequest<'a> {
    pub invocation: &'a ActionInvocation,
    /// Execution context at the time of the outcome (`subject`, `user`, inputs, earlier results).
    pub context: &'a Map<String, Value>,
    pub schema: &'a CompiledSchema,
}

impl PerformerRequest<'_> {
    /// `key` from the resolved fields, else from the execution context.
    pub fn lookup<'f>(&'f self, fields: &'f Map<String, Value>, key: &str) -> Option<&'f Value> {
        fields
            .get(key)
            .filter(|v| !v.is_null())
            .or_else(|| self.context.get(key).filter(|v| !v.is_null()))
    }
}

#[async_trait]
pub trait Performer: Send + Sync {
    fn name(&self) -> &str;

    /// Run with the outcome's resolved attributes. Errors do not discard the responses.
    async fn execute(
        &self,
        request: &PerformerRequest<'_>,
        fields: &Map<String, Value>,
    ) -> (Vec<ActionResponse>, Vec<PerformerError>);
}

/// Performers by exact name. Built once at startup and shared by every invocation.
#[derive(Clone, Default)]
pub struct PerformerRegistry {
    performers: HashMap<String, Arc<dyn Performer>>,
}

impl PerformerRegistry {
    pub fn new() -> Self {
        PerformerRegistry::default()
    }

    /// Registry with `generate.random.data` and `__data_import` over `store`.
    pub fn with_builtins(store: Arc<dyn EntityStore>) -> Self {
        let mut registry = PerformerRegistry::new();
        let builtins: [Arc<dyn Performer>; 2] = [
            Arc::new(RandomDataPerformer::new(store.clone())),
            Arc::new(ImportDataPerformer::new(store)),
        ];
        for performer in builtins {
            registry.performers.insert(performer.name().to_string(), performer);
        }
        registry
    }

    pub fn register(&mut self, performer: Arc<dyn Performer>) -> Result<(), ConfigError> {
        let name = performer.name().to_string();
        if self.performers.contains_key(&name) {
            return Err(ConfigError::Duplicate { kind: "performer", name });
        }
        tracing::debug!(performer = %name, "register performer");
        self.performers.insert(name, performer);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Performer>> {
        self.performers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.performers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;

    struct Echo;

    #[async_trait]
    impl Performer for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn execute(
            &self,
            _request: &PerformerRequest<'_>,
            fields: &Map<String, Value>,
        ) -> (Vec<ActionResponse>, Vec<PerformerError>) {
            (vec![ActionResponse::new("echo", Value::Object(fields.clone()))], Vec::new())
        }
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = PerformerRegistry::with_builtins(Arc::new(MemoryStore::default()));
        assert_eq!(registry.names(), vec!["__data_import", "generate.random.data"]);
        registry.register(Arc::new(Echo)).unwrap();
        assert_eq!(
            registry.register(Arc::new(Echo)).unwrap_err(),
            ConfigError::Duplicate {
                kind: "performer",
                name: "echo".into()
            }
        );
        assert!(registry.get("echo").is_some());
        assert!(registry.get("Echo").is_none());
    }
}
