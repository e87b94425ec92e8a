//! Shared application state. The engine snapshot is swapped whole on reload.

use crate::action::OutcomeExecutor;
use crate::compiler::CompileOptions;
use crate::config::{load_from_pool, EngineSnapshot};
use crate::ddl;
use crate::error::AppError;
use crate::store::sync_world_rows;
use sqlx::PgPool;
use std::sync::{Arc, RwLock};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    /// Schema holding the `_sys_*` declaration tables.
    pub sys_schema: String,
    /// Schema holding the compiled entity tables.
    pub data_schema: String,
    pub options: CompileOptions,
    pub executor: Arc<OutcomeExecutor>,
    snapshot: Arc<RwLock<Arc<EngineSnapshot>>>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        sys_schema: &str,
        data_schema: &str,
        options: CompileOptions,
        executor: OutcomeExecutor,
        snapshot: EngineSnapshot,
    ) -> Self {
        AppState {
            pool,
            sys_schema: sys_schema.to_string(),
            data_schema: data_schema.to_string(),
            options,
            executor: Arc::new(executor),
            snapshot: Arc::new(RwLock::new(Arc::new(snapshot))),
        }
    }

    /// Current snapshot. Invocations keep the one they started with across a reload.
    pub fn snapshot(&self) -> Arc<EngineSnapshot> {
        match self.snapshot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn swap(&self, next: EngineSnapshot) {
        let next = Arc::new(next);
        match self.snapshot.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Rebuild from the `_sys_*` tables, bring the database up to the new schema, then swap.
    /// A failure leaves the current snapshot in place.
    pub async fn reload(&self) -> Result<Arc<EngineSnapshot>, AppError> {
        let config = load_from_pool(&self.pool, &self.sys_schema).await?;
        let next = EngineSnapshot::build(config, &self.options);
        let applied = ddl::sync(&self.pool, &self.data_schema, &next.schema).await?;
        sync_world_rows(&self.pool, &self.data_schema, &next.schema).await?;
        tracing::info!(statements = applied, actions = next.actions.len(), "configuration reloaded");
        self.swap(next);
        Ok(self.snapshot())
    }
}
