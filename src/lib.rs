//! Keystone SDK: configuration-driven backend engine.
//!
//! Declared tables and relations compile into a PostgreSQL schema; declared actions run as
//! ordered outcome chains (CRUD, native performers, client responses) over that schema.

pub mod action;
pub mod case;
pub mod compiler;
pub mod config;
pub mod ddl;
pub mod error;
pub mod expr;
pub mod extractors;
pub mod handlers;
pub mod performer;
pub mod response;
pub mod routes;
pub mod schema;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

#[cfg(test)]
mod testing;

pub use action::{
    ActionInvocation, ActionResponse, AllowAll, CallerIdentity, CancelHandle, CancelSignal, CapabilityChecker,
    EntityStore, OutcomeExecutor, ResponseKind, DEFAULT_SCRIPT_TIMEOUT,
};
pub use compiler::{CompileOptions, CompiledSchema, SchemaCompiler};
pub use config::{load_from_dir, load_from_pool, ConfigKind, EngineSnapshot, FullConfig};
pub use error::{ActionError, ActionFailure, AppError, ConfigError, StoreError};
pub use performer::{Performer, PerformerRegistry};
pub use response::{success_many_ok, success_one_ok};
pub use routes::{action_routes, common_routes, common_routes_with_ready, config_routes};
pub use service::PgEntityStore;
pub use state::AppState;
pub use store::{
    data_schema, ensure_database_exists, ensure_sys_tables, keystone_schema, replace_config_rows, store_config,
    sync_world_rows,
};
