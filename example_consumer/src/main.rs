//! Example consumer: serves a keystone engine over HTTP.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Set `CONFIG_PATH` to a directory with `tables.json`, `relations.json`, `actions.json` to
//! store those declarations at startup.

use keystone_sdk::{
    action_routes, common_routes_with_ready, config_routes, data_schema, ensure_database_exists, ensure_sys_tables,
    keystone_schema, load_from_dir, store_config, AllowAll, AppState, CompileOptions, EngineSnapshot,
    OutcomeExecutor, PerformerRegistry, PgEntityStore,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("keystone_sdk=info")),
        )
        .init();

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/keystone".into());
    ensure_database_exists(&database_url).await?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    let sys_schema = keystone_schema();
    let data_schema = data_schema();
    ensure_sys_tables(&pool, &sys_schema).await?;

    if let Ok(dir) = std::env::var("CONFIG_PATH") {
        let declared = load_from_dir(std::path::Path::new(&dir)).await?;
        let written = store_config(&pool, &sys_schema, &declared).await?;
        tracing::info!(path = %dir, written, "declarations stored from files");
    }

    let store = Arc::new(PgEntityStore::new(pool.clone(), &data_schema));
    let performers = Arc::new(PerformerRegistry::with_builtins(store.clone()));
    let mut executor = OutcomeExecutor::new(store, Arc::new(AllowAll), performers);
    if let Some(ms) = std::env::var("KEYSTONE_SCRIPT_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
    {
        executor = executor.with_script_timeout(Duration::from_millis(ms));
    }

    let state = AppState::new(
        pool,
        &sys_schema,
        &data_schema,
        CompileOptions::default(),
        executor,
        EngineSnapshot::default(),
    );
    state.reload().await?;
    let app = common_routes_with_ready(state.clone())
        .merge(config_routes(state.clone()))
        .merge(action_routes(state));

    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    let port = listener.local_addr()?.port();
    tracing::info!("Example consumer listening on http://127.0.0.1:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}
