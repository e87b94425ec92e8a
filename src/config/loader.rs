//! Load declarations from a directory of JSON files or from the `_sys_*` payload tables.

use crate::config::{ConfigKind, FullConfig};
use crate::error::ConfigError;
use crate::store::qualified_sys_table;
use serde::de::DeserializeOwned;
use sqlx::PgPool;
use std::path::Path;

/// Read `tables.json`, `relations.json` and `actions.json` from `dir`. Missing files are empty.
pub async fn load_from_dir(dir: &Path) -> Result<FullConfig, ConfigError> {
    Ok(FullConfig {
        tables: load_file(dir, ConfigKind::Tables).await?,
        relations: load_file(dir, ConfigKind::Relations).await?,
        actions: load_file(dir, ConfigKind::Actions).await?,
    })
}

async fn load_file<T: DeserializeOwned>(dir: &Path, kind: ConfigKind) -> Result<Vec<T>, ConfigError> {
    let path = dir.join(kind.file_name());
    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no declarations file");
            return Ok(Vec::new());
        }
        Err(e) => return Err(ConfigError::Load(format!("{}: {}", path.display(), e))),
    };
    let items: Vec<T> =
        serde_json::from_slice(&bytes).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    tracing::info!(path = %path.display(), count = items.len(), "loaded declarations");
    Ok(items)
}

/// Load every declaration kind from `<schema>._sys_*`. Tables must exist (see `store::ensure_sys_tables`).
pub async fn load_from_pool(pool: &PgPool, schema: &str) -> Result<FullConfig, ConfigError> {
    Ok(FullConfig {
        tables: load_config_table(pool, &qualified_sys_table(schema, ConfigKind::Tables.sys_table())).await?,
        relations: load_config_table(pool, &qualified_sys_table(schema, ConfigKind::Relations.sys_table())).await?,
        actions: load_config_table(pool, &qualified_sys_table(schema, ConfigKind::Actions.sys_table())).await?,
    })
}

async fn load_config_table<T>(pool: &PgPool, table: &str) -> Result<Vec<T>, ConfigError>
where
    T: DeserializeOwned,
{
    let sql = format!("SELECT payload FROM {} ORDER BY position, id", table);
    tracing::debug!(sql = %sql, "query");
    let rows = sqlx::query_scalar::<_, serde_json::Value>(&sql)
        .fetch_all(pool)
        .await
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let value: T = serde_json::from_value(row).map_err(|e| ConfigError::Load(format!("{}: {}", table, e)))?;
        out.push(value);
    }
    Ok(out)
}
