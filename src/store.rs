//! `_sys_*` declaration tables with version history, plus the per-table `world` rows.
//! The `_sys_*` tables live in the schema named by `KEYSTONE_SCHEMA` (default `keystone`).

use crate::compiler::CompiledSchema;
use crate::config::{ActionConfig, ConfigKind, FullConfig, RelationDeclaration, TableDefinition};
use crate::ddl::{qualified_table, quoted};
use crate::error::AppError;
use serde_json::Value;
use sqlx::ConnectOptions;
use sqlx::PgPool;
use std::collections::HashMap;
use std::str::FromStr;

pub const DEFAULT_SYS_SCHEMA: &str = "keystone";
pub const DEFAULT_DATA_SCHEMA: &str = "public";

const CONFIG_KINDS: [ConfigKind; 3] = [ConfigKind::Tables, ConfigKind::Relations, ConfigKind::Actions];

/// Schema for `_sys_*` tables, from `KEYSTONE_SCHEMA`.
pub fn keystone_schema() -> String {
    std::env::var("KEYSTONE_SCHEMA").unwrap_or_else(|_| DEFAULT_SYS_SCHEMA.into())
}

/// Schema for declared entity tables, from `KEYSTONE_DATA_SCHEMA`.
pub fn data_schema() -> String {
    std::env::var("KEYSTONE_DATA_SCHEMA").unwrap_or_else(|_| DEFAULT_DATA_SCHEMA.into())
}

pub fn qualified_sys_table(schema: &str, table: &str) -> String {
    qualified_table(schema, table)
}

/// Create the schema and each `_sys_*` table with its `_history` twin.
pub async fn ensure_sys_tables(pool: &PgPool, schema: &str) -> Result<(), AppError> {
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(schema)))
        .execute(pool)
        .await?;

    for kind in CONFIG_KINDS {
        let q_table = qualified_sys_table(schema, kind.sys_table());
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                position INTEGER NOT NULL DEFAULT 0,
                payload JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                version BIGINT NOT NULL DEFAULT 1
            )
            "#,
            q_table
        );
        sqlx::query(&ddl).execute(pool).await?;

        let history_table = qualified_sys_table(schema, &format!("{}_history", kind.sys_table()));
        let history_ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id TEXT NOT NULL,
                position INTEGER NOT NULL DEFAULT 0,
                payload JSONB NOT NULL,
                version BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (id, version)
            )
            "#,
            history_table
        );
        sqlx::query(&history_ddl).execute(pool).await?;
    }
    tracing::debug!(schema = %schema, "sys tables ready");
    Ok(())
}

/// Storage id of one declaration: table name, relation hash, or `<on_type>:<name>`.
pub fn config_record_id(kind: ConfigKind, record: &Value) -> Result<String, AppError> {
    let invalid = |e: serde_json::Error| AppError::BadRequest(format!("invalid {} record: {}", kind.file_name(), e));
    Ok(match kind {
        ConfigKind::Tables => serde_json::from_value::<TableDefinition>(record.clone())
            .map_err(invalid)?
            .table_name,
        ConfigKind::Relations => serde_json::from_value::<RelationDeclaration>(record.clone())
            .map_err(invalid)?
            .hash(),
        ConfigKind::Actions => serde_json::from_value::<ActionConfig>(record.clone())
            .map_err(invalid)?
            .key(),
    })
}

/// True when `records` hold exactly the stored payloads, in the same order.
fn config_payloads_unchanged(
    kind: ConfigKind,
    current: &HashMap<String, (i32, Value)>,
    records: &[Value],
) -> Result<bool, AppError> {
    if current.len() != records.len() {
        return Ok(false);
    }
    for (position, record) in records.iter().enumerate() {
        let id = config_record_id(kind, record)?;
        match current.get(&id) {
            Some((p, existing)) if *p as usize == position && existing == record => {}
            _ => return Ok(false),
        }
    }
    Ok(true)
}

/// Replace every row of one declaration kind: current rows go to history, new rows get the next version.
/// Identical input writes nothing. Returns (rows inserted, version). Run inside a transaction.
pub async fn replace_config_rows(
    tx: &mut sqlx::PgConnection,
    schema: &str,
    kind: ConfigKind,
    records: &[Value],
) -> Result<(u64, i64), AppError> {
    let q_table = qualified_sys_table(schema, kind.sys_table());
    let current_version: (Option<i64>,) = sqlx::query_as(&format!("SELECT MAX(version) FROM {}", q_table))
        .fetch_one(&mut *tx)
        .await?;
    let current_version = current_version.0.unwrap_or(0);

    let rows: Vec<(String, i32, Value)> = sqlx::query_as(&format!("SELECT id, position, payload FROM {}", q_table))
        .fetch_all(&mut *tx)
        .await?;
    let current: HashMap<String, (i32, Value)> = rows.into_iter().map(|(id, p, v)| (id, (p, v))).collect();

    if config_payloads_unchanged(kind, &current, records)? {
        tracing::debug!(table = %kind.sys_table(), "declarations unchanged");
        return Ok((0, current_version));
    }

    let history_table = qualified_sys_table(schema, &format!("{}_history", kind.sys_table()));
    let new_version = current_version + 1;

    sqlx::query(&format!(
        "INSERT INTO {} (id, position, payload, version, created_at) SELECT id, position, payload, version, updated_at FROM {}",
        history_table, q_table
    ))
    .execute(&mut *tx)
    .await?;
    sqlx::query(&format!("DELETE FROM {}", q_table)).execute(&mut *tx).await?;

    let mut count = 0u64;
    for (position, record) in records.iter().enumerate() {
        let id = config_record_id(kind, record)?;
        sqlx::query(&format!(
            "INSERT INTO {} (id, position, payload, updated_at, version) VALUES ($1, $2, $3, NOW(), $4)",
            q_table
        ))
        .bind(&id)
        .bind(position as i32)
        .bind(record)
        .bind(new_version)
        .execute(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::BadRequest(format!("duplicate declaration '{}'", id))
            }
            _ => AppError::Db(e),
        })?;
        count += 1;
    }
    tracing::info!(table = %kind.sys_table(), count, version = new_version, "declarations replaced");
    Ok((count, new_version))
}

/// Store every kind of `config` in one transaction. Returns rows written across kinds.
pub async fn store_config(pool: &PgPool, schema: &str, config: &FullConfig) -> Result<u64, AppError> {
    let encode = |e: serde_json::Error| AppError::Internal(format!("encode declarations: {}", e));
    let mut tx = pool.begin().await?;
    let mut written = 0;
    for kind in CONFIG_KINDS {
        let records = match kind {
            ConfigKind::Tables => serde_json::to_value(&config.tables),
            ConfigKind::Relations => serde_json::to_value(&config.relations),
            ConfigKind::Actions => serde_json::to_value(&config.actions),
        }
        .map_err(encode)?;
        let records = match records {
            Value::Array(items) => items,
            _ => Vec::new(),
        };
        let (count, _) = replace_config_rows(&mut *tx, schema, kind, &records).await?;
        written += count;
    }
    tx.commit().await?;
    Ok(written)
}

/// Insert a `world` row for every non-audit table that has none. Returns rows inserted.
pub async fn sync_world_rows(pool: &PgPool, schema: &str, compiled: &CompiledSchema) -> Result<u64, sqlx::Error> {
    let Some(world) = compiled.table("world").filter(|w| w.has_column("table_name")) else {
        return Ok(0);
    };
    let q_world = qualified_table(schema, &world.table_name);
    let sql = format!(
        "INSERT INTO {} (table_name, reference_id, permission) SELECT $1, $2, $3 \
         WHERE NOT EXISTS (SELECT 1 FROM {} WHERE table_name = $1)",
        q_world, q_world
    );
    let mut inserted = 0;
    for table in compiled.tables.iter().filter(|t| !t.is_audit_table()) {
        let done = sqlx::query(&sql)
            .bind(&table.table_name)
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(table.default_permission)
            .execute(pool)
            .await?;
        inserted += done.rows_affected();
    }
    if inserted > 0 {
        tracing::info!(inserted, "world rows added");
    }
    Ok(inserted)
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE. Call before creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::BadRequest(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", quoted(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| AppError::BadRequest("DATABASE_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres", base), db_name.to_string()))
}
