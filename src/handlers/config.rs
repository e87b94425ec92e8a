//! Declaration ingestion: POST replaces one kind and reloads, GET lists what is stored.

use crate::config::{validate, ActionConfig, ConfigKind, FullConfig, RelationDeclaration, TableDefinition};
use crate::error::AppError;
use crate::response::{success_many_ok, success_one_ok};
use crate::state::AppState;
use crate::store::{qualified_sys_table, replace_config_rows};
use axum::extract::State;
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

fn typed<T: DeserializeOwned>(kind: ConfigKind, body: &[Value]) -> Result<Vec<T>, AppError> {
    body.iter()
        .map(|v| {
            serde_json::from_value(v.clone())
                .map_err(|e| AppError::BadRequest(format!("invalid {} record: {}", kind.file_name(), e)))
        })
        .collect()
}

/// Reject records that would be skipped at compile time.
fn check_records(kind: ConfigKind, body: &[Value]) -> Result<(), AppError> {
    let mut config = FullConfig::default();
    match kind {
        ConfigKind::Tables => config.tables = typed::<TableDefinition>(kind, body)?,
        ConfigKind::Relations => config.relations = typed::<RelationDeclaration>(kind, body)?,
        ConfigKind::Actions => config.actions = typed::<ActionConfig>(kind, body)?,
    }
    validate(&config)?;
    Ok(())
}

/// Persist one kind; reload when anything changed. Returns rows written.
pub(crate) async fn replace_config(state: &AppState, kind: ConfigKind, body: &[Value]) -> Result<u64, AppError> {
    check_records(kind, body)?;
    let mut tx = state.pool.begin().await?;
    let (count, version) = replace_config_rows(&mut *tx, &state.sys_schema, kind, body).await?;
    tx.commit().await?;
    if count > 0 {
        tracing::info!(kind = %kind.sys_table(), version, "declarations stored, reloading");
        state.reload().await?;
    }
    Ok(count)
}

async fn get_config(state: &AppState, kind: ConfigKind) -> Result<Vec<Value>, AppError> {
    let table = qualified_sys_table(&state.sys_schema, kind.sys_table());
    let rows = sqlx::query_scalar::<_, Value>(&format!("SELECT payload FROM {} ORDER BY position, id", table))
        .fetch_all(&state.pool)
        .await?;
    Ok(rows)
}

macro_rules! config_handler {
    ($method:ident, $kind:expr) => {
        pub async fn $method(
            State(state): State<AppState>,
            Json(body): Json<Vec<Value>>,
        ) -> Result<impl axum::response::IntoResponse, AppError> {
            replace_config(&state, $kind, &body).await?;
            Ok(success_many_ok(body))
        }
    };
}

macro_rules! get_config_handler {
    ($method:ident, $kind:expr) => {
        pub async fn $method(State(state): State<AppState>) -> Result<impl axum::response::IntoResponse, AppError> {
            Ok(success_many_ok(get_config(&state, $kind).await?))
        }
    };
}

config_handler!(post_tables, ConfigKind::Tables);
config_handler!(post_relations, ConfigKind::Relations);
config_handler!(post_actions, ConfigKind::Actions);

get_config_handler!(get_tables, ConfigKind::Tables);
get_config_handler!(get_relations, ConfigKind::Relations);
get_config_handler!(get_actions, ConfigKind::Actions);

#[derive(Serialize)]
pub struct SnapshotSummary {
    pub tables: Vec<String>,
    pub relations: usize,
    pub actions: Vec<String>,
    pub diagnostics: Vec<String>,
}

/// `GET /config/snapshot`: what the running engine compiled, and what it skipped.
pub async fn get_snapshot(State(state): State<AppState>) -> Result<impl axum::response::IntoResponse, AppError> {
    let snapshot = state.snapshot();
    let mut actions: Vec<String> = snapshot.actions.iter().map(|a| a.key()).collect();
    actions.sort();
    Ok(success_one_ok(SnapshotSummary {
        tables: snapshot.schema.tables.iter().map(|t| t.table_name.clone()).collect(),
        relations: snapshot.schema.relations.len(),
        actions,
        diagnostics: snapshot.diagnostics.iter().map(ToString::to_string).collect(),
    }))
}

/// `POST /config/reload`: rebuild from stored declarations.
pub async fn post_reload(State(state): State<AppState>) -> Result<impl axum::response::IntoResponse, AppError> {
    let snapshot = state.reload().await?;
    Ok(success_one_ok(serde_json::json!({
        "tables": snapshot.schema.tables.len(),
        "actions": snapshot.actions.len(),
        "diagnostics": snapshot.diagnostics.len(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn records_are_checked_before_storage() {
        assert!(check_records(ConfigKind::Tables, &[json!({"table_name": "note"})]).is_ok());
        assert!(matches!(
            check_records(ConfigKind::Tables, &[json!({"table_name": "no te"})]),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            check_records(ConfigKind::Actions, &[json!({"on_type": "note"})]),
            Err(AppError::BadRequest(_))
        ));
    }
}
