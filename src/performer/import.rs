use super::{Performer, PerformerRequest};
use crate::action::{ActionResponse, EntityStore};
use crate::error::PerformerError;
use async_trait::async_trait;
use base64::Engine;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// `__data_import`: load `{ "<table>": [rows] }` dumps given as base64 data URLs in `dump_file`.
pub struct ImportDataPerformer {
    store: Arc<dyn EntityStore>,
}

impl ImportDataPerformer {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        ImportDataPerformer { store }
    }
}

/// Decode `data:<mime>;base64,<payload>` (or a bare payload) into a JSON document.
fn decode_dump(file: &Value) -> Result<(String, Map<String, Value>), PerformerError> {
    let name = file.get("name").and_then(Value::as_str).unwrap_or("dump").to_string();
    let invalid = |reason: String| PerformerError::InvalidField {
        field: "dump_file".into(),
        reason: format!("{}: {}", name, reason),
    };
    let contents = file
        .get("file")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("no file contents".into()))?;
    let payload = contents.split_once(',').map(|(_, p)| p).unwrap_or(contents);
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| invalid(e.to_string()))?;
    match serde_json::from_slice::<Value>(&bytes).map_err(|e| invalid(e.to_string()))? {
        Value::Object(map) => Ok((name.clone(), map)),
        _ => Err(invalid("expected an object of table name to rows".into())),
    }
}

#[async_trait]
impl Performer for ImportDataPerformer {
    fn name(&self) -> &str {
        "__data_import"
    }

    async fn execute(
        &self,
        request: &PerformerRequest<'_>,
        fields: &Map<String, Value>,
    ) -> (Vec<ActionResponse>, Vec<PerformerError>) {
        let mut errors = Vec::new();
        let files = match request.lookup(fields, "dump_file") {
            Some(Value::Array(files)) => files.clone(),
            Some(file @ Value::Object(_)) => vec![file.clone()],
            _ => return (Vec::new(), vec![PerformerError::MissingField("dump_file".into())]),
        };
        let truncate = request
            .lookup(fields, "truncate_before_insert")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let only_table = request
            .lookup(fields, "subject")
            .and_then(|s| s.get("table_name"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let user_id = request.lookup(fields, "user").and_then(|u| u.get("id")).cloned();

        let mut imports: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        for file in &files {
            let (name, document) = match decode_dump(file) {
                Ok(d) => d,
                Err(e) => {
                    tracing::error!(error = %e, "skipping dump file");
                    errors.push(e);
                    continue;
                }
            };
            tracing::info!(file = %name, "processing dump file");
            for (table, rows) in document {
                if only_table.as_deref().map(|t| t != table).unwrap_or(false) {
                    continue;
                }
                match rows {
                    Value::Array(rows) => imports.entry(table).or_default().extend(rows),
                    _ => errors.push(PerformerError::InvalidField {
                        field: table,
                        reason: "rows must be a list".into(),
                    }),
                }
            }
        }

        let mut imported = 0usize;
        for (table_name, rows) in imports {
            let Some(table) = request.schema.table(&table_name) else {
                errors.push(PerformerError::InvalidField {
                    field: table_name,
                    reason: "unknown table".into(),
                });
                continue;
            };
            if truncate {
                if let Err(e) = self.store.truncate(table).await {
                    tracing::error!(table = %table_name, error = %e, "failed to truncate before import");
                    errors.push(e.into());
                }
            }
            let stamp_user = table.has_column("user_id");
            for row in rows {
                let Value::Object(mut row) = row else {
                    errors.push(PerformerError::InvalidField {
                        field: table_name.clone(),
                        reason: "row must be an object".into(),
                    });
                    continue;
                };
                if let (true, Some(id)) = (stamp_user, &user_id) {
                    row.insert("user_id".into(), id.clone());
                }
                match self.store.create(table, row).await {
                    Ok(_) => imported += 1,
                    Err(e) => {
                        tracing::error!(table = %table_name, error = %e, "failed to import row");
                        errors.push(e.into());
                    }
                }
            }
        }
        (vec![ActionResponse::success(&format!("Imported {} rows", imported))], errors)
    }
}
