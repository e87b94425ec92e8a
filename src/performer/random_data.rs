use super::{Performer, PerformerRequest};
use crate::action::{ActionResponse, EntityStore};
use crate::error::PerformerError;
use crate::schema::{fake_value, is_standard_column, TableDefinition};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

/// `generate.random.data`: insert `count` rows of fake data into a table.
/// The table is `table_name` from the fields, else the subject's `table_name`.
pub struct RandomDataPerformer {
    store: Arc<dyn EntityStore>,
}

impl RandomDataPerformer {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        RandomDataPerformer { store }
    }
}

fn count_of(value: Option<&Value>) -> Result<u64, PerformerError> {
    let invalid = |reason: &str| PerformerError::InvalidField {
        field: "count".into(),
        reason: reason.into(),
    };
    match value {
        None => Err(PerformerError::MissingField("count".into())),
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                    .map(|f| f as u64)
            })
            .ok_or_else(|| invalid("must be a non-negative whole number")),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| invalid("must be a non-negative whole number")),
        Some(_) => Err(invalid("must be a number")),
    }
}

/// Fake values for every declared column; foreign keys and standard columns are left to defaults.
fn fake_row(table: &TableDefinition) -> Map<String, Value> {
    let mut rng = rand::thread_rng();
    table
        .columns
        .iter()
        .filter(|c| !c.is_foreign_key() && !is_standard_column(c.physical_name()))
        .map(|c| (c.physical_name().to_string(), fake_value(&c.column_type, &mut rng)))
        .collect()
}

#[async_trait]
impl Performer for RandomDataPerformer {
    fn name(&self) -> &str {
        "generate.random.data"
    }

    async fn execute(
        &self,
        request: &PerformerRequest<'_>,
        fields: &Map<String, Value>,
    ) -> (Vec<ActionResponse>, Vec<PerformerError>) {
        let count = match count_of(request.lookup(fields, "count")) {
            Ok(n) => n,
            Err(e) => return (Vec::new(), vec![e]),
        };
        let table_name = fields
            .get("table_name")
            .and_then(Value::as_str)
            .or_else(|| {
                request
                    .lookup(fields, "subject")
                    .and_then(|s| s.get("table_name"))
                    .and_then(Value::as_str)
            });
        let Some(table_name) = table_name else {
            return (Vec::new(), vec![PerformerError::MissingField("table_name".into())]);
        };
        let Some(table) = request.schema.table(table_name) else {
            return (
                Vec::new(),
                vec![PerformerError::InvalidField {
                    field: "table_name".into(),
                    reason: format!("unknown table {}", table_name),
                }],
            );
        };

        // One row in memory at a time; the first failed insert ends the run.
        let mut errors = Vec::new();
        let mut created = 0u64;
        for _ in 0..count {
            let row = fake_row(table);
            if let Err(e) = self.store.create(table, row).await {
                tracing::error!(table = %table.table_name, error = %e, created, "failed to insert fake row");
                errors.push(PerformerError::from(e));
                break;
            }
            created += 1;
        }
        tracing::info!(table = %table.table_name, created, "generated random rows");
        let responses = vec![ActionResponse::success(&format!(
            "Generated {} rows in {}",
            created, table.table_name
        ))];
        (responses, errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionInvocation, CallerIdentity};
    use crate::compiler::CompiledSchema;
    use crate::schema::ColumnDefinition;
    use crate::testing::MemoryStore;
    use serde_json::json;

    #[test]
    fn count_must_be_a_whole_number() {
        assert_eq!(count_of(Some(&json!(3))).unwrap(), 3);
        assert_eq!(count_of(Some(&json!(4.0))).unwrap(), 4);
        assert_eq!(count_of(Some(&json!(" 7 "))).unwrap(), 7);
        assert!(matches!(count_of(Some(&json!(2.7))), Err(PerformerError::InvalidField { .. })));
        assert!(matches!(count_of(Some(&json!("2.7"))), Err(PerformerError::InvalidField { .. })));
        assert!(matches!(count_of(Some(&json!(-1))), Err(PerformerError::InvalidField { .. })));
        assert!(matches!(count_of(None), Err(PerformerError::MissingField(_))));
    }

    fn schema() -> CompiledSchema {
        CompiledSchema {
            tables: vec![
                TableDefinition::new("note").with_columns(vec![ColumnDefinition::new("title", "label")]),
                TableDefinition::new("broken").with_columns(vec![ColumnDefinition::new("title", "label")]),
            ],
            relations: Vec::new(),
        }
    }

    async fn run(store: Arc<MemoryStore>, fields: Value) -> (Vec<ActionResponse>, Vec<PerformerError>) {
        let schema = schema();
        let invocation = ActionInvocation::new("world", "generate_random_data", CallerIdentity::guest());
        let context = Map::new();
        let request = PerformerRequest {
            invocation: &invocation,
            context: &context,
            schema: &schema,
        };
        let fields = match fields {
            Value::Object(m) => m,
            _ => Map::new(),
        };
        RandomDataPerformer::new(store).execute(&request, &fields).await
    }

    #[tokio::test]
    async fn fractional_count_inserts_nothing() {
        let store = Arc::new(MemoryStore::default());
        let (responses, errors) = run(store.clone(), json!({"count": 2.7, "table_name": "note"})).await;
        assert!(responses.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(store.rows("note").is_empty());
    }

    #[tokio::test]
    async fn first_failed_insert_stops_the_run() {
        let store = Arc::new(MemoryStore::default().failing_on("broken"));
        let (_, errors) = run(store.clone(), json!({"count": 1000, "table_name": "broken"})).await;
        assert_eq!(errors.len(), 1);

        let (responses, errors) = run(store.clone(), json!({"count": 3, "table_name": "note"})).await;
        assert!(errors.is_empty());
        assert_eq!(responses.len(), 1);
        assert_eq!(store.rows("note").len(), 3);
    }
}
