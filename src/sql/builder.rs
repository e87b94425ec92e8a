//! Parameterized row statements over a compiled table. Rows come back as one `jsonb` value each.

use crate::ddl::{qualified_table, quoted};
use crate::schema::column_types::physical_type;
use crate::schema::{ColumnDefinition, TableDefinition};
use serde_json::{Map, Value};

/// Alias every statement gives its table, so `to_jsonb(t)` returns the whole row.
const ROW_ALIAS: &str = "t";

#[derive(Debug, PartialEq)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> u32 {
        self.params.push(v);
        self.params.len() as u32
    }
}

/// Columns the engine maintains itself.
fn is_managed(column: &str) -> bool {
    matches!(column, "id" | "version" | "created_at" | "updated_at")
}

/// Type a text parameter is cast to for `column`. Serial types cast to their integer base.
fn cast_type(column: &ColumnDefinition) -> String {
    let physical = physical_type(&column.column_type, &column.data_type).to_ascii_lowercase();
    match physical.as_str() {
        "bigserial" => "bigint".into(),
        "serial" => "integer".into(),
        "smallserial" => "smallint".into(),
        _ => physical,
    }
}

/// Declared, writable columns present in `attributes`, in table order.
fn writable<'a>(table: &'a TableDefinition, attributes: &'a Map<String, Value>) -> Vec<(&'a ColumnDefinition, &'a Value)> {
    for key in attributes.keys() {
        if !table.has_column(key) {
            tracing::debug!(table = %table.table_name, column = %key, "ignoring unknown attribute");
        }
    }
    table
        .columns
        .iter()
        .filter(|c| !is_managed(c.physical_name()))
        .filter_map(|c| attributes.get(c.physical_name()).map(|v| (c, v)))
        .collect()
}

fn placeholder(q: &mut QueryBuf, column: &ColumnDefinition, value: &Value) -> String {
    let n = q.push_param(value.clone());
    format!("${}::{}", n, cast_type(column))
}

pub fn select_by_reference(schema: &str, table: &TableDefinition, reference_id: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(Value::String(reference_id.to_string()));
    q.sql = format!(
        "SELECT to_jsonb({a}) FROM {} {a} WHERE {a}.{} = ${}",
        qualified_table(schema, &table.table_name),
        quoted("reference_id"),
        n,
        a = ROW_ALIAS
    );
    q
}

/// INSERT of every writable attribute. Callers supply `reference_id`.
pub fn insert(schema: &str, table: &TableDefinition, attributes: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut columns = Vec::new();
    let mut values = Vec::new();
    for (column, value) in writable(table, attributes) {
        columns.push(quoted(column.physical_name()));
        values.push(placeholder(&mut q, column, value));
    }
    let target = qualified_table(schema, &table.table_name);
    q.sql = if columns.is_empty() {
        format!("INSERT INTO {} AS {a} DEFAULT VALUES RETURNING to_jsonb({a})", target, a = ROW_ALIAS)
    } else {
        format!(
            "INSERT INTO {} AS {a} ({}) VALUES ({}) RETURNING to_jsonb({a})",
            target,
            columns.join(", "),
            values.join(", "),
            a = ROW_ALIAS
        )
    };
    q
}

/// UPDATE by reference id; bumps `version` and stamps `updated_at`. `reference_id` itself is not rewritten.
pub fn update(schema: &str, table: &TableDefinition, reference_id: &str, attributes: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for (column, value) in writable(table, attributes) {
        if column.physical_name() == "reference_id" {
            continue;
        }
        let ph = placeholder(&mut q, column, value);
        sets.push(format!("{} = {}", quoted(column.physical_name()), ph));
    }
    if table.has_column("version") {
        sets.push(format!("{v} = {a}.{v} + 1", v = quoted("version"), a = ROW_ALIAS));
    }
    if table.has_column("updated_at") {
        sets.push(format!("{} = current_timestamp", quoted("updated_at")));
    }
    let n = q.push_param(Value::String(reference_id.to_string()));
    q.sql = format!(
        "UPDATE {} AS {a} SET {} WHERE {a}.{} = ${} RETURNING to_jsonb({a})",
        qualified_table(schema, &table.table_name),
        sets.join(", "),
        quoted("reference_id"),
        n,
        a = ROW_ALIAS
    );
    q
}

pub fn delete(schema: &str, table: &TableDefinition, reference_id: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(Value::String(reference_id.to_string()));
    q.sql = format!(
        "DELETE FROM {} AS {a} WHERE {a}.{} = ${} RETURNING to_jsonb({a})",
        qualified_table(schema, &table.table_name),
        quoted("reference_id"),
        n,
        a = ROW_ALIAS
    );
    q
}

/// DELETE of every row; unlike TRUNCATE it reports the count and respects foreign keys.
pub fn delete_all(schema: &str, table: &TableDefinition) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!("DELETE FROM {}", qualified_table(schema, &table.table_name));
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::standard_columns;
    use serde_json::json;

    fn note() -> TableDefinition {
        let mut columns = standard_columns();
        columns.push(ColumnDefinition::new("title", "label"));
        columns.push(ColumnDefinition::new("rank", "measurement"));
        TableDefinition::new("note").with_columns(columns)
    }

    fn attrs(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    #[test]
    fn insert_casts_and_skips_managed_and_unknown_columns() {
        let q = insert(
            "public",
            &note(),
            &attrs(json!({"rank": 3, "title": "x", "id": 9, "bogus": 1, "reference_id": "r1"})),
        );
        assert_eq!(
            q.sql,
            r#"INSERT INTO "public"."note" AS t ("reference_id", "title", "rank") VALUES ($1::varchar(40), $2::varchar(100), $3::integer) RETURNING to_jsonb(t)"#
        );
        assert_eq!(q.params, vec![json!("r1"), json!("x"), json!(3)]);
    }

    #[test]
    fn update_bumps_version_and_keeps_reference() {
        let q = update("app", &note(), "r1", &attrs(json!({"title": "y", "reference_id": "other"})));
        assert_eq!(
            q.sql,
            r#"UPDATE "app"."note" AS t SET "title" = $1::varchar(100), "version" = t."version" + 1, "updated_at" = current_timestamp WHERE t."reference_id" = $2 RETURNING to_jsonb(t)"#
        );
        assert_eq!(q.params, vec![json!("y"), json!("r1")]);
    }

    #[test]
    fn lookups_bind_reference_id() {
        let q = select_by_reference("app", &note(), "r1");
        assert_eq!(q.sql, r#"SELECT to_jsonb(t) FROM "app"."note" t WHERE t."reference_id" = $1"#);
        let q = delete("app", &note(), "r1");
        assert!(q.sql.starts_with(r#"DELETE FROM "app"."note" AS t WHERE"#));
        assert_eq!(q.params, vec![json!("r1")]);
        assert_eq!(delete_all("app", &note()).sql, r#"DELETE FROM "app"."note""#);
    }

    #[test]
    fn serial_columns_cast_to_integers() {
        let c = ColumnDefinition::new("n", "measurement").with_data_type("bigserial");
        assert_eq!(cast_type(&c), "bigint");
        assert_eq!(cast_type(&ColumnDefinition::new("d", "datetime")), "timestamp");
    }
}
