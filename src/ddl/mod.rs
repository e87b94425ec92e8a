//! DDL for a compiled schema: CREATE TABLE, ADD COLUMN, CREATE INDEX and foreign keys.
//! Planning is pure over the compiled schema and the introspected live schema; `apply` runs the plan.

mod introspect;

pub use introspect::LiveSchema;

use crate::compiler::CompiledSchema;
use crate::schema::column_types::physical_type;
use crate::schema::{ColumnDefinition, TableDefinition};
use sqlx::PgPool;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DdlKind {
    CreateSchema,
    CreateTable,
    AddColumn,
    CreateIndex,
    AddForeignKey,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DdlStatement {
    pub kind: DdlKind,
    pub table: String,
    pub sql: String,
}

impl DdlStatement {
    fn new(kind: DdlKind, table: &str, sql: String) -> Self {
        DdlStatement {
            kind,
            table: table.to_string(),
            sql,
        }
    }
}

/// Quote identifier for PostgreSQL (identifiers come from config only).
pub(crate) fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub(crate) fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

/// `<prefix><hash>`: stable for (table, columns, purpose) and well inside the 63-byte identifier limit.
pub fn constraint_name(prefix: &str, table: &str, columns: &str, purpose: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(table.as_bytes());
    hasher.update(b"\0");
    hasher.update(columns.as_bytes());
    hasher.update(b"\0");
    hasher.update(purpose.as_bytes());
    let hex = hasher.finalize().to_hex();
    format!("{}{}", prefix, &hex.as_str()[..24])
}

fn default_literal(value: &str) -> String {
    let lower = value.to_ascii_lowercase();
    let is_keyword = matches!(
        lower.as_str(),
        "current_timestamp" | "now()" | "true" | "false" | "null"
    );
    if is_keyword || value.parse::<f64>().is_ok() {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "''"))
    }
}

/// Column clause. `relax_not_null` drops NOT NULL when there is no default (columns added to live tables).
fn column_clause(column: &ColumnDefinition, relax_not_null: bool) -> String {
    let mut def = format!(
        "{} {}",
        quoted(column.physical_name()),
        physical_type(&column.column_type, &column.data_type)
    );
    if column.is_primary_key {
        def.push_str(" PRIMARY KEY");
    } else if !column.is_nullable && !(relax_not_null && column.default_value.is_none()) {
        def.push_str(" NOT NULL");
    }
    if let Some(d) = &column.default_value {
        def.push_str(" DEFAULT ");
        def.push_str(&default_literal(d));
    }
    def
}

fn create_table(schema: &str, table: &TableDefinition) -> DdlStatement {
    let cols: Vec<String> = table.columns.iter().map(|c| column_clause(c, false)).collect();
    DdlStatement::new(
        DdlKind::CreateTable,
        &table.table_name,
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
            qualified_table(schema, &table.table_name),
            cols.join(",\n  ")
        ),
    )
}

fn indexes(schema: &str, table: &TableDefinition, live: &LiveSchema, out: &mut Vec<DdlStatement>) {
    let full = qualified_table(schema, &table.table_name);
    for column in &table.columns {
        let name = column.physical_name();
        if column.is_unique {
            let idx = constraint_name("u", &table.table_name, name, "unique");
            if !live.has_index(&idx) {
                out.push(DdlStatement::new(
                    DdlKind::CreateIndex,
                    &table.table_name,
                    format!("CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({})", quoted(&idx), full, quoted(name)),
                ));
            }
        }
        if column.is_indexed {
            let idx = constraint_name("i", &table.table_name, name, "index");
            if !live.has_index(&idx) {
                out.push(DdlStatement::new(
                    DdlKind::CreateIndex,
                    &table.table_name,
                    format!("CREATE INDEX IF NOT EXISTS {} ON {} ({})", quoted(&idx), full, quoted(name)),
                ));
            }
        }
    }
    if table.is_join_table {
        let fk_cols: Vec<&str> = table.foreign_key_columns().map(|c| c.physical_name()).collect();
        if fk_cols.len() >= 2 {
            let idx = constraint_name("j", &table.table_name, &fk_cols.join(","), "join");
            if !live.has_index(&idx) {
                let cols: Vec<String> = fk_cols.iter().map(|c| quoted(c)).collect();
                out.push(DdlStatement::new(
                    DdlKind::CreateIndex,
                    &table.table_name,
                    format!(
                        "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({})",
                        quoted(&idx),
                        full,
                        cols.join(", ")
                    ),
                ));
            }
        }
    }
}

fn foreign_keys(schema: &str, table: &TableDefinition, live: &LiveSchema, out: &mut Vec<DdlStatement>) {
    // audit rows outlive the rows they mirror
    if table.is_audit_table() {
        return;
    }
    for column in table.foreign_key_columns() {
        let Some(fk) = &column.foreign_key else { continue };
        let name = constraint_name("fk", &table.table_name, column.physical_name(), &fk.to_string());
        if live.has_constraint(&name) {
            continue;
        }
        out.push(DdlStatement::new(
            DdlKind::AddForeignKey,
            &table.table_name,
            format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                qualified_table(schema, &table.table_name),
                quoted(&name),
                quoted(column.physical_name()),
                qualified_table(schema, &fk.table_name),
                quoted(&fk.column_name)
            ),
        ));
    }
}

/// Statements that bring `live` up to `compiled`, ordered by dependency:
/// schema, tables, added columns, indexes, foreign keys. Empty when nothing is missing.
pub fn plan(schema: &str, compiled: &CompiledSchema, live: &LiveSchema) -> Vec<DdlStatement> {
    let mut out = Vec::new();
    if !live.schema_exists {
        out.push(DdlStatement::new(
            DdlKind::CreateSchema,
            "",
            format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(schema)),
        ));
    }

    for table in &compiled.tables {
        match live.columns(&table.table_name) {
            None => out.push(create_table(schema, table)),
            Some(existing) => {
                for column in table.columns.iter().filter(|c| !existing.contains(c.physical_name())) {
                    out.push(DdlStatement::new(
                        DdlKind::AddColumn,
                        &table.table_name,
                        format!(
                            "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {}",
                            qualified_table(schema, &table.table_name),
                            column_clause(column, true)
                        ),
                    ));
                }
            }
        }
    }

    for table in &compiled.tables {
        indexes(schema, table, live, &mut out);
    }
    for table in &compiled.tables {
        foreign_keys(schema, table, live, &mut out);
    }
    out
}

/// Run statements in order. Table and column failures abort; index and foreign-key failures
/// are logged and skipped, as existing data may violate them.
pub async fn apply(pool: &PgPool, statements: &[DdlStatement]) -> Result<(), sqlx::Error> {
    for stmt in statements {
        tracing::debug!(sql = %stmt.sql, "ddl");
        match stmt.kind {
            DdlKind::CreateSchema | DdlKind::CreateTable | DdlKind::AddColumn => {
                sqlx::query(&stmt.sql).execute(pool).await?;
            }
            DdlKind::CreateIndex | DdlKind::AddForeignKey => {
                if let Err(e) = sqlx::query(&stmt.sql).execute(pool).await {
                    tracing::debug!(table = %stmt.table, error = %e, "ddl statement skipped");
                }
            }
        }
    }
    tracing::info!(statements = statements.len(), "schema applied");
    Ok(())
}

/// Introspect, plan and apply in one step.
pub async fn sync(pool: &PgPool, schema: &str, compiled: &CompiledSchema) -> Result<usize, sqlx::Error> {
    let live = LiveSchema::load(pool, schema).await?;
    let statements = plan(schema, compiled, &live);
    apply(pool, &statements).await?;
    Ok(statements.len())
}
