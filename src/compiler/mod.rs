//! Relation-to-schema compiler: turns declared tables and relations into a closed table set.
//!
//! Each pass takes declarations by value and produces a new [`CompiledSchema`]; the caller
//! swaps it into place. Feeding a compiled schema back in yields the same schema.

mod audit;
mod relations;

use crate::error::ConfigError;
use crate::schema::{
    standard_columns, system_relations, system_tables, ColumnDefinition, RelationDeclaration, TableDefinition,
};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Clone, Debug)]
pub struct CompileOptions {
    /// Include the engine's own tables and relations (world, user, smd, oauth, ...).
    pub system_relations: bool,
    /// Synthesize `<table>_audit` mirrors.
    pub audit_tables: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            system_relations: true,
            audit_tables: true,
        }
    }
}

/// Closed table set plus the relations that were materialized into it.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CompiledSchema {
    pub tables: Vec<TableDefinition>,
    pub relations: Vec<RelationDeclaration>,
}

impl CompiledSchema {
    pub fn table(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.iter().find(|t| t.table_name == name)
    }
}

/// Result of one compilation pass. Diagnostics were logged and their items skipped.
#[derive(Debug)]
pub struct Compilation {
    pub schema: CompiledSchema,
    pub diagnostics: Vec<ConfigError>,
}

pub struct SchemaCompiler {
    tables: Vec<TableDefinition>,
    relations: Vec<RelationDeclaration>,
    options: CompileOptions,
}

impl SchemaCompiler {
    pub fn new(tables: Vec<TableDefinition>) -> Self {
        SchemaCompiler {
            tables,
            relations: Vec::new(),
            options: CompileOptions::default(),
        }
    }

    /// Start from a previous pass's output.
    pub fn from_schema(schema: CompiledSchema) -> Self {
        SchemaCompiler::new(schema.tables).relations(schema.relations)
    }

    pub fn relations(mut self, relations: Vec<RelationDeclaration>) -> Self {
        self.relations.extend(relations);
        self
    }

    pub fn options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn compile(self) -> Compilation {
        let mut diagnostics = Vec::new();
        let mut tables = dedupe_tables(self.tables, &mut diagnostics);
        if self.options.system_relations {
            merge_system_tables(&mut tables);
        }
        for table in tables.iter_mut() {
            normalize_columns(table);
        }
        ensure_standard_columns(&mut tables);

        let declared = collect_relations(&self.options, &self.relations, &tables);
        let mut materialized = Vec::with_capacity(declared.len());
        for relation in declared {
            match relations::materialize(&mut tables, &relation) {
                Ok(()) => materialized.push(relation),
                Err(e) => {
                    tracing::error!(relation = %relation, error = %e, "skipping relation");
                    diagnostics.push(e);
                }
            }
        }

        close_foreign_keys(&mut tables);
        ensure_standard_columns(&mut tables);

        if self.options.audit_tables {
            audit::synthesize(&mut tables);
            ensure_standard_columns(&mut tables);
        }

        attach_relations(&mut tables, &materialized);

        Compilation {
            schema: CompiledSchema {
                tables,
                relations: materialized,
            },
            diagnostics,
        }
    }
}

fn dedupe_tables(tables: Vec<TableDefinition>, diagnostics: &mut Vec<ConfigError>) -> Vec<TableDefinition> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(tables.len());
    for table in tables {
        if !seen.insert(table.table_name.clone()) {
            tracing::error!(table = %table.table_name, "duplicate table declaration skipped");
            diagnostics.push(ConfigError::Duplicate {
                kind: "table",
                name: table.table_name,
            });
            continue;
        }
        out.push(table);
    }
    out
}

fn merge_system_tables(tables: &mut Vec<TableDefinition>) {
    for system in system_tables() {
        match tables.iter_mut().find(|t| t.table_name == system.table_name) {
            Some(existing) => {
                for column in system.columns {
                    existing.add_column_if_missing(column);
                }
            }
            None => tables.push(system),
        }
    }
}

/// Fill empty physical names and drop later columns that reuse a physical name.
fn normalize_columns(table: &mut TableDefinition) {
    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(table.columns.len());
    for mut column in std::mem::take(&mut table.columns) {
        if column.column_name.is_empty() {
            column.column_name = column.name.clone();
        }
        if column.column_name.trim().is_empty() {
            tracing::warn!(table = %table.table_name, "column without a name skipped");
            continue;
        }
        if !seen.insert(column.column_name.clone()) {
            tracing::warn!(table = %table.table_name, column = %column.column_name, "duplicate column skipped");
            continue;
        }
        columns.push(column);
    }
    table.columns = columns;
}

/// Prepend whichever standard columns a table lacks, keeping their canonical order.
fn ensure_standard_columns(tables: &mut [TableDefinition]) {
    for table in tables.iter_mut() {
        let missing: Vec<ColumnDefinition> = standard_columns()
            .into_iter()
            .filter(|c| !table.has_column(c.physical_name()))
            .collect();
        if !missing.is_empty() {
            table.columns.splice(0..0, missing);
        }
    }
}

/// System relations, then top-level declarations, then each table's own, deduplicated by hash.
fn collect_relations(
    options: &CompileOptions,
    declared: &[RelationDeclaration],
    tables: &[TableDefinition],
) -> Vec<RelationDeclaration> {
    let system = if options.system_relations {
        system_relations()
    } else {
        Vec::new()
    };
    let mut seen = HashSet::new();
    system
        .into_iter()
        .chain(declared.iter().cloned())
        .chain(tables.iter().flat_map(|t| t.relations.iter().cloned()))
        .filter(|r| {
            let fresh = seen.insert(r.hash());
            if !fresh {
                tracing::debug!(relation = %r, "relation already registered");
            }
            fresh
        })
        .collect()
}

/// Create any table a foreign key points at that does not exist yet.
fn close_foreign_keys(tables: &mut Vec<TableDefinition>) {
    let known: HashSet<String> = tables.iter().map(|t| t.table_name.clone()).collect();
    let mut missing: Vec<String> = Vec::new();
    for table in tables.iter() {
        for column in table.foreign_key_columns() {
            if let Some(fk) = &column.foreign_key {
                if !known.contains(&fk.table_name) && !missing.contains(&fk.table_name) {
                    missing.push(fk.table_name.clone());
                }
            }
        }
    }
    for name in missing {
        tracing::info!(table = %name, "create referenced table");
        tables.push(TableDefinition::new(&name));
    }
}

/// Each table lists the relations it takes part in, in declaration order.
fn attach_relations(tables: &mut [TableDefinition], relations: &[RelationDeclaration]) {
    for table in tables.iter_mut() {
        let name = table.table_name.as_str();
        table.relations = relations
            .iter()
            .filter(|r| {
                r.subject == name || r.object == name || r.join_table_name().as_deref() == Some(name)
            })
            .cloned()
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDefinition, Permission, MAX_IDENTIFIER_BYTES};

    fn declared() -> (Vec<TableDefinition>, Vec<RelationDeclaration>) {
        let tables = vec![
            TableDefinition::new("customer").with_columns(vec![
                ColumnDefinition::new("name", "name"),
                ColumnDefinition {
                    is_unique: true,
                    ..ColumnDefinition::new("email", "email")
                },
            ]),
            TableDefinition::new("order").with_columns(vec![ColumnDefinition::new("total", "measurement")]),
        ];
        let relations = vec![
            RelationDeclaration::new("order", "belongs_to", "customer"),
            RelationDeclaration::new("order", "has_many", "product"),
            RelationDeclaration::new("customer", "belongs_to", "user"),
            RelationDeclaration::new("order", "belongs_to", "customer"),
        ];
        (tables, relations)
    }

    fn compile(tables: Vec<TableDefinition>, relations: Vec<RelationDeclaration>) -> Compilation {
        SchemaCompiler::new(tables)
            .relations(relations)
            .options(CompileOptions {
                system_relations: false,
                audit_tables: true,
            })
            .compile()
    }

    #[test]
    fn synthesized_names_fit_postgres_identifiers() {
        let tables = vec![
            TableDefinition::new("customer"),
            TableDefinition::new("shipping_address"),
            TableDefinition::new(&"w".repeat(63)),
        ];
        let relations = vec![
            RelationDeclaration::new("customer", "has_many", "shipping_address"),
            RelationDeclaration::new("customer", "has_many_and_belongs_to_many", &"w".repeat(63)),
            RelationDeclaration::new(&"w".repeat(63), "belongs_to", "customer"),
        ];
        let compiled = SchemaCompiler::new(tables)
            .relations(relations)
            .options(CompileOptions::default())
            .compile();
        assert!(compiled.diagnostics.is_empty(), "{:?}", compiled.diagnostics);

        let mut seen = HashSet::new();
        for table in &compiled.schema.tables {
            assert!(table.table_name.len() <= MAX_IDENTIFIER_BYTES, "{}", table.table_name);
            assert!(seen.insert(table.table_name.clone()), "duplicate table {}", table.table_name);
            let mut columns = HashSet::new();
            for column in &table.columns {
                let name = column.physical_name();
                assert!(name.len() <= MAX_IDENTIFIER_BYTES, "{}.{}", table.table_name, name);
                assert!(columns.insert(name.to_string()), "duplicate column {}.{}", table.table_name, name);
            }
        }
        let state = compiled
            .schema
            .tables
            .iter()
            .find(|t| t.table_name.starts_with("customer_customer_id_has_shipping") && t.table_name.ends_with("_state"))
            .unwrap();
        let audit = compiled.schema.table(&state.audit_table_name()).unwrap();
        assert!(audit.is_audit_table());
        assert_ne!(audit.table_name, state.table_name);
    }

    #[test]
    fn second_pass_is_identical() {
        let (tables, relations) = declared();
        let first = compile(tables, relations);
        assert!(first.diagnostics.is_empty());

        let second = SchemaCompiler::from_schema(first.schema.clone())
            .options(CompileOptions {
                system_relations: false,
                audit_tables: true,
            })
            .compile();
        assert_eq!(second.schema, first.schema);
        assert_eq!(
            serde_json::to_string(&second.schema).unwrap(),
            serde_json::to_string(&first.schema).unwrap()
        );
    }

    #[test]
    fn duplicate_relations_materialize_once() {
        let (tables, relations) = declared();
        let schema = compile(tables, relations).schema;
        assert_eq!(schema.relations.len(), 3);
        let order = schema.table("order").unwrap();
        assert_eq!(order.foreign_key_columns().count(), 1);
        assert_eq!(order.relations.len(), 2);
    }

    #[test]
    fn closure_creates_referenced_tables_with_standard_columns() {
        let (tables, relations) = declared();
        let schema = compile(tables, relations).schema;
        for name in ["product", "smd", "user"] {
            let t = schema.table(name).unwrap_or_else(|| panic!("{name} missing"));
            assert!(t.has_column("id"));
            assert!(t.has_column("reference_id"));
        }
        for table in &schema.tables {
            for fk in table.foreign_key_columns() {
                let target = &fk.foreign_key.as_ref().unwrap().table_name;
                assert!(!target.is_empty());
                assert!(schema.table(target).is_some(), "{} -> {}", table.table_name, target);
            }
        }
    }

    #[test]
    fn every_table_has_one_audit_mirror() {
        let (tables, relations) = declared();
        let schema = compile(tables, relations).schema;
        let sources: Vec<&TableDefinition> = schema.tables.iter().filter(|t| !t.is_audit_table()).collect();
        for source in &sources {
            let audit = schema.table(&source.audit_table_name()).unwrap();
            assert_eq!(audit.columns.len(), source.columns.len());
            assert_eq!(audit.columns[0].name, "id");
            assert_eq!(audit.default_permission, Permission::CREATE_ONLY.bits());
        }
        assert_eq!(schema.tables.len(), sources.len() * 2);
        assert!(schema.table("customer_audit_audit").is_none());
    }

    #[test]
    fn unknown_relation_is_reported_and_rest_compiles() {
        let (tables, mut relations) = declared();
        relations.insert(0, RelationDeclaration::new("order", "is_friends_with", "customer"));
        let out = compile(tables, relations);
        assert_eq!(out.diagnostics.len(), 1);
        assert!(matches!(out.diagnostics[0], ConfigError::UnknownRelationKind { .. }));
        assert_eq!(out.schema.relations.len(), 3);
        assert!(out.schema.table("order").unwrap().has_column("customer_id"));
    }

    #[test]
    fn system_relations_are_compiled_by_default() {
        let schema = SchemaCompiler::new(Vec::new()).compile().schema;
        assert!(schema.table("world_world_id_has_smd_smd_id").is_some());
        assert!(schema.table("site").unwrap().has_column("cloud_store_id"));
        assert!(!schema.table("action").unwrap().is_top_level);
        assert!(schema.table("world").unwrap().has_column("table_name"));
    }

    #[test]
    fn declared_system_tables_gain_missing_columns() {
        let declared = TableDefinition::new("user").with_columns(vec![ColumnDefinition::new("nickname", "label")]);
        let out = SchemaCompiler::new(vec![declared]).compile();
        assert!(out.diagnostics.is_empty());
        let user = out.schema.table("user").unwrap();
        assert!(user.has_column("nickname"));
        assert!(user.has_column("email"));
        assert_eq!(out.schema.tables.iter().filter(|t| t.table_name == "user").count(), 1);
    }

    #[test]
    fn duplicate_tables_are_reported() {
        let out = compile(
            vec![TableDefinition::new("a"), TableDefinition::new("a")],
            Vec::new(),
        );
        assert_eq!(
            out.diagnostics,
            vec![ConfigError::Duplicate {
                kind: "table",
                name: "a".into()
            }]
        );
        assert_eq!(out.schema.tables.len(), 2);
    }

    #[test]
    fn standard_columns_lead_in_order() {
        let (tables, relations) = declared();
        let schema = compile(tables, relations).schema;
        let customer = schema.table("customer").unwrap();
        let names: Vec<&str> = customer.columns.iter().map(|c| c.physical_name()).collect();
        assert_eq!(
            &names[..8],
            &["id", "version", "created_at", "updated_at", "reference_id", "permission", "name", "email"]
        );
        assert_eq!(names[8], "user_id");
    }
}
