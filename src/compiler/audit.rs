//! Audit mirror tables: `<table>_audit` copies of every non-audit table.

use crate::schema::column_types::{is_timestamp_type, physical_type};
use crate::schema::{ColumnDefinition, Permission, TableDefinition};
use std::collections::HashSet;

/// Counts of audit tables touched by one pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct AuditSummary {
    pub created: usize,
    pub updated: usize,
}

/// Create missing audit tables and append columns an existing audit table lacks.
pub(crate) fn synthesize(tables: &mut Vec<TableDefinition>) -> AuditSummary {
    let mut summary = AuditSummary::default();
    let sources: Vec<TableDefinition> = tables.iter().filter(|t| !t.is_audit_table()).cloned().collect();

    for source in &sources {
        let audit_name = source.audit_table_name();
        match tables.iter_mut().find(|t| t.table_name == audit_name) {
            None => {
                tracing::info!(table = %source.table_name, audit = %audit_name, "create audit table");
                tables.push(audit_table_for(source));
                summary.created += 1;
            }
            Some(audit) if audit.columns.len() < source.columns.len() => {
                let existing: HashSet<String> = audit.columns.iter().map(|c| c.name.clone()).collect();
                let missing: Vec<ColumnDefinition> = source
                    .columns
                    .iter()
                    .filter(|c| !c.is_primary_key && !existing.contains(&c.name))
                    .map(audit_column)
                    .collect();
                if !missing.is_empty() {
                    tracing::info!(audit = %audit_name, added = missing.len(), "source table grew, extend audit table");
                    for column in missing {
                        audit.add_column_if_missing(column);
                    }
                    summary.updated += 1;
                }
            }
            Some(_) => {}
        }
    }

    tracing::info!(created = summary.created, updated = summary.updated, "audit tables");
    summary
}

fn audit_table_for(source: &TableDefinition) -> TableDefinition {
    let columns = source
        .columns
        .iter()
        .filter(|c| !c.is_primary_key)
        .map(audit_column)
        .collect();
    let mut table = TableDefinition::new(&source.audit_table_name()).with_columns(columns);
    table.is_hidden = true;
    table.is_top_level = false;
    table.default_permission = Permission::CREATE_ONLY.bits();
    table
}

/// Audit copy of a column: timestamps nullable, no uniqueness or key flags.
fn audit_column(column: &ColumnDefinition) -> ColumnDefinition {
    let mut c = column.clone();
    if c.column_type == "datetime" || is_timestamp_type(physical_type(&c.column_type, &c.data_type)) {
        c.is_nullable = true;
    }
    c.is_unique = false;
    c.is_primary_key = false;
    c.is_auto_increment = false;
    c
}
