//! Declaration checks. Names end up as SQL identifiers, so they are restricted here.

use crate::config::{ActionConfig, FullConfig, RelationDeclaration, TableDefinition};
use crate::error::ConfigError;
use regex::Regex;
use std::sync::OnceLock;

const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]{0,62}$";

fn identifier_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(IDENTIFIER_PATTERN).ok()).as_ref()
}

pub fn is_identifier(name: &str) -> bool {
    identifier_pattern().map(|re| re.is_match(name)).unwrap_or(false)
}

fn identifier(kind: &str, name: &str) -> Result<(), ConfigError> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("invalid {} name '{}'", kind, name)))
    }
}

pub fn check_table(table: &TableDefinition) -> Result<(), ConfigError> {
    identifier("table", &table.table_name)?;
    for column in &table.columns {
        identifier("column", column.physical_name())
            .map_err(|e| ConfigError::Validation(format!("{} (table {})", e, table.table_name)))?;
    }
    Ok(())
}

pub fn check_relation(relation: &RelationDeclaration) -> Result<(), ConfigError> {
    identifier("table", &relation.subject)?;
    identifier("table", &relation.object)?;
    for name in [&relation.subject_name, &relation.object_name].into_iter().flatten() {
        identifier("column", name)?;
    }
    Ok(())
}

pub fn check_action(action: &ActionConfig) -> Result<(), ConfigError> {
    if action.name.trim().is_empty() {
        return Err(ConfigError::Validation(format!("action on {} without a name", action.on_type)));
    }
    identifier("entity type", &action.on_type)?;
    for field in &action.in_fields {
        if field.key().is_empty() {
            return Err(ConfigError::Validation(format!("action {}: input without a name", action.key())));
        }
    }
    Ok(())
}

/// First problem in `config`, if any.
pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    config.tables.iter().try_for_each(check_table)?;
    config.relations.iter().try_for_each(check_relation)?;
    config.actions.iter().try_for_each(check_action)
}

/// Drop invalid declarations, reporting each.
pub fn retain_valid(config: FullConfig) -> (FullConfig, Vec<ConfigError>) {
    fn keep<T>(items: Vec<T>, check: fn(&T) -> Result<(), ConfigError>, errors: &mut Vec<ConfigError>) -> Vec<T> {
        items
            .into_iter()
            .filter(|item| match check(item) {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!(error = %e, "declaration skipped");
                    errors.push(e);
                    false
                }
            })
            .collect()
    }
    let mut errors = Vec::new();
    let valid = FullConfig {
        tables: keep(config.tables, check_table, &mut errors),
        relations: keep(config.relations, check_relation, &mut errors),
        actions: keep(config.actions, check_action, &mut errors),
    };
    (valid, errors)
}
