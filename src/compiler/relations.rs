//! Materialize relation declarations into foreign-key columns, join tables and state tables.

use crate::error::ConfigError;
use crate::schema::{
    bounded_identifier, ColumnDefinition, RelationDeclaration, RelationKind, TableDefinition, STATE_MACHINE_TABLE,
    STATE_SUFFIX, USERGROUP_TABLE, USER_TABLE,
};

/// Apply one relation to the table set. Every step is add-if-missing, so applying the same
/// relation again leaves the tables unchanged.
pub(crate) fn materialize(
    tables: &mut Vec<TableDefinition>,
    relation: &RelationDeclaration,
) -> Result<(), ConfigError> {
    let kind = relation
        .kind()
        .map_err(|relation_name| ConfigError::UnknownRelationKind {
            relation: relation_name,
            declaration: relation.to_string(),
        })?;
    match kind {
        RelationKind::BelongsTo | RelationKind::HasOne => {
            add_foreign_key(tables, relation, kind);
            Ok(())
        }
        RelationKind::HasMany | RelationKind::HasManyAndBelongsToMany => {
            add_join_table(tables, relation)
        }
    }
}

fn table_mut<'a>(tables: &'a mut [TableDefinition], name: &str) -> Option<&'a mut TableDefinition> {
    tables.iter_mut().find(|t| t.table_name == name)
}

fn add_foreign_key(tables: &mut Vec<TableDefinition>, relation: &RelationDeclaration, kind: RelationKind) {
    let target = relation.object.as_str();
    let nullable = target == USER_TABLE
        || target == USERGROUP_TABLE
        || kind == RelationKind::HasOne
        || relation.nullable;
    let logical_name = match &relation.object_name {
        Some(name) => name.clone(),
        None => relation.object.clone(),
    };
    let column = ColumnDefinition::foreign_key(&logical_name, &relation.object_name(), target, nullable);
    let detaches = kind == RelationKind::BelongsTo && target != USER_TABLE;

    match table_mut(tables, &relation.subject) {
        Some(table) => {
            if table.add_column_if_missing(column) {
                tracing::debug!(table = %table.table_name, column = %relation.object_name(), "add foreign key column");
            }
            if detaches && table.is_top_level {
                table.is_top_level = false;
                tracing::debug!(table = %table.table_name, parent = %target, "table is not top level");
            }
        }
        None => {
            let mut table = TableDefinition::new(&relation.subject).with_columns(vec![column]);
            table.is_top_level = !detaches;
            tracing::info!(table = %table.table_name, relation = %relation, "create table for forward-declared relation");
            tables.push(table);
        }
    }
}

fn add_join_table(tables: &mut Vec<TableDefinition>, relation: &RelationDeclaration) -> Result<(), ConfigError> {
    let subject_col = relation.subject_name();
    let object_col = relation.object_name();
    if subject_col == object_col {
        return Err(ConfigError::AmbiguousJoinColumns(relation.to_string()));
    }
    let Some(join_name) = relation.join_table_name() else {
        return Ok(());
    };

    let columns = vec![
        ColumnDefinition::foreign_key(
            &bounded_identifier(&relation.subject, "_id"),
            &subject_col,
            &relation.subject,
            false,
        ),
        ColumnDefinition::foreign_key(
            &bounded_identifier(&relation.object, "_id"),
            &object_col,
            &relation.object,
            false,
        ),
    ];
    ensure_table(tables, &join_name, columns, |t| {
        t.is_join_table = true;
        t.is_top_level = false;
    });

    if relation.object != USERGROUP_TABLE {
        let state_name = bounded_identifier(&join_name, STATE_SUFFIX);
        let join_fk = bounded_identifier(&join_name, "_id");
        let columns = vec![
            ColumnDefinition::new("state", "label").with_data_type("varchar(100)"),
            ColumnDefinition::foreign_key("smd_id", "smd_id", STATE_MACHINE_TABLE, false),
            ColumnDefinition::foreign_key(&join_fk, &join_fk, &join_name, false),
        ];
        ensure_table(tables, &state_name, columns, |t| {
            t.is_top_level = false;
        });
    }
    Ok(())
}

/// Create `name` with `columns`, or add whichever of `columns` an existing table lacks.
fn ensure_table<F>(tables: &mut Vec<TableDefinition>, name: &str, columns: Vec<ColumnDefinition>, flags: F)
where
    F: FnOnce(&mut TableDefinition),
{
    match table_mut(tables, name) {
        Some(existing) => {
            for column in columns {
                existing.add_column_if_missing(column);
            }
            flags(existing);
        }
        None => {
            let mut table = TableDefinition::new(name).with_columns(columns);
            flags(&mut table);
            tracing::info!(table = %name, "create synthesized table");
            tables.push(table);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MAX_IDENTIFIER_BYTES;

    fn fk_targets(table: &TableDefinition) -> Vec<(String, String, bool)> {
        table
            .foreign_key_columns()
            .map(|c| {
                (
                    c.physical_name().to_string(),
                    c.foreign_key.as_ref().map(|f| f.table_name.clone()).unwrap_or_default(),
                    c.is_nullable,
                )
            })
            .collect()
    }

    #[test]
    fn belongs_to_adds_non_nullable_fk_and_detaches() {
        let mut tables = vec![TableDefinition::new("order"), TableDefinition::new("customer")];
        materialize(&mut tables, &RelationDeclaration::new("order", "belongs_to", "customer")).unwrap();
        let order = &tables[0];
        assert_eq!(fk_targets(order), vec![("customer_id".into(), "customer".into(), false)]);
        assert!(!order.is_top_level);
    }

    #[test]
    fn belongs_to_user_is_nullable_and_stays_top_level() {
        let mut tables = vec![TableDefinition::new("note")];
        materialize(&mut tables, &RelationDeclaration::new("note", "belongs_to", "user")).unwrap();
        assert_eq!(fk_targets(&tables[0]), vec![("user_id".into(), "user".into(), true)]);
        assert!(tables[0].is_top_level);

        materialize(&mut tables, &RelationDeclaration::new("note", "belongs_to", "usergroup")).unwrap();
        assert!(tables[0].column("usergroup_id").unwrap().is_nullable);
        assert!(!tables[0].is_top_level);
    }

    #[test]
    fn has_one_is_nullable_and_keeps_top_level() {
        let mut tables = vec![TableDefinition::new("site")];
        materialize(&mut tables, &RelationDeclaration::new("site", "has_one", "cloud_store")).unwrap();
        assert_eq!(fk_targets(&tables[0]), vec![("cloud_store_id".into(), "cloud_store".into(), true)]);
        assert!(tables[0].is_top_level);
    }

    #[test]
    fn forward_declared_subject_is_created_with_only_the_fk() {
        let mut tables = Vec::new();
        materialize(&mut tables, &RelationDeclaration::new("timeline", "belongs_to", "world")).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].table_name, "timeline");
        assert_eq!(tables[0].columns.len(), 1);
        assert!(!tables[0].is_top_level);
    }

    #[test]
    fn has_many_builds_join_and_state_tables() {
        let mut tables = Vec::new();
        materialize(&mut tables, &RelationDeclaration::new("world", "has_many", "smd")).unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.table_name.as_str()).collect();
        assert_eq!(names, vec!["world_world_id_has_smd_smd_id", "world_world_id_has_smd_smd_id_state"]);

        let join = &tables[0];
        assert!(join.is_join_table);
        assert!(!join.is_top_level);
        assert_eq!(
            fk_targets(join),
            vec![
                ("world_id".into(), "world".into(), false),
                ("smd_id".into(), "smd".into(), false)
            ]
        );

        let state = &tables[1];
        assert_eq!(state.column("state").unwrap().data_type, "varchar(100)");
        assert_eq!(
            fk_targets(state),
            vec![
                ("smd_id".into(), "smd".into(), false),
                (
                    "world_world_id_has_smd_smd_id_id".into(),
                    "world_world_id_has_smd_smd_id".into(),
                    false
                )
            ]
        );
    }

    #[test]
    fn many_to_many_builds_join_and_state_tables() {
        let mut tables = vec![TableDefinition::new("post"), TableDefinition::new("tag")];
        materialize(&mut tables, &RelationDeclaration::new("post", "has_many_and_belongs_to_many", "tag")).unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.table_name.as_str()).collect();
        assert_eq!(names, vec!["post", "tag", "post_id_tag_id", "post_id_tag_id_state"]);
        assert!(tables[0].columns.is_empty());
        assert!(tables[1].columns.is_empty());

        let join = &tables[2];
        assert!(join.is_join_table);
        assert!(!join.is_top_level);
        assert_eq!(
            fk_targets(join),
            vec![
                ("post_id".into(), "post".into(), false),
                ("tag_id".into(), "tag".into(), false)
            ]
        );

        let state = &tables[3];
        assert!(!state.is_join_table);
        assert!(!state.is_top_level);
        assert_eq!(state.column("state").unwrap().data_type, "varchar(100)");
        assert_eq!(
            fk_targets(state),
            vec![
                ("smd_id".into(), "smd".into(), false),
                ("post_id_tag_id_id".into(), "post_id_tag_id".into(), false)
            ]
        );
    }

    #[test]
    fn long_join_names_are_capped_with_distinct_state_table() {
        let mut tables = Vec::new();
        materialize(&mut tables, &RelationDeclaration::new("customer", "has_many", "shipping_address")).unwrap();
        let join = &tables[0];
        let state = &tables[1];
        assert_eq!(join.table_name, "customer_customer_id_has_shipping_address_shipping_address_id");
        assert!(state.table_name.len() <= MAX_IDENTIFIER_BYTES);
        assert!(state.table_name.ends_with(STATE_SUFFIX));
        assert!(!state.table_name.starts_with(&join.table_name));
        let join_fk = state.foreign_key_columns().last().unwrap();
        assert!(join_fk.physical_name().len() <= MAX_IDENTIFIER_BYTES);
        assert_eq!(join_fk.foreign_key.as_ref().unwrap().table_name, join.table_name);
    }

    #[test]
    fn usergroup_targets_get_no_state_table() {
        let mut tables = Vec::new();
        materialize(&mut tables, &RelationDeclaration::new("user", "has_many", "usergroup")).unwrap();
        assert_eq!(tables.len(), 1);
        materialize(
            &mut tables,
            &RelationDeclaration::new("post", "has_many_and_belongs_to_many", "usergroup"),
        )
        .unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[1].table_name, "post_id_usergroup_id");
        assert!(tables[1].is_join_table);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let mut tables = vec![TableDefinition::new("a")];
        let err = materialize(&mut tables, &RelationDeclaration::new("a", "owns", "b")).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownRelationKind { ref relation, .. } if relation == "owns"));
        assert_eq!(tables, vec![TableDefinition::new("a")]);
    }

    #[test]
    fn self_join_without_names_is_rejected() {
        let mut tables = Vec::new();
        let err = materialize(&mut tables, &RelationDeclaration::new("user", "has_many", "user")).unwrap_err();
        assert!(matches!(err, ConfigError::AmbiguousJoinColumns(_)));
        assert!(tables.is_empty());
    }

    #[test]
    fn reapplying_changes_nothing() {
        let rel = RelationDeclaration::new("order", "has_many", "item");
        let mut tables = vec![TableDefinition::new("order")];
        materialize(&mut tables, &rel).unwrap();
        let once = tables.clone();
        materialize(&mut tables, &rel).unwrap();
        assert_eq!(tables, once);
    }
}
