//! Schema model: tables, columns, relations, permission bits and semantic column types.

pub mod column_types;
pub mod permission;
pub mod types;

pub use column_types::{column_type, fake_value, physical_type, ColumnType};
pub use permission::Permission;
pub use types::*;

/// Columns every table carries, in this order, ahead of declared columns.
pub fn standard_columns() -> Vec<ColumnDefinition> {
    vec![
        ColumnDefinition {
            is_primary_key: true,
            is_auto_increment: true,
            exclude_from_api: true,
            ..ColumnDefinition::new("id", "id").with_data_type("bigserial")
        },
        ColumnDefinition {
            default_value: Some("1".into()),
            exclude_from_api: true,
            ..ColumnDefinition::new("version", "measurement").with_data_type("integer")
        },
        ColumnDefinition {
            default_value: Some("current_timestamp".into()),
            is_indexed: true,
            ..ColumnDefinition::new("created_at", "datetime").with_data_type("timestamp")
        },
        ColumnDefinition {
            is_indexed: true,
            is_nullable: true,
            ..ColumnDefinition::new("updated_at", "datetime").with_data_type("timestamp")
        },
        ColumnDefinition {
            is_indexed: true,
            is_unique: true,
            ..ColumnDefinition::new("reference_id", "alias").with_data_type("varchar(40)")
        },
        ColumnDefinition::new("permission", "value")
            .with_data_type("bigint")
            .nullable(true),
    ]
}

pub fn is_standard_column(physical_name: &str) -> bool {
    matches!(
        physical_name,
        "id" | "version" | "created_at" | "updated_at" | "reference_id" | "permission"
    )
}

/// Relations the engine's own tables depend on.
pub fn system_relations() -> Vec<RelationDeclaration> {
    vec![
        RelationDeclaration::new("world_column", "belongs_to", "world"),
        RelationDeclaration::new("action", "belongs_to", "world"),
        RelationDeclaration::new("world", "has_many", "smd"),
        RelationDeclaration::new("oauth_token", "has_one", "oauth_connect"),
        RelationDeclaration::new("data_exchange", "has_one", "oauth_token"),
        RelationDeclaration::new("timeline", "belongs_to", "world"),
        RelationDeclaration::new("cloud_store", "has_one", "oauth_token"),
        RelationDeclaration::new("site", "has_one", "cloud_store"),
    ]
}

/// Tables the engine's own actions read. Declared tables of the same name gain any missing columns.
pub fn system_tables() -> Vec<TableDefinition> {
    vec![
        TableDefinition::new("world").with_columns(vec![
            ColumnDefinition {
                is_unique: true,
                is_indexed: true,
                ..ColumnDefinition::new("table_name", "name").with_data_type("varchar(100)")
            },
            ColumnDefinition::new("is_hidden", "truefalse").nullable(true),
            ColumnDefinition::new("default_permission", "value").with_data_type("bigint").nullable(true),
        ]),
        TableDefinition::new(USER_TABLE).with_columns(vec![
            ColumnDefinition::new("name", "name").nullable(true),
            ColumnDefinition {
                is_unique: true,
                ..ColumnDefinition::new("email", "email")
            },
            ColumnDefinition::new("password", "password").nullable(true),
        ]),
        TableDefinition::new(USERGROUP_TABLE).with_columns(vec![ColumnDefinition::new("name", "name")]),
        TableDefinition::new(STATE_MACHINE_TABLE).with_columns(vec![
            ColumnDefinition::new("name", "name"),
            ColumnDefinition::new("label", "label"),
            ColumnDefinition::new("initial_state", "label"),
            ColumnDefinition::new("events", "json").nullable(true),
        ]),
    ]
}

/// Table holding state machine descriptors referenced by state tables.
pub const STATE_MACHINE_TABLE: &str = "smd";
pub const USER_TABLE: &str = "user";
pub const USERGROUP_TABLE: &str = "usergroup";
