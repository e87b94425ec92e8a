//! Raw declaration types as read from JSON files or `_sys_*` payload rows.

use crate::action::{ColumnTag, InField};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub use crate::schema::{ColumnDefinition, RelationDeclaration, TableDefinition};

/// One outcome as declared; `type` is the CRUD entity, performer name or response kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutcomeConfig {
    #[serde(rename = "type")]
    pub target: String,
    pub method: String,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub attributes: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionConfig {
    pub name: String,
    #[serde(default)]
    pub label: String,
    pub on_type: String,
    #[serde(default)]
    pub instance_optional: bool,
    #[serde(default)]
    pub in_fields: Vec<InField>,
    #[serde(default, rename = "out_fields", alias = "outcomes")]
    pub outcomes: Vec<OutcomeConfig>,
    #[serde(default)]
    pub validations: Vec<ColumnTag>,
    #[serde(default)]
    pub conformations: Vec<ColumnTag>,
}

impl ActionConfig {
    /// Storage id: `<on_type>:<name>`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.on_type, self.name)
    }
}

/// Every declaration kind, for in-memory loading.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FullConfig {
    #[serde(default)]
    pub tables: Vec<TableDefinition>,
    #[serde(default)]
    pub relations: Vec<RelationDeclaration>,
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
}

/// Declaration kinds accepted by the config endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigKind {
    Tables,
    Relations,
    Actions,
}

impl ConfigKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "tables" => Some(ConfigKind::Tables),
            "relations" => Some(ConfigKind::Relations),
            "actions" => Some(ConfigKind::Actions),
            _ => None,
        }
    }

    pub fn sys_table(&self) -> &'static str {
        match self {
            ConfigKind::Tables => "_sys_tables",
            ConfigKind::Relations => "_sys_relations",
            ConfigKind::Actions => "_sys_actions",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            ConfigKind::Tables => "tables.json",
            ConfigKind::Relations => "relations.json",
            ConfigKind::Actions => "actions.json",
        }
    }
}

fn in_field(name: &str, column_name: &str, column_type: &str, is_nullable: bool) -> InField {
    InField {
        name: name.to_string(),
        column_name: column_name.to_string(),
        column_type: column_type.to_string(),
        is_nullable,
        default_value: String::new(),
    }
}

/// Actions the engine ships on `world`.
pub fn system_actions() -> Vec<ActionConfig> {
    vec![
        ActionConfig {
            name: "generate_random_data".into(),
            label: "Generate random data".into(),
            on_type: "world".into(),
            instance_optional: false,
            in_fields: vec![in_field("Number of records", "count", "measurement", false)],
            outcomes: vec![OutcomeConfig {
                target: "generate.random.data".into(),
                method: "EXECUTE".into(),
                reference: String::new(),
                attributes: json!({ "count": "~count" }),
            }],
            validations: vec![ColumnTag {
                column_name: "count".into(),
                tags: "gt=0".into(),
            }],
            conformations: Vec::new(),
        },
        ActionConfig {
            name: "import_data".into(),
            label: "Import data from dump".into(),
            on_type: "world".into(),
            instance_optional: true,
            in_fields: vec![
                in_field("JSON dump file", "dump_file", "file.json", false),
                in_field("Truncate before insert", "truncate_before_insert", "truefalse", true),
            ],
            outcomes: vec![OutcomeConfig {
                target: "__data_import".into(),
                method: "EXECUTE".into(),
                reference: String::new(),
                attributes: json!({
                    "dump_file": "~dump_file",
                    "truncate_before_insert": "~truncate_before_insert",
                    "user": "~user",
                    "subject": "~subject"
                }),
            }],
            validations: Vec::new(),
            conformations: Vec::new(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_config_reads_out_fields() {
        let raw = json!({
            "name": "archive",
            "on_type": "note",
            "in_fields": [{"name": "reason"}],
            "out_fields": [{"type": "note", "method": "update", "attributes": {"reference_id": "~.reference_id"}}],
            "validations": [{"column_name": "reason", "tags": "required"}]
        });
        let action: ActionConfig = serde_json::from_value(raw).unwrap();
        assert_eq!(action.key(), "note:archive");
        assert_eq!(action.in_fields[0].column_type, "label");
        assert_eq!(action.outcomes[0].target, "note");
        assert!(action.outcomes[0].reference.is_empty());
        assert!(!action.instance_optional);
    }

    #[test]
    fn kinds_map_to_storage() {
        assert_eq!(ConfigKind::parse("relations").map(|k| k.sys_table()), Some("_sys_relations"));
        assert_eq!(ConfigKind::parse("actions").map(|k| k.file_name()), Some("actions.json"));
        assert!(ConfigKind::parse("packages").is_none());
    }
}
