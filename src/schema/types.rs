//! Table, column and relation declarations. Deserialized from config and grown by the compiler.

use crate::schema::permission::Permission;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target of a foreign-key column: table and column it references.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    pub table_name: String,
    #[serde(default = "default_fk_column")]
    pub column_name: String,
}

fn default_fk_column() -> String {
    "id".into()
}

impl ForeignKeyRef {
    pub fn to_id_of(table_name: &str) -> Self {
        ForeignKeyRef {
            table_name: table_name.to_string(),
            column_name: default_fk_column(),
        }
    }
}

impl fmt::Display for ForeignKeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.table_name, self.column_name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// Logical name (API-facing).
    pub name: String,
    /// Physical column name. Empty means "same as name".
    #[serde(default)]
    pub column_name: String,
    /// Semantic type name from the column type registry (e.g. "label", "email").
    #[serde(default = "default_column_type")]
    pub column_type: String,
    /// Physical storage type. Empty means "derive from column_type".
    #[serde(default)]
    pub data_type: String,
    #[serde(default)]
    pub is_nullable: bool,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default)]
    pub is_indexed: bool,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub is_auto_increment: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<ForeignKeyRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default)]
    pub exclude_from_api: bool,
}

fn default_column_type() -> String {
    "label".into()
}

impl ColumnDefinition {
    /// Plain column with the given logical/physical name and semantic type.
    pub fn new(name: &str, column_type: &str) -> Self {
        ColumnDefinition {
            name: name.to_string(),
            column_name: name.to_string(),
            column_type: column_type.to_string(),
            data_type: String::new(),
            is_nullable: false,
            is_unique: false,
            is_indexed: false,
            is_primary_key: false,
            is_auto_increment: false,
            foreign_key: None,
            default_value: None,
            exclude_from_api: false,
        }
    }

    /// Foreign-key column referencing `target.id`.
    pub fn foreign_key(name: &str, column_name: &str, target: &str, nullable: bool) -> Self {
        ColumnDefinition {
            column_name: column_name.to_string(),
            data_type: "bigint".into(),
            is_nullable: nullable,
            foreign_key: Some(ForeignKeyRef::to_id_of(target)),
            ..ColumnDefinition::new(name, "alias")
        }
    }

    pub fn with_data_type(mut self, data_type: &str) -> Self {
        self.data_type = data_type.to_string();
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.is_nullable = nullable;
        self
    }

    pub fn physical_name(&self) -> &str {
        if self.column_name.is_empty() {
            &self.name
        } else {
            &self.column_name
        }
    }

    pub fn is_foreign_key(&self) -> bool {
        self.foreign_key.is_some()
    }
}

/// Relation kinds understood by the compiler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RelationKind {
    BelongsTo,
    HasOne,
    HasMany,
    HasManyAndBelongsToMany,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::BelongsTo => "belongs_to",
            RelationKind::HasOne => "has_one",
            RelationKind::HasMany => "has_many",
            RelationKind::HasManyAndBelongsToMany => "has_many_and_belongs_to_many",
        }
    }
}

impl FromStr for RelationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "belongs_to" => Ok(RelationKind::BelongsTo),
            "has_one" => Ok(RelationKind::HasOne),
            "has_many" => Ok(RelationKind::HasMany),
            "has_many_and_belongs_to_many" => Ok(RelationKind::HasManyAndBelongsToMany),
            other => Err(other.to_string()),
        }
    }
}

/// `subject <relation> object`, e.g. `order belongs_to customer`.
/// The relation is kept as written so unknown kinds can be reported at compile time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDeclaration {
    pub subject: String,
    pub relation: String,
    pub object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_name: Option<String>,
    /// Nullability of the belongs_to foreign key when no override applies.
    #[serde(default)]
    pub nullable: bool,
}

impl RelationDeclaration {
    pub fn new(subject: &str, relation: &str, object: &str) -> Self {
        RelationDeclaration {
            subject: subject.to_string(),
            relation: relation.to_string(),
            object: object.to_string(),
            subject_name: None,
            object_name: None,
            nullable: false,
        }
    }

    pub fn kind(&self) -> Result<RelationKind, String> {
        self.relation.parse()
    }

    /// FK column name pointing at the subject (default `<subject>_id`).
    pub fn subject_name(&self) -> String {
        self.subject_name
            .clone()
            .unwrap_or_else(|| bounded_identifier(&self.subject, "_id"))
    }

    /// FK column name pointing at the object (default `<object>_id`).
    pub fn object_name(&self) -> String {
        self.object_name
            .clone()
            .unwrap_or_else(|| bounded_identifier(&self.object, "_id"))
    }

    /// Join table for has_many: `<subject>_<subject_name>_has_<object>_<object_name>`.
    /// For has_many_and_belongs_to_many: `<subject_name>_<object_name>`.
    pub fn join_table_name(&self) -> Option<String> {
        match self.kind().ok()? {
            RelationKind::HasMany => Some(bounded_identifier(
                &format!(
                    "{}_{}_has_{}_{}",
                    self.subject,
                    self.subject_name(),
                    self.object,
                    self.object_name()
                ),
                "",
            )),
            RelationKind::HasManyAndBelongsToMany => Some(bounded_identifier(
                &format!("{}_{}", self.subject_name(), self.object_name()),
                "",
            )),
            RelationKind::BelongsTo | RelationKind::HasOne => None,
        }
    }

    /// Stable identity over (subject, relation, object). Hex blake3, truncated.
    pub fn hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.subject.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.relation.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.object.as_bytes());
        let hex = hasher.finalize().to_hex();
        hex.as_str()[..32].to_string()
    }
}

impl fmt::Display for RelationDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.relation, self.object)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub table_name: String,
    #[serde(default)]
    pub columns: Vec<ColumnDefinition>,
    #[serde(default)]
    pub relations: Vec<RelationDeclaration>,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default)]
    pub is_join_table: bool,
    #[serde(default = "default_true")]
    pub is_top_level: bool,
    #[serde(default)]
    pub is_state_tracking_enabled: bool,
    #[serde(default)]
    pub is_audit_enabled: bool,
    #[serde(default = "default_permission")]
    pub default_permission: i64,
}

fn default_true() -> bool {
    true
}

fn default_permission() -> i64 {
    Permission::DEFAULT.bits()
}

impl TableDefinition {
    pub fn new(table_name: &str) -> Self {
        TableDefinition {
            table_name: table_name.to_string(),
            columns: Vec::new(),
            relations: Vec::new(),
            is_hidden: false,
            is_join_table: false,
            is_top_level: true,
            is_state_tracking_enabled: false,
            is_audit_enabled: false,
            default_permission: default_permission(),
        }
    }

    pub fn with_columns(mut self, columns: Vec<ColumnDefinition>) -> Self {
        self.columns = columns;
        self
    }

    pub fn column(&self, physical_name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.physical_name() == physical_name)
    }

    pub fn has_column(&self, physical_name: &str) -> bool {
        self.column(physical_name).is_some()
    }

    /// Append a column unless one with the same physical name exists. Returns whether it was added.
    pub fn add_column_if_missing(&mut self, column: ColumnDefinition) -> bool {
        if self.has_column(column.physical_name()) {
            return false;
        }
        self.columns.push(column);
        true
    }

    pub fn is_audit_table(&self) -> bool {
        self.table_name.ends_with(AUDIT_SUFFIX)
    }

    pub fn audit_table_name(&self) -> String {
        bounded_identifier(&self.table_name, AUDIT_SUFFIX)
    }

    pub fn foreign_key_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter().filter(|c| c.is_foreign_key())
    }
}

pub const AUDIT_SUFFIX: &str = "_audit";
pub const STATE_SUFFIX: &str = "_state";

/// PostgreSQL truncates identifiers longer than this many bytes.
pub const MAX_IDENTIFIER_BYTES: usize = 63;

const IDENTIFIER_HASH_LEN: usize = 12;

/// `<base><suffix>` when it fits in [`MAX_IDENTIFIER_BYTES`]. Otherwise a prefix of `base`,
/// `_`, a hash of the full name, then `suffix`, so suffix checks such as
/// [`TableDefinition::is_audit_table`] still hold and distinct names stay distinct.
pub fn bounded_identifier(base: &str, suffix: &str) -> String {
    let full = format!("{}{}", base, suffix);
    if full.len() <= MAX_IDENTIFIER_BYTES {
        return full;
    }
    let hex = blake3::hash(full.as_bytes()).to_hex();
    let mut keep = MAX_IDENTIFIER_BYTES.saturating_sub(suffix.len() + 1 + IDENTIFIER_HASH_LEN);
    while !base.is_char_boundary(keep) {
        keep -= 1;
    }
    format!("{}_{}{}", &base[..keep], &hex.as_str()[..IDENTIFIER_HASH_LEN], suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_hash_is_stable_and_ignores_names() {
        let a = RelationDeclaration::new("order", "belongs_to", "customer");
        let mut b = a.clone();
        b.object_name = Some("buyer_id".into());
        assert_eq!(a.hash(), b.hash());
        assert_ne!(
            a.hash(),
            RelationDeclaration::new("order", "has_one", "customer").hash()
        );
        assert_eq!(a.hash().len(), 32);
    }

    #[test]
    fn long_identifiers_are_capped_and_keep_their_suffix() {
        assert_eq!(bounded_identifier("note", AUDIT_SUFFIX), "note_audit");
        let base = "a".repeat(60);
        let capped = bounded_identifier(&base, AUDIT_SUFFIX);
        assert_eq!(capped.len(), MAX_IDENTIFIER_BYTES);
        assert!(capped.ends_with(AUDIT_SUFFIX));
        assert!(capped.starts_with("aaaa"));
        assert_eq!(capped, bounded_identifier(&base, AUDIT_SUFFIX));
        let other = bounded_identifier(&format!("{}b", base), AUDIT_SUFFIX);
        assert_ne!(capped, other);

        let exact = "c".repeat(MAX_IDENTIFIER_BYTES);
        assert_eq!(bounded_identifier(&exact, ""), exact);
        assert!(bounded_identifier(&"é".repeat(40), "_id").len() <= MAX_IDENTIFIER_BYTES);
    }

    #[test]
    fn join_table_names() {
        let has_many = RelationDeclaration::new("world", "has_many", "smd");
        assert_eq!(
            has_many.join_table_name().as_deref(),
            Some("world_world_id_has_smd_smd_id")
        );
        let habtm = RelationDeclaration::new("post", "has_many_and_belongs_to_many", "tag");
        assert_eq!(habtm.join_table_name().as_deref(), Some("post_id_tag_id"));
        assert_eq!(
            RelationDeclaration::new("a", "belongs_to", "b").join_table_name(),
            None
        );
    }

    #[test]
    fn table_defaults_from_json() {
        let t: TableDefinition = serde_json::from_str(
            r#"{ "table_name": "todo", "columns": [{ "name": "title" }] }"#,
        )
        .unwrap();
        assert!(t.is_top_level);
        assert_eq!(t.columns[0].physical_name(), "title");
        assert_eq!(t.columns[0].column_type, "label");
        assert_eq!(t.default_permission, Permission::DEFAULT.bits());
    }
}
