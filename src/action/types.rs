//! Runtime action model, decoded once from config.

use crate::action::response::ResponseKind;
use crate::action::rules::{FieldConformation, FieldValidation};
use crate::error::ConfigError;
use crate::expr::AttributeTemplate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Declared input of an action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InField {
    /// Display name, used in error messages.
    pub name: String,
    /// Attribute key the value is read from and bound under.
    #[serde(default)]
    pub column_name: String,
    #[serde(default = "default_in_field_type")]
    pub column_type: String,
    #[serde(default)]
    pub is_nullable: bool,
    #[serde(default)]
    pub default_value: String,
}

fn default_in_field_type() -> String {
    "label".into()
}

impl InField {
    pub fn key(&self) -> &str {
        if self.column_name.is_empty() {
            &self.name
        } else {
            &self.column_name
        }
    }

    /// Declared default as a value: JSON when it parses, else the raw string.
    pub fn default(&self) -> Option<Value> {
        if self.default_value.is_empty() {
            return None;
        }
        Some(serde_json::from_str(&self.default_value).unwrap_or_else(|_| Value::String(self.default_value.clone())))
    }
}

/// `{ column_name, tags }`: comma separated validation or conformation tags for one attribute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnTag {
    pub column_name: String,
    pub tags: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutcomeMethod {
    Post,
    Update,
    Delete,
    Execute,
    ActionResponse(ResponseKind),
}

impl OutcomeMethod {
    /// Decode `method`; for ACTIONRESPONSE the outcome target names the response kind.
    pub fn decode(action: &str, method: &str, target: &str) -> Result<Self, ConfigError> {
        match method.to_ascii_uppercase().as_str() {
            "POST" => Ok(OutcomeMethod::Post),
            "UPDATE" => Ok(OutcomeMethod::Update),
            "DELETE" => Ok(OutcomeMethod::Delete),
            "EXECUTE" => Ok(OutcomeMethod::Execute),
            "ACTIONRESPONSE" => target
                .parse()
                .map(OutcomeMethod::ActionResponse)
                .map_err(|kind| ConfigError::UnknownResponseKind {
                    action: action.to_string(),
                    kind,
                }),
            _ => Err(ConfigError::UnknownOutcomeMethod {
                action: action.to_string(),
                method: method.to_string(),
            }),
        }
    }
}

impl fmt::Display for OutcomeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeMethod::Post => f.write_str("POST"),
            OutcomeMethod::Update => f.write_str("UPDATE"),
            OutcomeMethod::Delete => f.write_str("DELETE"),
            OutcomeMethod::Execute => f.write_str("EXECUTE"),
            OutcomeMethod::ActionResponse(kind) => write!(f, "ACTIONRESPONSE({})", kind),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Outcome {
    /// Entity type for CRUD methods, performer name for EXECUTE, response kind for ACTIONRESPONSE.
    pub target: String,
    pub method: OutcomeMethod,
    /// Context key the result is bound under; empty rebinds `subject` for CRUD results.
    pub reference: String,
    pub attributes: AttributeTemplate,
}

#[derive(Clone, Debug)]
pub struct ActionDefinition {
    pub name: String,
    pub label: String,
    pub on_type: String,
    pub instance_optional: bool,
    pub in_fields: Vec<InField>,
    pub validations: Vec<FieldValidation>,
    pub conformations: Vec<FieldConformation>,
    pub outcomes: Vec<Outcome>,
}

impl ActionDefinition {
    pub fn key(&self) -> String {
        catalog_key(&self.on_type, &self.name)
    }
}

fn catalog_key(entity_type: &str, action: &str) -> String {
    format!("{}:{}", entity_type, action)
}

/// Actions by `<entity type>:<action name>`.
#[derive(Clone, Debug, Default)]
pub struct ActionCatalog {
    actions: HashMap<String, Arc<ActionDefinition>>,
}

impl ActionCatalog {
    pub fn insert(&mut self, action: ActionDefinition) -> Result<(), ConfigError> {
        let key = action.key();
        if self.actions.contains_key(&key) {
            return Err(ConfigError::Duplicate { kind: "action", name: key });
        }
        self.actions.insert(key, Arc::new(action));
        Ok(())
    }

    pub fn get(&self, entity_type: &str, action: &str) -> Option<Arc<ActionDefinition>> {
        self.actions.get(&catalog_key(entity_type, action)).cloned()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActionDefinition> {
        self.actions.values().map(|a| a.as_ref())
    }
}
