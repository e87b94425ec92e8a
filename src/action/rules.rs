//! Validation and conformation tags for action inputs (`"required,email"`, `"trim,lower"`).

use crate::case::{to_camel_case, to_snake_case};
use crate::error::{ActionError, ConfigError};
use base64::Engine;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";
const URL_PATTERN: &str = r"^[a-zA-Z][a-zA-Z0-9+.\-]*://[^\s/?#]+\S*$";
const COLOR_PATTERN: &str = r"^(#([0-9a-fA-F]{3}|[0-9a-fA-F]{6})|rgba?\([^)]*\)|hsla?\([^)]*\))$";

fn email_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(EMAIL_PATTERN).ok()).as_ref()
}

fn url_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(URL_PATTERN).ok()).as_ref()
}

fn color_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(COLOR_PATTERN).ok()).as_ref()
}

fn matches(pattern: Option<&Regex>, s: &str) -> bool {
    pattern.map(|re| re.is_match(s)).unwrap_or(false)
}

#[derive(Clone, Debug, PartialEq)]
pub enum ValidationRule {
    Required,
    OmitEmpty,
    Gt(f64),
    Gte(f64),
    Lt(f64),
    Lte(f64),
    Len(f64),
    OneOf(Vec<String>),
    Email,
    Url,
    Uuid,
    Base64,
    Latitude,
    Longitude,
    IsColor,
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Number for numbers, length for strings, arrays and maps.
fn size(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => Some(s.chars().count() as f64),
        Value::Array(a) => Some(a.len() as f64),
        Value::Object(o) => Some(o.len() as f64),
        _ => None,
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl ValidationRule {
    pub fn parse(field: &str, tag: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidRule {
            field: field.to_string(),
            tag: tag.to_string(),
            reason: reason.to_string(),
        };
        let (name, param) = match tag.split_once('=') {
            Some((n, p)) => (n.trim(), Some(p.trim())),
            None => (tag.trim(), None),
        };
        let bound = || -> Result<f64, ConfigError> {
            param
                .and_then(|p| p.parse::<f64>().ok())
                .ok_or_else(|| invalid("expects a numeric parameter"))
        };
        Ok(match name {
            "required" => ValidationRule::Required,
            "omitempty" => ValidationRule::OmitEmpty,
            "gt" => ValidationRule::Gt(bound()?),
            "gte" | "min" => ValidationRule::Gte(bound()?),
            "lt" => ValidationRule::Lt(bound()?),
            "lte" | "max" => ValidationRule::Lte(bound()?),
            "len" => ValidationRule::Len(bound()?),
            "oneof" => {
                let options: Vec<String> = param.unwrap_or_default().split_whitespace().map(str::to_string).collect();
                if options.is_empty() {
                    return Err(invalid("expects space separated options"));
                }
                ValidationRule::OneOf(options)
            }
            "email" => ValidationRule::Email,
            "url" => ValidationRule::Url,
            "uuid" => ValidationRule::Uuid,
            "base64" => ValidationRule::Base64,
            "latitude" => ValidationRule::Latitude,
            "longitude" => ValidationRule::Longitude,
            "iscolor" => ValidationRule::IsColor,
            _ => return Err(invalid("unknown validation")),
        })
    }

    /// Ok or a message naming what the value must be. Absent values only fail `required`.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        if let ValidationRule::Required = self {
            return if is_empty(value) { Err("is required".into()) } else { Ok(()) };
        }
        if value.is_null() {
            return Ok(());
        }
        let ok = match self {
            ValidationRule::Required | ValidationRule::OmitEmpty => true,
            ValidationRule::Gt(n) => size(value).map(|s| s > *n).unwrap_or(false),
            ValidationRule::Gte(n) => size(value).map(|s| s >= *n).unwrap_or(false),
            ValidationRule::Lt(n) => size(value).map(|s| s < *n).unwrap_or(false),
            ValidationRule::Lte(n) => size(value).map(|s| s <= *n).unwrap_or(false),
            ValidationRule::Len(n) => size(value).map(|s| s == *n).unwrap_or(false),
            ValidationRule::OneOf(options) => match value {
                Value::String(s) => options.iter().any(|o| o == s),
                Value::Number(_) => options.iter().any(|o| o == &value.to_string()),
                _ => false,
            },
            ValidationRule::Email => value.as_str().map(|s| matches(email_pattern(), s)).unwrap_or(false),
            ValidationRule::Url => value.as_str().map(|s| matches(url_pattern(), s)).unwrap_or(false),
            ValidationRule::Uuid => value.as_str().map(|s| uuid::Uuid::parse_str(s).is_ok()).unwrap_or(false),
            // only string payloads are checked; structured file objects pass through
            ValidationRule::Base64 => match value.as_str() {
                Some(s) => {
                    let payload = s.split_once(',').map(|(_, p)| p).unwrap_or(s);
                    base64::engine::general_purpose::STANDARD.decode(payload).is_ok()
                }
                None => true,
            },
            ValidationRule::Latitude => numeric(value).map(|n| (-90.0..=90.0).contains(&n)).unwrap_or(false),
            ValidationRule::Longitude => numeric(value).map(|n| (-180.0..=180.0).contains(&n)).unwrap_or(false),
            ValidationRule::IsColor => value.as_str().map(|s| matches(color_pattern(), s)).unwrap_or(false),
        };
        if ok {
            return Ok(());
        }
        Err(match self {
            ValidationRule::Required | ValidationRule::OmitEmpty => "is required".to_string(),
            ValidationRule::Gt(n) => format!("must be greater than {}", n),
            ValidationRule::Gte(n) => format!("must be at least {}", n),
            ValidationRule::Lt(n) => format!("must be less than {}", n),
            ValidationRule::Lte(n) => format!("must be at most {}", n),
            ValidationRule::Len(n) => format!("must have length {}", n),
            ValidationRule::OneOf(options) => format!("must be one of [{}]", options.join(" ")),
            ValidationRule::Email => "must be a valid email address".to_string(),
            ValidationRule::Url => "must be a valid URL".to_string(),
            ValidationRule::Uuid => "must be a valid UUID".to_string(),
            ValidationRule::Base64 => "must be valid base64".to_string(),
            ValidationRule::Latitude => "must contain valid latitude coordinates".to_string(),
            ValidationRule::Longitude => "must contain valid longitude coordinates".to_string(),
            ValidationRule::IsColor => "must be a valid color".to_string(),
        })
    }
}

pub fn parse_validations(field: &str, tags: &str) -> Result<Vec<ValidationRule>, ConfigError> {
    tags.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| ValidationRule::parse(field, t))
        .collect()
}

/// Validation rules for one attribute. `when_present` rules (from semantic type defaults)
/// are skipped when the attribute is absent.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldValidation {
    pub column_name: String,
    pub rules: Vec<ValidationRule>,
    pub when_present: bool,
}

impl FieldValidation {
    pub fn check(&self, attributes: &Map<String, Value>) -> Result<(), ActionError> {
        let value = attributes.get(&self.column_name).unwrap_or(&Value::Null);
        if self.when_present && value.is_null() {
            return Ok(());
        }
        if self.rules.contains(&ValidationRule::OmitEmpty) && is_empty(value) {
            return Ok(());
        }
        for rule in &self.rules {
            rule.check(value).map_err(|message| ActionError::Validation {
                field: self.column_name.clone(),
                message,
            })?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Conformation {
    Trim,
    LTrim,
    RTrim,
    Lower,
    Upper,
    Title,
    Email,
    Name,
    Snake,
    Camel,
    Num,
    Alpha,
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

impl Conformation {
    pub fn parse(field: &str, tag: &str) -> Result<Self, ConfigError> {
        Ok(match tag.trim() {
            "trim" => Conformation::Trim,
            "ltrim" => Conformation::LTrim,
            "rtrim" => Conformation::RTrim,
            "lower" => Conformation::Lower,
            "upper" => Conformation::Upper,
            "title" => Conformation::Title,
            "email" => Conformation::Email,
            "name" => Conformation::Name,
            "snake" => Conformation::Snake,
            "camel" => Conformation::Camel,
            "num" => Conformation::Num,
            "alpha" => Conformation::Alpha,
            other => {
                return Err(ConfigError::InvalidRule {
                    field: field.to_string(),
                    tag: other.to_string(),
                    reason: "unknown conformation".into(),
                })
            }
        })
    }

    pub fn apply(&self, s: &str) -> String {
        match self {
            Conformation::Trim => s.trim().to_string(),
            Conformation::LTrim => s.trim_start().to_string(),
            Conformation::RTrim => s.trim_end().to_string(),
            Conformation::Lower => s.to_lowercase(),
            Conformation::Upper => s.to_uppercase(),
            Conformation::Title => title_case(s),
            Conformation::Email => s.trim().to_lowercase(),
            Conformation::Name => title_case(s.trim()),
            Conformation::Snake => {
                let words: Vec<String> = s
                    .split(|c: char| c.is_whitespace() || c == '-')
                    .filter(|w| !w.is_empty())
                    .map(|w| to_snake_case(w).to_lowercase())
                    .collect();
                words.join("_")
            }
            Conformation::Camel => to_camel_case(&Conformation::Snake.apply(s)),
            Conformation::Num => s.chars().filter(char::is_ascii_digit).collect(),
            Conformation::Alpha => s.chars().filter(|c| c.is_alphabetic()).collect(),
        }
    }
}

pub fn parse_conformations(field: &str, tags: &str) -> Result<Vec<Conformation>, ConfigError> {
    tags.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| Conformation::parse(field, t))
        .collect()
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldConformation {
    pub column_name: String,
    pub steps: Vec<Conformation>,
}

impl FieldConformation {
    /// Rewrite the attribute in place when it is a string.
    pub fn apply(&self, attributes: &mut Map<String, Value>) {
        if let Some(Value::String(s)) = attributes.get_mut(&self.column_name) {
            *s = self.steps.iter().fold(std::mem::take(s), |acc, step| step.apply(&acc));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn patterns_compile_once() {
        for pattern in [email_pattern(), url_pattern(), color_pattern()] {
            assert!(pattern.is_some());
        }
        assert!(std::ptr::eq(email_pattern().unwrap(), email_pattern().unwrap()));
        assert!(matches(email_pattern(), "a@b.io"));
        assert!(!matches(url_pattern(), "not a url"));
        assert!(matches(color_pattern(), "#fff"));
    }

    fn attrs(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    #[test]
    fn numeric_bounds_and_sizes() {
        let rules = parse_validations("count", "required,gt=0,max=100").unwrap();
        let v = FieldValidation {
            column_name: "count".into(),
            rules,
            when_present: false,
        };
        assert!(v.check(&attrs(json!({"count": 5}))).is_ok());
        let err = v.check(&attrs(json!({"count": 0}))).unwrap_err();
        assert_eq!(err.to_string(), "count: must be greater than 0");
        assert!(v.check(&attrs(json!({"count": 101}))).is_err());
        assert_eq!(v.check(&attrs(json!({}))).unwrap_err().to_string(), "count: is required");

        assert!(ValidationRule::Len(3.0).check(&json!("abc")).is_ok());
        assert!(ValidationRule::Gte(2.0).check(&json!([1])).is_err());
    }

    #[test]
    fn formats() {
        assert!(ValidationRule::Email.check(&json!("ada@example.com")).is_ok());
        assert!(ValidationRule::Email.check(&json!("ada@")).is_err());
        assert!(ValidationRule::Url.check(&json!("https://example.com/x?y=1")).is_ok());
        assert!(ValidationRule::Url.check(&json!("example.com")).is_err());
        assert!(ValidationRule::Uuid.check(&json!("1f0b5f0e-8c42-4c1e-9d1c-3d1b2f3e4a5b")).is_ok());
        assert!(ValidationRule::Base64.check(&json!("data:application/json;base64,e30K")).is_ok());
        assert!(ValidationRule::Base64.check(&json!("not base64!")).is_err());
        assert!(ValidationRule::Latitude.check(&json!("45.5")).is_ok());
        assert!(ValidationRule::Longitude.check(&json!(200)).is_err());
        assert!(ValidationRule::IsColor.check(&json!("#a0b1c2")).is_ok());
        assert!(ValidationRule::IsColor.check(&json!("blue-ish")).is_err());
        assert!(ValidationRule::OneOf(vec!["a".into(), "b".into()]).check(&json!("b")).is_ok());
        assert!(ValidationRule::Email.check(&Value::Null).is_ok());
    }

    #[test]
    fn type_defaults_apply_only_when_present() {
        let v = FieldValidation {
            column_name: "name".into(),
            rules: vec![ValidationRule::Required],
            when_present: true,
        };
        assert!(v.check(&Map::new()).is_ok());
        assert!(v.check(&attrs(json!({"name": ""}))).is_err());
    }

    #[test]
    fn unknown_tags_are_config_errors() {
        assert!(matches!(
            parse_validations("x", "required,shiny"),
            Err(ConfigError::InvalidRule { ref tag, .. }) if tag == "shiny"
        ));
        assert!(parse_validations("x", "gt=abc").is_err());
        assert!(parse_conformations("x", "trim,sparkle").is_err());
        assert!(parse_validations("x", "").unwrap().is_empty());
    }

    #[test]
    fn conformations_rewrite_strings() {
        let c = FieldConformation {
            column_name: "email".into(),
            steps: parse_conformations("email", "trim,email").unwrap(),
        };
        let mut a = attrs(json!({"email": "  Ada@Example.COM ", "n": 1}));
        c.apply(&mut a);
        assert_eq!(a["email"], json!("ada@example.com"));

        assert_eq!(Conformation::Name.apply("  ada LOVELACE "), "Ada Lovelace");
        assert_eq!(Conformation::Snake.apply("Order Total"), "order_total");
        assert_eq!(Conformation::Snake.apply("orderTotal"), "order_total");
        assert_eq!(Conformation::Camel.apply("order total"), "orderTotal");
        assert_eq!(Conformation::Num.apply("+1 (555) 010"), "1555010");
        assert_eq!(Conformation::Alpha.apply("a1b2"), "ab");
    }
}
