//! Directive strings, decoded once when actions are loaded.
//!
//! - `!code`: script, evaluated with every context key bound as a global
//! - `~a.b`: path lookup returning the value itself
//! - anything else: literal text in which each `$a.b` reference is replaced by its value
//!
//! A leading empty segment (`~.x`, `$.x`) names `subject`.

use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::ops::Range;
use std::sync::OnceLock;

const TEMPLATE_PATTERN: &str = r"\$([a-zA-Z0-9_\[\]]+)?(\.[a-zA-Z0-9_]+)+";

fn template_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(TEMPLATE_PATTERN).ok()).as_ref()
}

/// Dotted path into the execution context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextPath(Vec<String>);

impl ContextPath {
    pub fn parse(path: &str) -> Self {
        let mut segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if let Some(first) = segments.first_mut().filter(|s| s.is_empty()) {
            *first = "subject".to_string();
        }
        ContextPath(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for ContextPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// One `$path` occurrence inside a template string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplateRef {
    pub span: Range<usize>,
    pub path: ContextPath,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Directive {
    Empty,
    Script(String),
    Path(ContextPath),
    Template { raw: String, refs: Vec<TemplateRef> },
    Literal(String),
}

impl Directive {
    pub fn parse(raw: &str) -> Self {
        if raw.is_empty() {
            return Directive::Empty;
        }
        if let Some(code) = raw.strip_prefix('!') {
            return Directive::Script(code.to_string());
        }
        if let Some(path) = raw.strip_prefix('~') {
            return Directive::Path(ContextPath::parse(path));
        }
        let refs: Vec<TemplateRef> = template_pattern()
            .map(|re| {
                re.find_iter(raw)
                    .map(|m| TemplateRef {
                        span: m.range(),
                        path: ContextPath::parse(&m.as_str()[1..]),
                    })
                    .collect()
            })
            .unwrap_or_default();
        if refs.is_empty() {
            Directive::Literal(raw.to_string())
        } else {
            Directive::Template {
                raw: raw.to_string(),
                refs,
            }
        }
    }

    pub fn is_script(&self) -> bool {
        matches!(self, Directive::Script(_))
    }
}

/// Outcome attribute tree with every string leaf decoded into a [`Directive`].
/// Non-string scalars are kept as values.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeTemplate {
    Directive(Directive),
    Map(Vec<(String, AttributeTemplate)>),
    List(Vec<AttributeTemplate>),
    Value(Value),
}

impl AttributeTemplate {
    pub fn compile(value: &Value) -> Self {
        match value {
            Value::String(s) => AttributeTemplate::Directive(Directive::parse(s)),
            Value::Object(map) => AttributeTemplate::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), AttributeTemplate::compile(v)))
                    .collect(),
            ),
            Value::Array(items) => AttributeTemplate::List(items.iter().map(AttributeTemplate::compile).collect()),
            other => AttributeTemplate::Value(other.clone()),
        }
    }

    pub fn empty() -> Self {
        AttributeTemplate::Map(Vec::new())
    }

    /// Whether resolving this tree runs any script.
    pub fn has_script(&self) -> bool {
        match self {
            AttributeTemplate::Directive(d) => d.is_script(),
            AttributeTemplate::Map(entries) => entries.iter().any(|(_, t)| t.has_script()),
            AttributeTemplate::List(items) => items.iter().any(AttributeTemplate::has_script),
            AttributeTemplate::Value(_) => false,
        }
    }
}

impl Default for AttributeTemplate {
    fn default() -> Self {
        AttributeTemplate::empty()
    }
}
