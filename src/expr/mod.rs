//! Expression resolver: evaluates directive strings and attribute trees against a binding context.

mod directive;
mod script;

pub use directive::{AttributeTemplate, ContextPath, Directive, TemplateRef};
pub use script::{DisabledScripts, ScriptEvaluator};

use crate::error::{ResolveError, ScriptError};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct Resolver {
    scripts: Arc<dyn ScriptEvaluator>,
}

impl Default for Resolver {
    fn default() -> Self {
        Resolver::new(Arc::new(DisabledScripts))
    }
}

impl Resolver {
    pub fn new(scripts: Arc<dyn ScriptEvaluator>) -> Self {
        Resolver { scripts }
    }

    /// Parse and resolve one directive string.
    pub fn evaluate(&self, raw: &str, ctx: &Map<String, Value>) -> Result<Value, ResolveError> {
        self.resolve_directive(&Directive::parse(raw), ctx)
    }

    pub fn resolve_directive(&self, directive: &Directive, ctx: &Map<String, Value>) -> Result<Value, ResolveError> {
        match directive {
            Directive::Empty => Ok(Value::String(String::new())),
            Directive::Literal(s) => Ok(Value::String(s.clone())),
            Directive::Script(code) => Ok(self.scripts.evaluate(code, ctx)?),
            Directive::Path(path) => lookup(ctx, path),
            Directive::Template { raw, refs } => {
                let mut out = String::with_capacity(raw.len());
                let mut last = 0;
                for r in refs {
                    out.push_str(&raw[last..r.span.start]);
                    let value = lookup(ctx, &r.path).unwrap_or(Value::Null);
                    out.push_str(&stringify(&value));
                    last = r.span.end;
                }
                out.push_str(&raw[last..]);
                Ok(Value::String(out))
            }
        }
    }

    /// Resolve every leaf of an attribute tree.
    pub fn resolve(&self, template: &AttributeTemplate, ctx: &Map<String, Value>) -> Result<Value, ResolveError> {
        match template {
            AttributeTemplate::Directive(d) => self.resolve_directive(d, ctx),
            AttributeTemplate::Value(v) => Ok(v.clone()),
            AttributeTemplate::List(items) => items
                .iter()
                .map(|t| self.resolve(t, ctx))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            AttributeTemplate::Map(entries) => {
                let mut map = Map::with_capacity(entries.len());
                for (key, t) in entries {
                    map.insert(key.clone(), self.resolve(t, ctx)?);
                }
                Ok(Value::Object(map))
            }
        }
    }

    /// Like [`Resolver::resolve`], but trees containing scripts run on the blocking pool
    /// and fail with [`ScriptError::Timeout`] after `limit`.
    pub async fn resolve_bounded(
        &self,
        template: &AttributeTemplate,
        ctx: &Map<String, Value>,
        limit: Duration,
    ) -> Result<Value, ResolveError> {
        if !template.has_script() {
            return self.resolve(template, ctx);
        }
        let resolver = self.clone();
        let template = template.clone();
        let ctx = ctx.clone();
        let task = tokio::task::spawn_blocking(move || resolver.resolve(&template, &ctx));
        match tokio::time::timeout(limit, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(ScriptError::Failed(join.to_string()).into()),
            Err(_) => {
                tracing::warn!(limit_ms = limit.as_millis() as u64, "script evaluation timed out");
                Err(ScriptError::Timeout(limit.as_millis() as u64).into())
            }
        }
    }
}

/// Missing segments yield null; stepping into a non-object is an error.
fn lookup(ctx: &Map<String, Value>, path: &ContextPath) -> Result<Value, ResolveError> {
    let segments = path.segments();
    let Some((first, rest)) = segments.split_first() else {
        return Ok(Value::Null);
    };
    let mut current = match ctx.get(first) {
        Some(v) => v,
        None => return Ok(Value::Null),
    };
    for segment in rest {
        current = match current {
            Value::Null => return Ok(Value::Null),
            Value::Object(map) => match map.get(segment) {
                Some(v) => v,
                None => return Ok(Value::Null),
            },
            _ => {
                return Err(ResolveError::NotAnObject {
                    path: path.to_string(),
                    segment: segment.clone(),
                })
            }
        };
    }
    Ok(current.clone())
}

/// Template substitution text: strings raw, null empty, anything else as JSON.
fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    #[test]
    fn path_returns_value_itself() {
        let r = Resolver::default();
        assert_eq!(r.evaluate("~count", &ctx(json!({"count": 5}))).unwrap(), json!(5));
        assert_eq!(
            r.evaluate("~.reference_id", &ctx(json!({"subject": {"reference_id": "abc"}}))).unwrap(),
            json!("abc")
        );
    }

    #[test]
    fn template_substitutes_in_place() {
        let r = Resolver::default();
        let c = ctx(json!({"subject": {"reference_id": "abc", "n": 3}, "user": {"name": "Ada"}}));
        assert_eq!(r.evaluate("$.reference_id", &c).unwrap(), json!("abc"));
        assert_eq!(
            r.evaluate("Hi $user.name, #$.n of $user.missing!", &c).unwrap(),
            json!("Hi Ada, #3 of !")
        );
    }

    #[test]
    fn plain_and_empty_strings_resolve_unchanged() {
        let r = Resolver::default();
        let c = Map::new();
        assert_eq!(r.evaluate("hello world", &c).unwrap(), json!("hello world"));
        assert_eq!(r.evaluate("", &c).unwrap(), json!(""));
    }

    #[test]
    fn missing_segments_are_null_but_scalars_do_not_traverse() {
        let r = Resolver::default();
        let c = ctx(json!({"subject": {"name": "x"}}));
        assert_eq!(r.evaluate("~.owner.email", &c).unwrap(), Value::Null);
        assert_eq!(r.evaluate("~nothing.at.all", &c).unwrap(), Value::Null);
        let err = r.evaluate("~.name.first", &c).unwrap_err();
        assert_eq!(
            err,
            ResolveError::NotAnObject {
                path: "subject.name.first".into(),
                segment: "first".into()
            }
        );
        // templates never fail
        assert_eq!(r.evaluate("[$.name.first]", &c).unwrap(), json!("[]"));
    }

    #[test]
    fn scripts_receive_context_bindings() {
        let scripts = |code: &str, bindings: &Map<String, Value>| -> Result<Value, ScriptError> {
            match code {
                "count * 2" => Ok(json!(bindings["count"].as_i64().unwrap_or(0) * 2)),
                _ => Err(ScriptError::Failed(format!("cannot run {code}"))),
            }
        };
        let r = Resolver::new(Arc::new(scripts));
        let c = ctx(json!({"count": 4}));
        assert_eq!(r.evaluate("!count * 2", &c).unwrap(), json!(8));
        assert!(matches!(
            r.evaluate("!boom", &c),
            Err(ResolveError::Script(ScriptError::Failed(_)))
        ));
        assert_eq!(
            Resolver::default().evaluate("!1", &c),
            Err(ResolveError::Script(ScriptError::Disabled))
        );
    }

    #[test]
    fn trees_resolve_recursively() {
        let r = Resolver::default();
        let t = AttributeTemplate::compile(&json!({
            "title": "~title",
            "count": 2,
            "nested": {"who": "$user.name"},
            "list": ["~title", true]
        }));
        let c = ctx(json!({"title": "T", "user": {"name": "Ada"}}));
        assert_eq!(
            r.resolve(&t, &c).unwrap(),
            json!({"title": "T", "count": 2, "nested": {"who": "Ada"}, "list": ["T", true]})
        );
    }

    #[tokio::test]
    async fn slow_scripts_hit_the_timeout() {
        let scripts = |_: &str, _: &Map<String, Value>| -> Result<Value, ScriptError> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(Value::Null)
        };
        let r = Resolver::new(Arc::new(scripts));
        let t = AttributeTemplate::compile(&json!({"x": "!spin()"}));
        let err = r
            .resolve_bounded(&t, &Map::new(), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err, ResolveError::Script(ScriptError::Timeout(20)));

        let plain = AttributeTemplate::compile(&json!({"x": "~y"}));
        let ok = r
            .resolve_bounded(&plain, &ctx(json!({"y": 1})), Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(ok, json!({"x": 1}));
    }
}
