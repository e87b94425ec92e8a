use serde_json::{Map, Value};

/// Binding tree for one invocation: `subject`, `user`, the action's inputs and each
/// outcome's result under its reference. Owned by the invocation, never shared.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExecutionContext {
    bindings: Map<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        ExecutionContext::default()
    }

    pub fn bind(&mut self, key: impl Into<String>, value: Value) {
        self.bindings.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.bindings.get(key)
    }

    pub fn subject(&self) -> Option<&Value> {
        self.get("subject")
    }

    pub fn bindings(&self) -> &Map<String, Value> {
        &self.bindings
    }

    /// Bind a CRUD result under `reference`, or as the new `subject` when the reference is empty.
    pub fn bind_result(&mut self, reference: &str, value: Value) {
        if reference.is_empty() {
            self.bind("subject", value);
        } else {
            self.bind(reference, value);
        }
    }

    /// Bind a performer's response attributes as a list under `reference` and each item
    /// under `reference[i]`. Nothing is bound for an empty reference.
    pub fn bind_list(&mut self, reference: &str, items: Vec<Value>) {
        if reference.is_empty() {
            return;
        }
        for (i, item) in items.iter().enumerate() {
            self.bind(format!("{}[{}]", reference, i), item.clone());
        }
        self.bind(reference, Value::Array(items));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_reference_rebinds_subject() {
        let mut ctx = ExecutionContext::new();
        ctx.bind("subject", json!({"id": 1}));
        ctx.bind_result("order", json!({"id": 2}));
        ctx.bind_result("", json!({"id": 3}));
        assert_eq!(ctx.get("order"), Some(&json!({"id": 2})));
        assert_eq!(ctx.subject(), Some(&json!({"id": 3})));
    }

    #[test]
    fn lists_bind_indexed_entries() {
        let mut ctx = ExecutionContext::new();
        ctx.bind_list("rows", vec![json!({"a": 1}), json!({"a": 2})]);
        assert_eq!(ctx.get("rows[1]"), Some(&json!({"a": 2})));
        assert_eq!(ctx.get("rows"), Some(&json!([{"a": 1}, {"a": 2}])));
        ctx.bind_list("", vec![json!(1)]);
        assert_eq!(ctx.bindings().len(), 3);
    }
}
