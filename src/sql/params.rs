//! JSON values as bind parameters. Every value binds as text and is cast in SQL to the column type.

use serde_json::Value;

/// Text form of a parameter; `None` binds NULL.
pub fn text_param(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => Some(v.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_forms() {
        assert_eq!(text_param(&json!(null)), None);
        assert_eq!(text_param(&json!("a")).as_deref(), Some("a"));
        assert_eq!(text_param(&json!(true)).as_deref(), Some("true"));
        assert_eq!(text_param(&json!(1.5)).as_deref(), Some("1.5"));
        assert_eq!(text_param(&json!({"k": [1]})).as_deref(), Some(r#"{"k":[1]}"#));
    }
}
