//! Client-facing responses produced by an invocation.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// Fixed kinds an ACTIONRESPONSE outcome may produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    Notify,
    Redirect,
    StoreSet,
    Error,
}

impl ResponseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseKind::Notify => "client.notify",
            ResponseKind::Redirect => "client.redirect",
            ResponseKind::StoreSet => "client.store.set",
            ResponseKind::Error => "error",
        }
    }
}

impl FromStr for ResponseKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client.notify" => Ok(ResponseKind::Notify),
            "client.redirect" => Ok(ResponseKind::Redirect),
            "client.store.set" => Ok(ResponseKind::StoreSet),
            "error" => Ok(ResponseKind::Error),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{ "ResponseType": ..., "Attributes": ... }` on the wire.
/// Performers may emit response types outside [`ResponseKind`], so the type stays a string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    #[serde(rename = "ResponseType")]
    pub response_type: String,
    #[serde(rename = "Attributes")]
    pub attributes: Value,
}

impl ActionResponse {
    pub fn new(response_type: &str, attributes: Value) -> Self {
        ActionResponse {
            response_type: response_type.to_string(),
            attributes,
        }
    }

    pub fn of_kind(kind: ResponseKind, attributes: Value) -> Self {
        ActionResponse::new(kind.as_str(), attributes)
    }

    /// `client.notify` with `{ type, message, title }`.
    pub fn notify(notification_type: &str, message: &str, title: &str) -> Self {
        ActionResponse::of_kind(
            ResponseKind::Notify,
            json!({ "type": notification_type, "message": message, "title": title }),
        )
    }

    pub fn success(message: &str) -> Self {
        ActionResponse::notify("success", message, "Success")
    }

    pub fn failure(message: &str) -> Self {
        ActionResponse::notify("error", message, "Failed")
    }

    pub fn is_error(&self) -> bool {
        self.response_type == ResponseKind::Error.as_str()
            || (self.response_type == ResponseKind::Notify.as_str()
                && self.attributes.get("type").and_then(Value::as_str) == Some("error"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape() {
        let r = ActionResponse::success("Created order");
        assert_eq!(
            serde_json::to_value(&r).unwrap(),
            json!({
                "ResponseType": "client.notify",
                "Attributes": { "type": "success", "message": "Created order", "title": "Success" }
            })
        );
        assert!(!r.is_error());
        assert!(ActionResponse::failure("nope").is_error());
        assert!(ActionResponse::of_kind(ResponseKind::Error, json!({})).is_error());
    }

    #[test]
    fn kinds_parse() {
        assert_eq!("client.store.set".parse::<ResponseKind>(), Ok(ResponseKind::StoreSet));
        assert_eq!("client.toast".parse::<ResponseKind>(), Err("client.toast".to_string()));
    }
}
