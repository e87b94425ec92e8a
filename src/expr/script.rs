//! Narrow interface to an embedded script engine.

use crate::error::ScriptError;
use serde_json::{Map, Value};

/// Evaluates `!` directives. `bindings` holds every top-level context key.
/// Implementations are synchronous; the executor runs them off the async workers under a timeout.
pub trait ScriptEvaluator: Send + Sync {
    fn evaluate(&self, code: &str, bindings: &Map<String, Value>) -> Result<Value, ScriptError>;
}

impl<F> ScriptEvaluator for F
where
    F: Fn(&str, &Map<String, Value>) -> Result<Value, ScriptError> + Send + Sync,
{
    fn evaluate(&self, code: &str, bindings: &Map<String, Value>) -> Result<Value, ScriptError> {
        self(code, bindings)
    }
}

/// Default evaluator: every script fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledScripts;

impl ScriptEvaluator for DisabledScripts {
    fn evaluate(&self, _code: &str, _bindings: &Map<String, Value>) -> Result<Value, ScriptError> {
        Err(ScriptError::Disabled)
    }
}
