//! Typed errors and HTTP mapping.

use crate::action::ActionResponse;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Malformed declarations. Compilation reports these and skips the offending item.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("duplicate {kind}: {name}")]
    Duplicate { kind: &'static str, name: String },
    #[error("unknown relation kind '{relation}' in [{declaration}]")]
    UnknownRelationKind { relation: String, declaration: String },
    #[error("relation [{0}] needs distinct subject_name and object_name")]
    AmbiguousJoinColumns(String),
    #[error("action {action}: unknown outcome method '{method}'")]
    UnknownOutcomeMethod { action: String, method: String },
    #[error("action {action}: unknown response kind '{kind}'")]
    UnknownResponseKind { action: String, kind: String },
    #[error("invalid rule '{tag}' for {field}: {reason}")]
    InvalidRule { field: String, tag: String, reason: String },
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Data-access collaborator failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unknown entity type: {0}")]
    UnknownEntity(String),
    #[error("{entity} '{reference_id}' not found")]
    NotFound { entity: String, reference_id: String },
    #[error("{0}")]
    Invalid(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

/// Failure of an embedded `!` script.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    #[error("scripting is disabled")]
    Disabled,
    #[error("script timed out after {0} ms")]
    Timeout(u64),
    #[error("script failed: {0}")]
    Failed(String),
}

/// Failure resolving a directive against an execution context.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error("path '{path}' traverses non-object value at '{segment}'")]
    NotAnObject { path: String, segment: String },
    #[error(transparent)]
    Script(#[from] ScriptError),
}

/// Errors reported by a performer alongside its responses.
#[derive(Error, Debug)]
pub enum PerformerError {
    #[error("missing field '{0}'")]
    MissingField(String),
    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Failed(String),
}

/// Invocation failures, grouped the way callers handle them.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("action {action} not found on {entity_type}")]
    UnknownAction { entity_type: String, action: String },
    #[error("action {0} requires a subject instance")]
    SubjectRequired(String),
    #[error("Field {0} cannot be blank")]
    FieldRequired(String),
    #[error("{field}: {message}")]
    Validation { field: String, message: String },
    #[error("forbidden: {0}")]
    Unauthorized(String),
    #[error("outcome {target} failed: {message}")]
    Outcome { target: String, message: String },
    #[error("outcome {target}: {source}")]
    Directive {
        target: String,
        #[source]
        source: ResolveError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invocation cancelled")]
    Cancelled,
}

impl ActionError {
    pub fn code(&self) -> &'static str {
        match self {
            ActionError::UnknownAction { .. } => "not_found",
            ActionError::SubjectRequired(_) => "subject_required",
            ActionError::FieldRequired(_) => "field_required",
            ActionError::Validation { .. } => "validation-failed",
            ActionError::Unauthorized(_) => "forbidden",
            ActionError::Outcome { .. } => "outcome_failed",
            ActionError::Directive { source: ResolveError::Script(_), .. } => "script_failed",
            ActionError::Directive { .. } => "directive_failed",
            ActionError::Store(StoreError::NotFound { .. }) => "not_found",
            ActionError::Store(_) => "store_error",
            ActionError::Cancelled => "cancelled",
        }
    }

    /// True when the error stopped the action before any outcome ran.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            ActionError::UnknownAction { .. }
                | ActionError::SubjectRequired(_)
                | ActionError::FieldRequired(_)
                | ActionError::Validation { .. }
                | ActionError::Unauthorized(_)
                | ActionError::Store(_)
        )
    }
}

/// Error plus the responses accumulated before it occurred.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct ActionFailure {
    pub error: ActionError,
    pub responses: Vec<ActionResponse>,
}

impl ActionFailure {
    pub fn before_outcomes(error: ActionError) -> Self {
        ActionFailure {
            error,
            responses: Vec::new(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal: {0}")]
    Internal(String),
    #[error(transparent)]
    Action(#[from] ActionFailure),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Config(ConfigError::Validation(_)) => (StatusCode::BAD_REQUEST, "config_error"),
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AppError::Db(e) => {
                if let sqlx::Error::RowNotFound = e {
                    (StatusCode::NOT_FOUND, "not_found")
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            }
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            AppError::Action(failure) => {
                let status = match &failure.error {
                    ActionError::UnknownAction { .. } => StatusCode::NOT_FOUND,
                    ActionError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
                    ActionError::Store(StoreError::Db(_)) => StatusCode::INTERNAL_SERVER_ERROR,
                    ActionError::Unauthorized(_) => StatusCode::FORBIDDEN,
                    e if e.is_precondition() => StatusCode::BAD_REQUEST,
                    ActionError::Cancelled => StatusCode::REQUEST_TIMEOUT,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, failure.error.code())
            }
        };
        let details = match &self {
            AppError::Action(failure) if !failure.responses.is_empty() => {
                serde_json::to_value(&failure.responses).ok()
            }
            _ => None,
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}
