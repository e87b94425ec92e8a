//! `POST /action/:typename/:action_name`.

use crate::action::{ActionInvocation, CancelHandle, CancelSignal};
use crate::error::AppError;
use crate::extractors::Caller;
use crate::response::success_many_ok;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Default, Deserialize)]
pub struct ActionRequest {
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Subject row; `<typename>_id` in `attributes` is used when absent.
    #[serde(default)]
    pub subject_reference_id: Option<String>,
}

/// Cancels the spawned invocation when the request future is dropped.
struct CancelOnDrop(CancelHandle);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

pub async fn invoke_action(
    State(state): State<AppState>,
    Path((typename, action_name)): Path<(String, String)>,
    Caller(caller): Caller,
    Json(body): Json<ActionRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let mut invocation = ActionInvocation::new(&typename, &action_name, caller).with_attributes(body.attributes);
    if let Some(subject) = body.subject_reference_id.as_deref().filter(|s| !s.is_empty()) {
        invocation = invocation.with_subject(subject);
    }

    let snapshot = state.snapshot();
    let executor = state.executor.clone();
    let (handle, signal): (CancelHandle, CancelSignal) = CancelSignal::pair();
    let _guard = CancelOnDrop(handle);
    let task = tokio::spawn(async move { executor.invoke(&snapshot, invocation, &signal).await });
    let responses = task
        .await
        .map_err(|e| AppError::Internal(format!("action task failed: {}", e)))??;
    Ok(success_many_ok(responses))
}
