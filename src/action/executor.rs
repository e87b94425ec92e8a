//! Runs one action invocation: gates, input preparation, then the outcome chain in order.
//!
//! The chain stops at the first failing outcome. Earlier outcomes keep their effects; the
//! failure carries every response produced so far.

use crate::action::access::{CallerIdentity, CancelSignal, CapabilityChecker, EntityStore};
use crate::action::context::ExecutionContext;
use crate::action::response::ActionResponse;
use crate::action::types::{ActionDefinition, Outcome, OutcomeMethod};
use crate::config::EngineSnapshot;
use crate::error::{ActionError, ActionFailure, StoreError};
use crate::expr::{Resolver, ScriptEvaluator};
use crate::performer::{PerformerRegistry, PerformerRequest};
use crate::schema::USER_TABLE;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_millis(2000);

#[derive(Clone, Debug)]
pub struct ActionInvocation {
    pub entity_type: String,
    pub action_name: String,
    /// Subject row; falls back to the `<entity_type>_id` attribute.
    pub subject_reference_id: Option<String>,
    pub attributes: Map<String, Value>,
    pub caller: CallerIdentity,
}

impl ActionInvocation {
    pub fn new(entity_type: &str, action_name: &str, caller: CallerIdentity) -> Self {
        ActionInvocation {
            entity_type: entity_type.to_string(),
            action_name: action_name.to_string(),
            subject_reference_id: None,
            attributes: Map::new(),
            caller,
        }
    }

    pub fn with_subject(mut self, reference_id: &str) -> Self {
        self.subject_reference_id = Some(reference_id.to_string());
        self
    }

    pub fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }

    fn subject_reference(&self) -> Option<String> {
        self.subject_reference_id.clone().or_else(|| {
            self.attributes
                .get(&format!("{}_id", self.entity_type))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
    }
}

#[derive(Clone, Copy)]
enum Crud {
    Create,
    Update,
    Delete,
}

impl Crud {
    fn verb(&self) -> (&'static str, &'static str) {
        match self {
            Crud::Create => ("Created", "create"),
            Crud::Update => ("Updated", "update"),
            Crud::Delete => ("Deleted", "delete"),
        }
    }
}

/// Run `fut` unless the invocation is cancelled first.
async fn guard<F: Future>(cancel: &CancelSignal, fut: F) -> Result<F::Output, ActionError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ActionError::Cancelled),
        out = fut => Ok(out),
    }
}

fn fail(error: ActionError, responses: Vec<ActionResponse>) -> ActionFailure {
    ActionFailure { error, responses }
}

fn take_reference_id(attributes: &mut Map<String, Value>) -> Result<String, StoreError> {
    match attributes.remove("reference_id") {
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        _ => Err(StoreError::Invalid("reference_id is required".into())),
    }
}

#[derive(Clone)]
pub struct OutcomeExecutor {
    store: Arc<dyn EntityStore>,
    capabilities: Arc<dyn CapabilityChecker>,
    performers: Arc<PerformerRegistry>,
    resolver: Resolver,
    script_timeout: Duration,
}

impl OutcomeExecutor {
    pub fn new(
        store: Arc<dyn EntityStore>,
        capabilities: Arc<dyn CapabilityChecker>,
        performers: Arc<PerformerRegistry>,
    ) -> Self {
        OutcomeExecutor {
            store,
            capabilities,
            performers,
            resolver: Resolver::default(),
            script_timeout: DEFAULT_SCRIPT_TIMEOUT,
        }
    }

    pub fn with_scripts(mut self, scripts: Arc<dyn ScriptEvaluator>) -> Self {
        self.resolver = Resolver::new(scripts);
        self
    }

    pub fn with_script_timeout(mut self, timeout: Duration) -> Self {
        self.script_timeout = timeout;
        self
    }

    pub async fn invoke(
        &self,
        snapshot: &EngineSnapshot,
        invocation: ActionInvocation,
        cancel: &CancelSignal,
    ) -> Result<Vec<ActionResponse>, ActionFailure> {
        let action = snapshot
            .actions
            .get(&invocation.entity_type, &invocation.action_name)
            .ok_or_else(|| {
                ActionFailure::before_outcomes(ActionError::UnknownAction {
                    entity_type: invocation.entity_type.clone(),
                    action: invocation.action_name.clone(),
                })
            })?;
        tracing::info!(entity_type = %invocation.entity_type, action = %action.name, "invoke action");

        let ctx = self
            .prepare(snapshot, &action, &invocation, cancel)
            .await
            .map_err(|e| {
                tracing::info!(action = %action.name, error = %e, "action rejected");
                ActionFailure::before_outcomes(e)
            })?;
        self.run_outcomes(snapshot, &action, &invocation, ctx, cancel).await
    }

    /// Gates and inputs: capability, subject, required fields, validations, conformations.
    async fn prepare(
        &self,
        snapshot: &EngineSnapshot,
        action: &ActionDefinition,
        invocation: &ActionInvocation,
        cancel: &CancelSignal,
    ) -> Result<ExecutionContext, ActionError> {
        let caller = &invocation.caller;
        let entity_type = invocation.entity_type.as_str();
        let allowed = guard(cancel, self.capabilities.can_execute_action(caller, entity_type, &action.name)).await?;
        if !allowed {
            return Err(ActionError::Unauthorized(format!("{}:{}", entity_type, action.name)));
        }

        let subject = match invocation.subject_reference() {
            Some(reference_id) => {
                let table = snapshot
                    .schema
                    .table(entity_type)
                    .ok_or_else(|| StoreError::UnknownEntity(entity_type.to_string()))?;
                let row = guard(cancel, self.store.find_by_reference_id(table, &reference_id))
                    .await??
                    .ok_or_else(|| StoreError::NotFound {
                        entity: entity_type.to_string(),
                        reference_id: reference_id.clone(),
                    })?;
                if !guard(cancel, self.capabilities.can_execute_row(caller, entity_type, &row)).await? {
                    return Err(ActionError::Unauthorized(format!("{} {}", entity_type, reference_id)));
                }
                Some((reference_id, row))
            }
            None => None,
        };
        if subject.is_none() && !action.instance_optional {
            return Err(ActionError::SubjectRequired(action.name.clone()));
        }

        let mut attributes = invocation.attributes.clone();
        for field in &action.in_fields {
            let key = field.key();
            if attributes.contains_key(key) {
                continue;
            }
            if let Some(default) = field.default() {
                attributes.insert(key.to_string(), default);
            } else if !field.is_nullable {
                return Err(ActionError::FieldRequired(field.name.clone()));
            }
        }
        for validation in &action.validations {
            validation.check(&attributes)?;
        }
        for conformation in &action.conformations {
            conformation.apply(&mut attributes);
        }

        let mut ctx = ExecutionContext::new();
        for field in &action.in_fields {
            if let Some(value) = attributes.get(field.key()) {
                ctx.bind(field.key(), value.clone());
            }
        }
        if let (Some(user_ref), Some(users)) = (&caller.user_reference_id, snapshot.schema.table(USER_TABLE)) {
            match guard(cancel, self.store.find_by_reference_id(users, user_ref)).await? {
                Ok(Some(user)) => ctx.bind("user", user),
                Ok(None) => tracing::warn!(user = %user_ref, "caller user not found"),
                Err(e) => tracing::warn!(user = %user_ref, error = %e, "failed to load caller user"),
            }
        }
        if let Some((reference_id, row)) = subject {
            ctx.bind(format!("{}_id", entity_type), Value::String(reference_id));
            ctx.bind("subject", row);
        }
        Ok(ctx)
    }

    async fn run_outcomes(
        &self,
        snapshot: &EngineSnapshot,
        action: &ActionDefinition,
        invocation: &ActionInvocation,
        mut ctx: ExecutionContext,
        cancel: &CancelSignal,
    ) -> Result<Vec<ActionResponse>, ActionFailure> {
        let mut responses = Vec::new();
        for (index, outcome) in action.outcomes.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(action = %action.name, index, "invocation cancelled");
                return Err(fail(ActionError::Cancelled, responses));
            }
            tracing::debug!(action = %action.name, index, target = %outcome.target, method = %outcome.method, "outcome");

            let resolved = match guard(
                cancel,
                self.resolver
                    .resolve_bounded(&outcome.attributes, ctx.bindings(), self.script_timeout),
            )
            .await
            {
                Err(e) => return Err(fail(e, responses)),
                Ok(Err(source)) => {
                    tracing::error!(target = %outcome.target, error = %source, "failed to build outcome");
                    responses.push(ActionResponse::failure(&format!("Failed to build outcome {}", outcome.target)));
                    return Err(fail(
                        ActionError::Directive {
                            target: outcome.target.clone(),
                            source,
                        },
                        responses,
                    ));
                }
                Ok(Ok(v)) => v,
            };
            let attributes = match resolved {
                Value::Object(map) => map,
                Value::Null => Map::new(),
                other => {
                    let mut map = Map::new();
                    map.insert("value".into(), other);
                    map
                }
            };

            match outcome.method {
                OutcomeMethod::Post | OutcomeMethod::Update | OutcomeMethod::Delete => {
                    let op = match outcome.method {
                        OutcomeMethod::Update => Crud::Update,
                        OutcomeMethod::Delete => Crud::Delete,
                        _ => Crud::Create,
                    };
                    let (done, verb) = op.verb();
                    match self.crud(snapshot, outcome, op, attributes, cancel).await {
                        Ok(row) => {
                            responses.push(ActionResponse::success(&format!("{} {}", done, outcome.target)));
                            ctx.bind_result(&outcome.reference, row);
                        }
                        Err(ActionError::Cancelled) => return Err(fail(ActionError::Cancelled, responses)),
                        Err(e) => {
                            tracing::error!(target = %outcome.target, error = %e, "outcome failed");
                            responses.push(ActionResponse::failure(&format!(
                                "Failed to {} {}. {}",
                                verb, outcome.target, e
                            )));
                            return Err(fail(
                                ActionError::Outcome {
                                    target: outcome.target.clone(),
                                    message: e.to_string(),
                                },
                                responses,
                            ));
                        }
                    }
                }
                OutcomeMethod::Execute => {
                    let Some(performer) = self.performers.get(&outcome.target) else {
                        tracing::warn!(performer = %outcome.target, "no performer registered, outcome skipped");
                        continue;
                    };
                    let executed = {
                        let request = PerformerRequest {
                            invocation,
                            context: ctx.bindings(),
                            schema: &snapshot.schema,
                        };
                        guard(cancel, performer.execute(&request, &attributes)).await
                    };
                    let (produced, errors) = match executed {
                        Ok(out) => out,
                        Err(e) => return Err(fail(e, responses)),
                    };
                    let items: Vec<Value> = produced.iter().map(|r| r.attributes.clone()).collect();
                    responses.extend(produced);
                    if !items.is_empty() {
                        ctx.bind_list(&outcome.reference, items);
                    }
                    if let Some(first) = errors.into_iter().next() {
                        tracing::error!(performer = %outcome.target, error = %first, "performer failed");
                        responses.push(ActionResponse::failure(&format!("{} failed. {}", outcome.target, first)));
                        return Err(fail(
                            ActionError::Outcome {
                                target: outcome.target.clone(),
                                message: first.to_string(),
                            },
                            responses,
                        ));
                    }
                }
                OutcomeMethod::ActionResponse(kind) => {
                    responses.push(ActionResponse::of_kind(kind, Value::Object(attributes)));
                }
            }
        }
        tracing::info!(action = %action.name, responses = responses.len(), "action complete");
        Ok(responses)
    }

    async fn crud(
        &self,
        snapshot: &EngineSnapshot,
        outcome: &Outcome,
        op: Crud,
        mut attributes: Map<String, Value>,
        cancel: &CancelSignal,
    ) -> Result<Value, ActionError> {
        let table = snapshot
            .schema
            .table(&outcome.target)
            .ok_or_else(|| StoreError::UnknownEntity(outcome.target.clone()))?;
        let row = match op {
            Crud::Create => guard(cancel, self.store.create(table, attributes)).await??,
            Crud::Update => {
                let reference_id = take_reference_id(&mut attributes)?;
                guard(cancel, self.store.update(table, &reference_id, attributes)).await??
            }
            Crud::Delete => {
                let reference_id = take_reference_id(&mut attributes)?;
                guard(cancel, self.store.delete(table, &reference_id)).await??
            }
        };
        Ok(row)
    }
}
