//! Action execution: declared actions, their preconditions, and the outcome chain.

mod access;
mod context;
mod executor;
mod response;
pub mod rules;
mod types;

pub use access::{AllowAll, CallerIdentity, CancelHandle, CancelSignal, CapabilityChecker, EntityStore};
pub use context::ExecutionContext;
pub use executor::{ActionInvocation, OutcomeExecutor, DEFAULT_SCRIPT_TIMEOUT};
pub use response::{ActionResponse, ResponseKind};
pub use types::{ActionCatalog, ActionDefinition, ColumnTag, InField, Outcome, OutcomeMethod};
