//! Collaborators the executor depends on: data access, capability checks and cancellation.

use crate::error::StoreError;
use crate::schema::TableDefinition;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::watch;

/// Authenticated caller as resolved by the (external) session layer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_reference_id: Option<String>,
    pub groups: Vec<String>,
}

impl CallerIdentity {
    pub fn guest() -> Self {
        CallerIdentity::default()
    }

    pub fn user(reference_id: &str) -> Self {
        CallerIdentity {
            user_reference_id: Some(reference_id.to_string()),
            groups: Vec::new(),
        }
    }
}

/// Row-level data access. Rows are JSON objects keyed by physical column name and addressed
/// by `reference_id`.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn find_by_reference_id(&self, table: &TableDefinition, reference_id: &str)
        -> Result<Option<Value>, StoreError>;

    /// Insert one row, generating `reference_id` when absent. Returns the stored row.
    async fn create(&self, table: &TableDefinition, attributes: Map<String, Value>) -> Result<Value, StoreError>;

    async fn update(
        &self,
        table: &TableDefinition,
        reference_id: &str,
        attributes: Map<String, Value>,
    ) -> Result<Value, StoreError>;

    /// Delete one row. Returns the deleted row.
    async fn delete(&self, table: &TableDefinition, reference_id: &str) -> Result<Value, StoreError>;

    /// Remove every row. Returns the number removed.
    async fn truncate(&self, table: &TableDefinition) -> Result<u64, StoreError>;
}

/// Execute capability checks. The permission model behind them is the implementor's.
#[async_trait]
pub trait CapabilityChecker: Send + Sync {
    async fn can_execute_action(&self, caller: &CallerIdentity, entity_type: &str, action: &str) -> bool;

    async fn can_execute_row(&self, caller: &CallerIdentity, entity_type: &str, row: &Value) -> bool;
}

/// Grants everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

#[async_trait]
impl CapabilityChecker for AllowAll {
    async fn can_execute_action(&self, _caller: &CallerIdentity, _entity_type: &str, _action: &str) -> bool {
        true
    }

    async fn can_execute_row(&self, _caller: &CallerIdentity, _entity_type: &str, _row: &Value) -> bool {
        true
    }
}

/// Sender half; dropping it without cancelling never cancels.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

/// Cancellation observed by an invocation at each suspension point.
#[derive(Clone, Debug, Default)]
pub struct CancelSignal(Option<watch::Receiver<bool>>);

impl CancelSignal {
    pub fn pair() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle(tx), CancelSignal(Some(rx)))
    }

    pub fn never() -> Self {
        CancelSignal(None)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Resolves once cancelled; pending forever otherwise.
    pub async fn cancelled(&self) {
        if let Some(rx) = &self.0 {
            let mut rx = rx.clone();
            loop {
                if *rx.borrow_and_update() {
                    return;
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }
        std::future::pending::<()>().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_wakes_waiters() {
        let (handle, signal) = CancelSignal::pair();
        assert!(!signal.is_cancelled());
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.cancelled().await })
        };
        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn dropped_handle_never_cancels() {
        let (handle, signal) = CancelSignal::pair();
        drop(handle);
        let waited = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(waited.is_err());
        assert!(!CancelSignal::never().is_cancelled());
    }
}
