//! AgentPay Store - workflow persistence
//!
//! Two implementations with an identical contract: [`MemoryWorkflowStore`]
//! (a single-lock map, for tests and small deployments) and
//! [`SledWorkflowStore`] (durable). Status changes only happen through
//! [`WorkflowStore::update_status`], which enforces the transition table.

pub mod memory;
pub mod sled_store;

pub use memory::MemoryWorkflowStore;
pub use sled_store::SledWorkflowStore;

use agentpay_types::{
    AgentPayError, MandateId, Result, TransactionId, Workflow, WorkflowFilter, WorkflowId,
    WorkflowStatus,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};

/// Mandate/transaction references recorded on a workflow as its steps
/// complete. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowReferences {
    pub intent_mandate_id: Option<MandateId>,
    pub cart_mandate_id: Option<MandateId>,
    pub transaction_id: Option<TransactionId>,
}

impl WorkflowReferences {
    /// Reference just an intent mandate
    pub fn intent(id: MandateId) -> Self {
        Self {
            intent_mandate_id: Some(id),
            ..Default::default()
        }
    }

    /// Reference just a cart mandate
    pub fn cart(id: MandateId) -> Self {
        Self {
            cart_mandate_id: Some(id),
            ..Default::default()
        }
    }

    /// Reference just a transaction
    pub fn transaction(id: TransactionId) -> Self {
        Self {
            transaction_id: Some(id),
            ..Default::default()
        }
    }
}

/// Storage abstraction for workflow aggregates
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Persist a fresh workflow. Fails on ID collision or if the initial
    /// status is not INITIALIZING.
    async fn create(&self, workflow: Workflow) -> Result<()>;

    /// Load a workflow
    async fn get(&self, id: &WorkflowId) -> Result<Workflow>;

    /// Atomically validate and apply a status transition, recording the
    /// error message if any. Returns the updated workflow.
    async fn update_status(
        &self,
        id: &WorkflowId,
        new_status: WorkflowStatus,
        error_message: Option<String>,
    ) -> Result<Workflow>;

    /// Merge mandate/transaction references into a workflow. Status is
    /// untouched.
    async fn set_references(&self, id: &WorkflowId, refs: WorkflowReferences) -> Result<Workflow>;

    /// List workflows matching the filter, ordered by creation time
    async fn list(
        &self,
        filter: &WorkflowFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Workflow>>;

    /// Remove a workflow
    async fn delete(&self, id: &WorkflowId) -> Result<()>;

    /// Remove terminal workflows older than the retention window. Returns
    /// how many were purged.
    async fn purge_terminal(&self, older_than: Duration) -> Result<usize>;
}

/// Validate and apply a status transition in place. Shared by both store
/// implementations so their contracts cannot drift.
pub(crate) fn apply_status(
    workflow: &mut Workflow,
    new_status: WorkflowStatus,
    error_message: Option<String>,
) -> Result<()> {
    if !workflow.status.can_transition_to(new_status) {
        return Err(AgentPayError::InvalidStateTransition {
            from: workflow.status.to_string(),
            to: new_status.to_string(),
        });
    }
    workflow.status = new_status;
    workflow.updated_at = Utc::now();
    if let Some(message) = error_message {
        workflow.error_message = Some(message);
    }
    if new_status.is_terminal() {
        workflow.completed_at = Some(workflow.updated_at);
    }
    Ok(())
}

/// Merge references in place, stamping `updated_at`
pub(crate) fn apply_references(workflow: &mut Workflow, refs: WorkflowReferences) {
    if let Some(id) = refs.intent_mandate_id {
        workflow.intent_mandate_id = Some(id);
    }
    if let Some(id) = refs.cart_mandate_id {
        workflow.cart_mandate_id = Some(id);
    }
    if let Some(id) = refs.transaction_id {
        workflow.transaction_id = Some(id);
    }
    workflow.updated_at = Utc::now();
}

/// Validate a workflow being handed to `create`
pub(crate) fn check_initial(workflow: &Workflow) -> Result<()> {
    if workflow.status != WorkflowStatus::Initializing {
        return Err(AgentPayError::InvalidStateTransition {
            from: workflow.status.to_string(),
            to: WorkflowStatus::Initializing.to_string(),
        });
    }
    Ok(())
}

/// Sort, filter and paginate a drained set of workflows
pub(crate) fn select(
    mut workflows: Vec<Workflow>,
    filter: &WorkflowFilter,
    limit: usize,
    offset: usize,
) -> Vec<Workflow> {
    workflows.retain(|w| filter.matches(w));
    workflows.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.as_str().cmp(b.id.as_str()))
    });
    workflows.into_iter().skip(offset).take(limit).collect()
}
