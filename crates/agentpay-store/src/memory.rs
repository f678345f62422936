//! In-memory workflow store
//!
//! A single map behind one lock. The reference implementation of the
//! [`WorkflowStore`] contract; the durable store must behave identically.

use crate::{
    apply_references, apply_status, check_initial, select, WorkflowReferences, WorkflowStore,
};
use agentpay_types::{
    AgentPayError, Result, Workflow, WorkflowFilter, WorkflowId, WorkflowStatus,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Map-backed store for tests and small deployments
pub struct MemoryWorkflowStore {
    workflows: RwLock<HashMap<WorkflowId, Workflow>>,
}

impl MemoryWorkflowStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            workflows: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryWorkflowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn create(&self, workflow: Workflow) -> Result<()> {
        check_initial(&workflow)?;
        let mut workflows = self.workflows.write().await;
        if workflows.contains_key(&workflow.id) {
            return Err(AgentPayError::WorkflowAlreadyExists {
                workflow_id: workflow.id.to_string(),
            });
        }
        workflows.insert(workflow.id.clone(), workflow);
        Ok(())
    }

    async fn get(&self, id: &WorkflowId) -> Result<Workflow> {
        self.workflows
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AgentPayError::WorkflowNotFound {
                workflow_id: id.to_string(),
            })
    }

    async fn update_status(
        &self,
        id: &WorkflowId,
        new_status: WorkflowStatus,
        error_message: Option<String>,
    ) -> Result<Workflow> {
        let mut workflows = self.workflows.write().await;
        let workflow = workflows
            .get_mut(id)
            .ok_or_else(|| AgentPayError::WorkflowNotFound {
                workflow_id: id.to_string(),
            })?;
        apply_status(workflow, new_status, error_message)?;
        Ok(workflow.clone())
    }

    async fn set_references(&self, id: &WorkflowId, refs: WorkflowReferences) -> Result<Workflow> {
        let mut workflows = self.workflows.write().await;
        let workflow = workflows
            .get_mut(id)
            .ok_or_else(|| AgentPayError::WorkflowNotFound {
                workflow_id: id.to_string(),
            })?;
        apply_references(workflow, refs);
        Ok(workflow.clone())
    }

    async fn list(
        &self,
        filter: &WorkflowFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Workflow>> {
        let workflows = self.workflows.read().await;
        Ok(select(
            workflows.values().cloned().collect(),
            filter,
            limit,
            offset,
        ))
    }

    async fn delete(&self, id: &WorkflowId) -> Result<()> {
        self.workflows
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| AgentPayError::WorkflowNotFound {
                workflow_id: id.to_string(),
            })
    }

    async fn purge_terminal(&self, older_than: Duration) -> Result<usize> {
        let cutoff = Utc::now() - older_than;
        let mut workflows = self.workflows.write().await;
        let before = workflows.len();
        workflows.retain(|_, w| !(w.status.is_terminal() && w.updated_at < cutoff));
        Ok(before - workflows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentpay_types::{AgentId, BusinessId, UserId};

    fn workflow() -> Workflow {
        Workflow::new(
            UserId::new("user-1"),
            BusinessId::new("biz-1"),
            AgentId::new("agent-1"),
        )
    }

    #[tokio::test]
    async fn create_and_get() {
        let store = MemoryWorkflowStore::new();
        let w = workflow();
        store.create(w.clone()).await.unwrap();
        assert_eq!(store.get(&w.id).await.unwrap(), w);
    }

    #[tokio::test]
    async fn duplicate_create_rejected() {
        let store = MemoryWorkflowStore::new();
        let w = workflow();
        store.create(w.clone()).await.unwrap();
        assert!(matches!(
            store.create(w).await,
            Err(AgentPayError::WorkflowAlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn create_requires_initializing() {
        let store = MemoryWorkflowStore::new();
        let mut w = workflow();
        w.status = WorkflowStatus::Completed;
        assert!(matches!(
            store.create(w).await,
            Err(AgentPayError::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn status_walks_the_table() {
        let store = MemoryWorkflowStore::new();
        let w = workflow();
        store.create(w.clone()).await.unwrap();

        for status in [
            WorkflowStatus::IntentAuthorized,
            WorkflowStatus::CartConfirmed,
            WorkflowStatus::PaymentProcessing,
            WorkflowStatus::Completed,
        ] {
            let updated = store.update_status(&w.id, status, None).await.unwrap();
            assert_eq!(updated.status, status);
        }

        let final_state = store.get(&w.id).await.unwrap();
        assert!(final_state.completed_at.is_some());
    }

    #[tokio::test]
    async fn illegal_transition_leaves_status_unchanged() {
        let store = MemoryWorkflowStore::new();
        let w = workflow();
        store.create(w.clone()).await.unwrap();

        let err = store
            .update_status(&w.id, WorkflowStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentPayError::InvalidStateTransition { .. }));
        assert_eq!(
            store.get(&w.id).await.unwrap().status,
            WorkflowStatus::Initializing
        );
    }

    #[tokio::test]
    async fn failure_records_error_message() {
        let store = MemoryWorkflowStore::new();
        let w = workflow();
        store.create(w.clone()).await.unwrap();

        let failed = store
            .update_status(&w.id, WorkflowStatus::Failed, Some("network down".into()))
            .await
            .unwrap();
        assert_eq!(failed.error_message.as_deref(), Some("network down"));
        assert!(failed.completed_at.is_some());
    }

    #[tokio::test]
    async fn references_merge_without_clobbering() {
        let store = MemoryWorkflowStore::new();
        let w = workflow();
        store.create(w.clone()).await.unwrap();

        let intent = agentpay_types::MandateId::from_string("mandate_i");
        store
            .set_references(&w.id, WorkflowReferences::intent(intent.clone()))
            .await
            .unwrap();
        let cart = agentpay_types::MandateId::from_string("mandate_c");
        let updated = store
            .set_references(&w.id, WorkflowReferences::cart(cart.clone()))
            .await
            .unwrap();

        assert_eq!(updated.intent_mandate_id, Some(intent));
        assert_eq!(updated.cart_mandate_id, Some(cart));
    }

    #[tokio::test]
    async fn list_filters_and_paginates() {
        let store = MemoryWorkflowStore::new();
        for i in 0..5 {
            let mut w = workflow();
            if i >= 3 {
                w.business_id = BusinessId::new("biz-2");
            }
            store.create(w).await.unwrap();
        }

        let all = store
            .list(&WorkflowFilter::default(), 100, 0)
            .await
            .unwrap();
        assert_eq!(all.len(), 5);

        let biz2 = store
            .list(
                &WorkflowFilter {
                    business_id: Some(BusinessId::new("biz-2")),
                    ..Default::default()
                },
                100,
                0,
            )
            .await
            .unwrap();
        assert_eq!(biz2.len(), 2);

        let page = store.list(&WorkflowFilter::default(), 2, 4).await.unwrap();
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn delete_and_missing() {
        let store = MemoryWorkflowStore::new();
        let w = workflow();
        store.create(w.clone()).await.unwrap();
        store.delete(&w.id).await.unwrap();
        assert!(matches!(
            store.get(&w.id).await,
            Err(AgentPayError::WorkflowNotFound { .. })
        ));
        assert!(store.delete(&w.id).await.is_err());
    }

    #[tokio::test]
    async fn purge_only_touches_old_terminal_workflows() {
        let store = MemoryWorkflowStore::new();

        let active = workflow();
        store.create(active.clone()).await.unwrap();

        let done = workflow();
        store.create(done.clone()).await.unwrap();
        store
            .update_status(&done.id, WorkflowStatus::Failed, None)
            .await
            .unwrap();

        // Nothing is old enough yet
        assert_eq!(store.purge_terminal(Duration::hours(1)).await.unwrap(), 0);

        // With a zero retention window the failed workflow goes
        assert_eq!(store.purge_terminal(Duration::zero()).await.unwrap(), 1);
        assert!(store.get(&active.id).await.is_ok());
        assert!(store.get(&done.id).await.is_err());
    }
}
