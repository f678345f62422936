//! Durable workflow store backed by sled
//!
//! Workflows are stored as JSON values keyed by workflow ID. Read-modify-
//! write operations are serialized through a single async mutex so that
//! `update_status` stays atomic with respect to the transition check.

use crate::{
    apply_references, apply_status, check_initial, select, WorkflowReferences, WorkflowStore,
};
use agentpay_types::{
    AgentPayError, Result, Workflow, WorkflowFilter, WorkflowId, WorkflowStatus,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::info;

const WORKFLOW_TREE: &str = "workflows";

/// Sled-backed store with the same contract as [`crate::MemoryWorkflowStore`]
pub struct SledWorkflowStore {
    tree: sled::Tree,
    db: sled::Db,
    write_lock: Mutex<()>,
}

impl SledWorkflowStore {
    /// Open (or create) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path.as_ref()).map_err(|e| AgentPayError::storage(e.to_string()))?;
        let tree = db
            .open_tree(WORKFLOW_TREE)
            .map_err(|e| AgentPayError::storage(e.to_string()))?;
        info!(path = %path.as_ref().display(), "opened workflow store");
        Ok(Self {
            tree,
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn load(&self, id: &WorkflowId) -> Result<Workflow> {
        let bytes = self
            .tree
            .get(id.as_str())
            .map_err(|e| AgentPayError::storage(e.to_string()))?
            .ok_or_else(|| AgentPayError::WorkflowNotFound {
                workflow_id: id.to_string(),
            })?;
        serde_json::from_slice(&bytes).map_err(|e| AgentPayError::Serialization {
            message: e.to_string(),
        })
    }

    fn persist(&self, workflow: &Workflow) -> Result<()> {
        let bytes = serde_json::to_vec(workflow)?;
        self.tree
            .insert(workflow.id.as_str(), bytes)
            .map_err(|e| AgentPayError::storage(e.to_string()))?;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.db
            .flush_async()
            .await
            .map(|_| ())
            .map_err(|e| AgentPayError::storage(e.to_string()))
    }

    fn scan(&self) -> Result<Vec<Workflow>> {
        let mut workflows = Vec::new();
        for entry in self.tree.iter() {
            let (_, bytes) = entry.map_err(|e| AgentPayError::storage(e.to_string()))?;
            let workflow: Workflow =
                serde_json::from_slice(&bytes).map_err(|e| AgentPayError::Serialization {
                    message: e.to_string(),
                })?;
            workflows.push(workflow);
        }
        Ok(workflows)
    }
}

#[async_trait]
impl WorkflowStore for SledWorkflowStore {
    async fn create(&self, workflow: Workflow) -> Result<()> {
        check_initial(&workflow)?;
        let _guard = self.write_lock.lock().await;
        if self
            .tree
            .contains_key(workflow.id.as_str())
            .map_err(|e| AgentPayError::storage(e.to_string()))?
        {
            return Err(AgentPayError::WorkflowAlreadyExists {
                workflow_id: workflow.id.to_string(),
            });
        }
        self.persist(&workflow)?;
        self.flush().await
    }

    async fn get(&self, id: &WorkflowId) -> Result<Workflow> {
        self.load(id)
    }

    async fn update_status(
        &self,
        id: &WorkflowId,
        new_status: WorkflowStatus,
        error_message: Option<String>,
    ) -> Result<Workflow> {
        let _guard = self.write_lock.lock().await;
        let mut workflow = self.load(id)?;
        apply_status(&mut workflow, new_status, error_message)?;
        self.persist(&workflow)?;
        self.flush().await?;
        Ok(workflow)
    }

    async fn set_references(&self, id: &WorkflowId, refs: WorkflowReferences) -> Result<Workflow> {
        let _guard = self.write_lock.lock().await;
        let mut workflow = self.load(id)?;
        apply_references(&mut workflow, refs);
        self.persist(&workflow)?;
        self.flush().await?;
        Ok(workflow)
    }

    async fn list(
        &self,
        filter: &WorkflowFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Workflow>> {
        Ok(select(self.scan()?, filter, limit, offset))
    }

    async fn delete(&self, id: &WorkflowId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let removed = self
            .tree
            .remove(id.as_str())
            .map_err(|e| AgentPayError::storage(e.to_string()))?;
        if removed.is_none() {
            return Err(AgentPayError::WorkflowNotFound {
                workflow_id: id.to_string(),
            });
        }
        self.flush().await
    }

    async fn purge_terminal(&self, older_than: Duration) -> Result<usize> {
        let cutoff = Utc::now() - older_than;
        let _guard = self.write_lock.lock().await;
        let mut purged = 0;
        for workflow in self.scan()? {
            if workflow.status.is_terminal() && workflow.updated_at < cutoff {
                self.tree
                    .remove(workflow.id.as_str())
                    .map_err(|e| AgentPayError::storage(e.to_string()))?;
                purged += 1;
            }
        }
        if purged > 0 {
            self.flush().await?;
            info!(purged, "purged terminal workflows past retention");
        }
        Ok(purged)
    }
}
