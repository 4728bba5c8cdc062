//! Checkpoint persistence. A trait seam so `hypergate-mcp` can back this
//! with durable storage later; the in-memory default is sufficient for
//! single-process resume within a run.

use async_trait::async_trait;
use dashmap::DashMap;
use hypergate_core::{Checkpoint, CheckpointId, Result, WorkflowId};

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, checkpoint: Checkpoint) -> Result<()>;
    async fn latest(&self, workflow_id: WorkflowId) -> Result<Option<Checkpoint>>;
    async fn get(&self, id: CheckpointId) -> Result<Option<Checkpoint>>;
}

#[derive(Default)]
pub struct InMemoryCheckpointStore {
    by_id: DashMap<CheckpointId, Checkpoint>,
    latest_by_workflow: DashMap<WorkflowId, CheckpointId>,
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        self.latest_by_workflow
            .insert(checkpoint.workflow_id, checkpoint.id);
        self.by_id.insert(checkpoint.id, checkpoint);
        Ok(())
    }

    async fn latest(&self, workflow_id: WorkflowId) -> Result<Option<Checkpoint>> {
        let Some(id) = self.latest_by_workflow.get(&workflow_id).map(|e| *e) else {
            return Ok(None);
        };
        Ok(self.by_id.get(&id).map(|e| e.clone()))
    }

    async fn get(&self, id: CheckpointId) -> Result<Option<Checkpoint>> {
        Ok(self.by_id.get(&id).map(|e| e.clone()))
    }
}
