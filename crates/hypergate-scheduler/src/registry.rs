//! Process-wide workflow registry: maps a `WorkflowId` to the running
//! task's command sender while it's live, and to its final `WorkflowState`
//! once terminal. Also the seam that implements the cancellation rule:
//! subsequent commands for an unknown or terminal workflow are rejected
//! with `WorkflowNotFound`.

use crate::checkpoint::CheckpointStore;
use crate::command_queue::{self, CommandSender};
use crate::events;
use crate::executor::{run_workflow, ResumeState, RunParams};
use crate::invoker::TaskExecutor;
use crate::state::SchedulerConfig;
use dashmap::DashMap;
use hypergate_core::{
    Checkpoint, Command, Dag, ExecutionEvent, GatewayError, Result, TaskId, TaskResult, WorkflowId,
    WorkflowState,
};
use hypergate_graph::SuperHyperGraph;
use hypergate_scoring::ScoringEngine;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Default)]
pub struct WorkflowRegistry {
    active: DashMap<WorkflowId, CommandSender>,
    finished: DashMap<WorkflowId, WorkflowState>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new workflow on a background task and returns its id plus
    /// the event stream the caller drives.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        self: &Arc<Self>,
        graph: Arc<SuperHyperGraph>,
        scoring: Arc<ScoringEngine>,
        executor: Arc<dyn TaskExecutor>,
        checkpoints: Arc<dyn CheckpointStore>,
        dag: Dag,
        intent: Option<String>,
        config: SchedulerConfig,
    ) -> (WorkflowId, mpsc::UnboundedReceiver<ExecutionEvent>) {
        let workflow_id = Uuid::new_v4();
        self.spawn_inner(workflow_id, graph, scoring, executor, checkpoints, dag, intent, config, None)
    }

    /// Re-enters a workflow from a persisted checkpoint, skipping replay
    /// of every layer up to and including `checkpoint.layer`.
    #[allow(clippy::too_many_arguments)]
    pub fn resume(
        self: &Arc<Self>,
        graph: Arc<SuperHyperGraph>,
        scoring: Arc<ScoringEngine>,
        executor: Arc<dyn TaskExecutor>,
        checkpoints: Arc<dyn CheckpointStore>,
        checkpoint: Checkpoint,
        prior_layer_results: Vec<Vec<TaskResult>>,
        intent: Option<String>,
        config: SchedulerConfig,
    ) -> (WorkflowId, mpsc::UnboundedReceiver<ExecutionEvent>) {
        let workflow_id = checkpoint.workflow_id;
        let mut layer_results = prior_layer_results;
        layer_results.push(checkpoint.layer_results.clone());
        let done: std::collections::HashSet<TaskId> = layer_results
            .iter()
            .flatten()
            .map(|r| r.task_id.clone())
            .collect();

        let resume_from = ResumeState {
            done,
            layer_results,
            layer_index: checkpoint.layer + 1,
        };

        self.spawn_inner(
            workflow_id,
            graph,
            scoring,
            executor,
            checkpoints,
            checkpoint.dag_snapshot,
            intent,
            config,
            Some(resume_from),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_inner(
        self: &Arc<Self>,
        workflow_id: WorkflowId,
        graph: Arc<SuperHyperGraph>,
        scoring: Arc<ScoringEngine>,
        executor: Arc<dyn TaskExecutor>,
        checkpoints: Arc<dyn CheckpointStore>,
        dag: Dag,
        intent: Option<String>,
        config: SchedulerConfig,
        resume_from: Option<ResumeState>,
    ) -> (WorkflowId, mpsc::UnboundedReceiver<ExecutionEvent>) {
        let (command_tx, command_rx) = command_queue::channel();
        let (event_tx, event_rx) = events::channel();

        self.active.insert(workflow_id, command_tx);

        let registry = self.clone();
        tokio::spawn(async move {
            let final_state = run_workflow(RunParams {
                graph,
                scoring,
                executor,
                checkpoints,
                workflow_id,
                dag,
                intent,
                config,
                events: event_tx,
                commands: command_rx,
                resume_from,
            })
            .await;

            registry.active.remove(&workflow_id);
            registry.finished.insert(workflow_id, final_state);
        });

        (workflow_id, event_rx)
    }

    /// Enqueues a command for a live workflow; rejects with
    /// `WorkflowNotFound` once the workflow is terminal or unknown.
    pub fn send_command(&self, workflow_id: WorkflowId, command: Command) -> Result<()> {
        let sender = self
            .active
            .get(&workflow_id)
            .ok_or_else(|| GatewayError::WorkflowNotFound(workflow_id.to_string()))?;
        sender
            .send(command)
            .map_err(|_| GatewayError::WorkflowNotFound(workflow_id.to_string()))
    }

    pub fn final_state(&self, workflow_id: WorkflowId) -> Option<WorkflowState> {
        self.finished.get(&workflow_id).map(|e| e.clone())
    }

    pub fn is_active(&self, workflow_id: WorkflowId) -> bool {
        self.active.contains_key(&workflow_id)
    }
}
