//! Workflow runtime entities shared
//! across the planner, scheduler and learning crates. The scheduler is the
//! sole owner of the live `WorkflowState`; everyone else only ever holds
//! `WorkflowId`s and reads through events or checkpoints.

use crate::types::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub type WorkflowId = Uuid;
pub type TaskId = String;
pub type CheckpointId = Uuid;
pub type TraceId = Uuid;

/// Whether a task's `toolOrCapId` names a stored capability (executed as
/// code) or a raw downstream tool (executed via MCP call).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    Tool,
    Capability,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub tool_or_cap_id: NodeId,
    pub kind: TaskKind,
    pub arguments: serde_json::Value,
    pub depends_on: Vec<TaskId>,
    /// Destructive or budget-exceeding per §4.9 risk classes; gates HIL.
    pub critical: bool,
    /// Declares the task retriable on `DownstreamError`.
    pub safe_to_retry: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Dag {
    pub tasks: Vec<Task>,
}

impl Dag {
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Topologically stratifies tasks into layers: layer 0 has no
    /// dependencies, layer N depends only on layers < N. Returns `None` if
    /// the DAG contains a cycle (the store's edge validator should have
    /// prevented this, but the scheduler re-checks defensively).
    pub fn layers(&self) -> Option<Vec<Vec<TaskId>>> {
        let mut remaining: HashMap<TaskId, &Task> =
            self.tasks.iter().map(|t| (t.id.clone(), t)).collect();
        let mut done: std::collections::HashSet<TaskId> = std::collections::HashSet::new();
        let mut layers = Vec::new();

        while !remaining.is_empty() {
            let ready: Vec<TaskId> = remaining
                .values()
                .filter(|t| t.depends_on.iter().all(|d| done.contains(d)))
                .map(|t| t.id.clone())
                .collect();

            if ready.is_empty() {
                return None;
            }

            for id in &ready {
                remaining.remove(id);
                done.insert(id.clone());
            }
            layers.push(ready);
        }

        Some(layers)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowStatus {
    Running,
    Paused,
    Complete,
    Aborted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub success: bool,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub workflow_id: WorkflowId,
    pub dag: Dag,
    pub current_layer: usize,
    pub total_layers: usize,
    pub layer_results: Vec<Vec<TaskResult>>,
    pub status: WorkflowStatus,
    pub latest_checkpoint_id: Option<CheckpointId>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub intent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub workflow_id: WorkflowId,
    pub layer: usize,
    pub layer_results: Vec<TaskResult>,
    pub dag_snapshot: Dag,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicTrace {
    pub trace_id: TraceId,
    pub workflow_id: WorkflowId,
    pub intent: String,
    pub intent_embedding: Vec<f32>,
    pub path: Vec<NodeId>,
    pub success: bool,
    pub duration_ms: u64,
    pub task_results: Vec<TaskResult>,
    pub td_error: f64,
    pub priority: f64,
    pub timestamp: DateTime<Utc>,
    /// Per-tool confidence the scheduler used before dispatch, keyed by
    /// tool id; used by `findSimilar` to bucket by `localα`.
    pub local_alpha: HashMap<NodeId, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThompsonState {
    pub tool_id: NodeId,
    pub alpha: f64,
    pub beta: f64,
    pub last_updated: DateTime<Utc>,
}

impl ThompsonState {
    pub fn seeded(tool_id: NodeId) -> Self {
        Self {
            tool_id,
            alpha: 1.0,
            beta: 1.0,
            last_updated: Utc::now(),
        }
    }
}

/// Execution event stream. A closed sum type mirrored verbatim
/// as the NDJSON wire envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    WorkflowStart {
        workflow_id: WorkflowId,
    },
    TaskStart {
        workflow_id: WorkflowId,
        layer: usize,
        task_id: TaskId,
    },
    TaskComplete {
        workflow_id: WorkflowId,
        layer: usize,
        task_id: TaskId,
        result: TaskResult,
    },
    TaskError {
        workflow_id: WorkflowId,
        layer: usize,
        task_id: TaskId,
        kind: crate::error::ErrorKind,
        message: String,
    },
    Checkpoint {
        workflow_id: WorkflowId,
        layer: usize,
        checkpoint_id: CheckpointId,
    },
    DecisionRequired {
        workflow_id: WorkflowId,
        layer: usize,
        task_id: TaskId,
        checkpoint_id: CheckpointId,
    },
    WorkflowComplete {
        workflow_id: WorkflowId,
    },
    WorkflowAborted {
        workflow_id: WorkflowId,
        reason: String,
    },
}

/// The four command kinds accepted by a workflow's FIFO command queue.
#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, deps: &[&str]) -> Task {
        Task {
            id: id.to_string(),
            tool_or_cap_id: Uuid::new_v4(),
            kind: TaskKind::Tool,
            arguments: serde_json::Value::Null,
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            critical: false,
            safe_to_retry: false,
        }
    }

    #[test]
    fn layers_stratify_by_dependency_depth() {
        let dag = Dag {
            tasks: vec![
                task("a", &[]),
                task("b", &[]),
                task("c", &["a", "b"]),
                task("d", &["c"]),
            ],
        };
        let layers = dag.layers().expect("acyclic dag");
        assert_eq!(layers.len(), 3);
        assert_eq!(layers[0].len(), 2);
        assert_eq!(layers[1], vec!["c".to_string()]);
        assert_eq!(layers[2], vec!["d".to_string()]);
    }

    #[test]
    fn layers_detect_cycle() {
        let dag = Dag {
            tasks: vec![task("a", &["b"]), task("b", &["a"])],
        };
        assert!(dag.layers().is_none());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Continue {
        reason: Option<String>,
    },
    Abort {
        reason: String,
    },
    ReplanDag {
        new_requirement: String,
        available_context: serde_json::Value,
    },
    ApprovalResponse {
        checkpoint_id: CheckpointId,
        approved: bool,
        feedback: Option<String>,
    },
}
