//! Scheduler-local configuration and the dynamic (replan-aware) layer
//! readiness helper.

use hypergate_core::{Dag, GatewayConfig, TaskId};
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub per_layer_validation: bool,
    pub task_timeout: Duration,
    /// `None` means an infinite HIL deadline.
    pub approval_timeout: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            per_layer_validation: false,
            task_timeout: Duration::from_secs(30),
            approval_timeout: None,
        }
    }
}

impl SchedulerConfig {
    pub fn from_gateway_config(config: &GatewayConfig, per_layer_validation_override: Option<bool>) -> Self {
        Self {
            per_layer_validation: per_layer_validation_override.unwrap_or(config.per_layer_validation),
            task_timeout: Duration::from_millis(config.task_timeout_ms),
            approval_timeout: config.approval_timeout_ms.map(Duration::from_millis),
        }
    }
}

/// The next batch of tasks whose dependencies are all in `done` and which
/// are not themselves already done — computed fresh every boundary so a
/// mid-run replan's appended tasks are picked up without restratifying the
/// whole DAG.
pub fn next_ready(dag: &Dag, done: &HashSet<TaskId>) -> Vec<TaskId> {
    dag.tasks
        .iter()
        .filter(|t| !done.contains(&t.id))
        .filter(|t| t.depends_on.iter().all(|d| done.contains(d)))
        .map(|t| t.id.clone())
        .collect()
}
