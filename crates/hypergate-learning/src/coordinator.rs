//! Learning Coordinator: glues a finished workflow's outcome into the
//! graph, the capability miner, the threshold manager and the episodic
//! store. Every write here is best-effort — logged and swallowed, never
//! surfaced to the caller, so none of it may fail the workflow itself.

use crate::capability_miner::{serialize_tool_sequence, CapabilityMiner};
use crate::episodic_store::EpisodicStore;
use crate::threshold_manager::AdaptiveThresholdManager;
use hypergate_core::{Dag, EdgeKind, EpisodicTrace, NodeId, TaskResult, WorkflowId};
use hypergate_graph::SuperHyperGraph;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub struct CompletedWorkflow<'a> {
    pub workflow_id: WorkflowId,
    pub intent: Option<&'a str>,
    pub intent_embedding: Vec<f32>,
    pub dag: &'a Dag,
    pub layer_results: &'a [Vec<TaskResult>],
    /// The scheduler's pre-dispatch confidence per tool, used both as the
    /// `predicted` half of the TD error and as the trace's `localα`
    /// bucket.
    pub predicted_confidence: HashMap<NodeId, f64>,
    pub duration_ms: u64,
    /// User code for `execute_code` invocations that this workflow
    /// fulfilled, if any; drives capability mining on overall success.
    pub executed_code: Option<&'a str>,
}

pub struct LearningCoordinator {
    graph: Arc<SuperHyperGraph>,
    miner: CapabilityMiner,
    thresholds: AdaptiveThresholdManager,
    episodic: EpisodicStore,
}

impl LearningCoordinator {
    pub fn new(
        graph: Arc<SuperHyperGraph>,
        miner: CapabilityMiner,
        thresholds: AdaptiveThresholdManager,
        episodic: EpisodicStore,
    ) -> Self {
        Self {
            graph,
            miner,
            thresholds,
            episodic,
        }
    }

    pub fn thresholds(&self) -> &AdaptiveThresholdManager {
        &self.thresholds
    }

    pub fn episodic(&self) -> &EpisodicStore {
        &self.episodic
    }

    /// Exposed so `execute_code` can mine a capability directly, outside
    /// the scheduled-DAG completion path `on_workflow_complete` covers.
    pub fn miner(&self) -> &CapabilityMiner {
        &self.miner
    }

    /// The executed tool path in dispatch order, one id per settled task
    /// across every completed layer.
    fn executed_path(dag: &Dag, layer_results: &[Vec<TaskResult>]) -> Vec<NodeId> {
        layer_results
            .iter()
            .flatten()
            .filter_map(|r| dag.task(&r.task_id))
            .map(|t| t.tool_or_cap_id)
            .collect()
    }

    pub async fn on_workflow_complete(&self, completed: CompletedWorkflow<'_>) {
        let path = Self::executed_path(completed.dag, completed.layer_results);
        let all_results: Vec<&TaskResult> = completed.layer_results.iter().flatten().collect();
        let overall_success = !all_results.is_empty() && all_results.iter().all(|r| r.success);

        self.record_observed_edges(&path);
        self.record_thresholds(completed.dag, &all_results);

        if overall_success {
            match completed.executed_code {
                Some(code) => self.mine_capability(code, &path).await,
                // Spec §4.8's second mining trigger: "whose DAG exercised a
                // novel tool sequence" — no user code here, so the executed
                // path itself stands in as the capability's `code`; the
                // miner's own codeHash dedup (step 2/3) is what decides
                // "novel" versus a reused ordering.
                None if path.len() >= 2 => {
                    let serialized = serialize_tool_sequence(&path);
                    self.mine_capability(&serialized, &path).await;
                }
                None => {}
            }
        }

        self.append_trace(&completed, path, overall_success);
    }

    fn record_observed_edges(&self, path: &[NodeId]) {
        for pair in path.windows(2) {
            if let Err(err) = self.graph.upsert_observed_edge(pair[0], pair[1], EdgeKind::Sequence)
            {
                tracing::warn!(error = %err, "learning coordinator: failed to record observed sequence edge");
            }
        }
    }

    fn record_thresholds(&self, dag: &Dag, all_results: &[&TaskResult]) {
        for result in all_results {
            if let Some(task) = dag.task(&result.task_id) {
                self.thresholds
                    .record_outcome(task.tool_or_cap_id, result.success);
            }
        }
    }

    async fn mine_capability(&self, code: &str, path: &[NodeId]) {
        if let Err(err) = self.miner.mine(code, path, None).await {
            tracing::warn!(error = %err, "learning coordinator: capability mining failed");
        }
    }

    fn append_trace(&self, completed: &CompletedWorkflow<'_>, path: Vec<NodeId>, success: bool) {
        let predicted = if path.is_empty() {
            0.5
        } else {
            let sum: f64 = path
                .iter()
                .filter_map(|id| completed.predicted_confidence.get(id))
                .sum();
            let n = path
                .iter()
                .filter(|id| completed.predicted_confidence.contains_key(*id))
                .count()
                .max(1);
            sum / n as f64
        };

        let trace = EpisodicTrace {
            trace_id: Uuid::new_v4(),
            workflow_id: completed.workflow_id,
            intent: completed.intent.unwrap_or_default().to_string(),
            intent_embedding: completed.intent_embedding.clone(),
            path,
            success,
            duration_ms: completed.duration_ms,
            task_results: completed
                .layer_results
                .iter()
                .flatten()
                .cloned()
                .collect(),
            td_error: 0.0,
            priority: 0.0,
            timestamp: chrono::Utc::now(),
            local_alpha: completed.predicted_confidence.clone(),
        };

        self.episodic.insert(trace, predicted);
    }
}
