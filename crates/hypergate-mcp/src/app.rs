//! Application bootstrap and per-workflow MCP session bridging: wires
//! every component crate together as a process-wide collaborator with an
//! explicit init lifecycle, and turns the scheduler's long-lived event
//! stream into the request/response an MCP tool call needs, since each
//! tool invocation is one round trip but a workflow's event stream spans
//! many of them.

use crate::downstream::{DownstreamClient, MockDownstreamClient};
use crate::sandbox::{MockSandboxClient, SandboxClient, SandboxRequest};
use crate::task_executor::GatewayTaskExecutor;
use crate::wire::{
    CandidateDto, DagDto, ExecuteCodeRequest, ExecuteCodeResponse, ExecuteDagRequest, ReplanEnvelope,
    TaskDto, TaskOutcomeDto, WorkflowEnvelope,
};
use dashmap::DashMap;
use hypergate_core::{
    CheckpointId, Command, Dag, ExecutionEvent, GatewayConfig, GatewayError, Node, NodeId, Result,
    Task, TaskId, TaskKind, TaskResult, WorkflowId, WorkflowState, WorkflowStatus,
};
use hypergate_graph::{AnalyticsCache, SuperHyperGraph};
use hypergate_learning::{
    AdaptiveThresholdManager, CapabilityMiner, CompletedWorkflow, EpisodicStore,
    LearningCoordinator, RiskCategory,
};
use hypergate_planner::{build_dag, replan, ReplanRequest, DEFAULT_TOP_K};
use hypergate_scheduler::{CheckpointStore, InMemoryCheckpointStore, SchedulerConfig, WorkflowRegistry};
use hypergate_scoring::{Candidate, CandidateKind, ScoringEngine, SearchFilter};
use hypergate_vector::{LocalEmbedder, VectorIndex};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

/// Default recency window fed to `episodic_boost`: 30 days matches the
/// episodic store's own pruning default horizon.
const EPISODIC_WINDOW_DAYS: i64 = 30;

fn candidate_kind_str(kind: CandidateKind) -> &'static str {
    match kind {
        CandidateKind::Tool => "tool",
        CandidateKind::Capability => "capability",
    }
}

fn candidate_to_dto(candidate: &Candidate) -> CandidateDto {
    CandidateDto {
        kind: candidate_kind_str(candidate.kind).to_string(),
        id: candidate.id.to_string(),
        name: candidate.name.clone(),
        description: candidate.description.clone(),
        score: candidate.score,
    }
}

fn task_result_to_dto(result: &TaskResult) -> TaskOutcomeDto {
    TaskOutcomeDto {
        task_id: result.task_id.clone(),
        success: result.success,
        output: result.output.clone(),
        error: result.error.clone(),
    }
}

fn outcome_dto_to_task_result(outcome: &TaskOutcomeDto) -> TaskResult {
    TaskResult {
        task_id: outcome.task_id.clone(),
        success: outcome.success,
        output: outcome.output.clone(),
        error: outcome.error.clone(),
        duration_ms: 0,
    }
}

/// Per-workflow state an MCP session needs to survive across separate
/// `execute_dag` / `continue` / `abort` / `replan` / `approval_response`
/// calls: the long-lived event receiver plus the accumulating layer
/// results the scheduler itself no longer holds once it goes terminal.
struct WorkflowSession {
    events: mpsc::UnboundedReceiver<ExecutionEvent>,
    dag: Dag,
    intent: Option<String>,
    intent_embedding: Vec<f32>,
    predicted_confidence: HashMap<NodeId, f64>,
    per_layer_validation: bool,
    layer_results: Vec<Vec<TaskOutcomeDto>>,
    current_layer: Vec<TaskOutcomeDto>,
    started_at: Instant,
}

pub struct GatewayApp {
    pub config: GatewayConfig,
    pub graph: Arc<SuperHyperGraph>,
    pub index: Arc<VectorIndex>,
    pub analytics: Arc<AnalyticsCache>,
    pub scoring: Arc<ScoringEngine>,
    pub registry: Arc<WorkflowRegistry>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub learning: Arc<LearningCoordinator>,
    pub executor: Arc<GatewayTaskExecutor>,
    sessions: DashMap<WorkflowId, Arc<AsyncMutex<WorkflowSession>>>,
}

impl GatewayApp {
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_collaborators(
            config,
            Arc::new(MockDownstreamClient::default()),
            Arc::new(MockSandboxClient::new()),
        )
    }

    pub fn with_collaborators(
        config: GatewayConfig,
        downstream: Arc<dyn DownstreamClient>,
        sandbox: Arc<dyn SandboxClient>,
    ) -> Self {
        let graph = Arc::new(SuperHyperGraph::new(&config));
        let index = Arc::new(VectorIndex::new(Arc::new(LocalEmbedder::default())));
        let analytics = Arc::new(AnalyticsCache::new(config.graph_cache_invalidation_delta));
        let scoring = Arc::new(ScoringEngine::new(graph.clone(), index.clone(), analytics.clone()));
        let registry = Arc::new(WorkflowRegistry::new());
        let checkpoints: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::default());

        let miner = CapabilityMiner::new(graph.clone(), index.clone());
        let thresholds = AdaptiveThresholdManager::new();
        let episodic = EpisodicStore::new();
        let learning = Arc::new(LearningCoordinator::new(graph.clone(), miner, thresholds, episodic));

        let executor = Arc::new(GatewayTaskExecutor::new(graph.clone(), downstream, sandbox));

        Self {
            config,
            graph,
            index,
            analytics,
            scoring,
            registry,
            checkpoints,
            learning,
            executor,
            sessions: DashMap::new(),
        }
    }

    fn node_name(&self, id: NodeId) -> String {
        match self.graph.get_node(id) {
            Some(Node::Tool(tool)) => tool.name,
            Some(Node::Capability(cap)) => cap.name.unwrap_or_else(|| id.to_string()),
            None => id.to_string(),
        }
    }

    fn get_session(&self, workflow_id: WorkflowId) -> Result<Arc<AsyncMutex<WorkflowSession>>> {
        self.sessions
            .get(&workflow_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| GatewayError::WorkflowNotFound(workflow_id.to_string()))
    }

    // -- discover / search_capabilities --------------------------------

    pub async fn discover(
        &self,
        intent: &str,
        filter: &SearchFilter,
        limit: usize,
        include_related: bool,
    ) -> Vec<CandidateDto> {
        let candidates = self.scoring.discover(intent, limit, filter).await;
        let mut dtos: Vec<CandidateDto> = candidates.iter().map(candidate_to_dto).collect();

        if include_related {
            if let Some(top) = candidates.first() {
                for kind in [hypergate_core::EdgeKind::Provides, hypergate_core::EdgeKind::Sequence] {
                    for neighbor in self.graph.neighbors(top.id, kind) {
                        if candidates.iter().any(|c| c.id == neighbor) {
                            continue;
                        }
                        if let Some(node) = self.graph.get_node(neighbor) {
                            dtos.push(CandidateDto {
                                kind: if node.is_meta_capability() || matches!(node, Node::Capability(_)) {
                                    "capability".to_string()
                                } else {
                                    "tool".to_string()
                                },
                                id: neighbor.to_string(),
                                name: node.display_name(),
                                description: String::new(),
                                score: top.score * 0.5,
                            });
                        }
                    }
                }
            }
        }

        dtos
    }

    pub async fn search_capabilities(&self, intent: &str, limit: usize) -> Vec<CandidateDto> {
        let filter = SearchFilter {
            kind: Some(CandidateKind::Capability),
            min_score: 0.0,
        };
        let candidates = self.scoring.discover(intent, limit, &filter).await;
        candidates.iter().map(candidate_to_dto).collect()
    }

    // -- DAG construction from the wire shape --------------------------

    fn is_critical(&self, node: Option<&Node>) -> bool {
        match node {
            Some(Node::Tool(tool)) => RiskCategory::classify(&tool.name) == RiskCategory::Dangerous,
            _ => false,
        }
    }

    fn task_from_dto(&self, dto: TaskDto) -> Result<Task> {
        let tool_or_cap_id: NodeId = dto
            .tool_or_cap_id
            .parse()
            .map_err(|_| GatewayError::InvalidParams(format!("invalid id {}", dto.tool_or_cap_id)))?;
        let node = self.graph.get_node(tool_or_cap_id);
        let kind = match dto.kind.as_deref() {
            Some("capability") => TaskKind::Capability,
            Some("tool") => TaskKind::Tool,
            _ => match &node {
                Some(Node::Capability(_)) => TaskKind::Capability,
                _ => TaskKind::Tool,
            },
        };
        let critical = dto.critical.unwrap_or_else(|| self.is_critical(node.as_ref()));

        Ok(Task {
            id: dto.id,
            tool_or_cap_id,
            kind,
            arguments: dto.arguments,
            depends_on: dto.depends_on,
            critical,
            safe_to_retry: dto.safe_to_retry,
        })
    }

    fn dag_from_dto(&self, dto: DagDto) -> Result<Dag> {
        let tasks = dto
            .tasks
            .into_iter()
            .map(|t| self.task_from_dto(t))
            .collect::<Result<Vec<_>>>()?;
        Ok(Dag { tasks })
    }

    /// Confidence per task for a caller-supplied explicit DAG: the
    /// graph's current `successRate` stands in for the scoring engine's
    /// per-call score, since no discovery pass produced one.
    fn predicted_confidence_for(&self, dag: &Dag) -> HashMap<NodeId, f64> {
        dag.tasks
            .iter()
            .map(|t| {
                let rate = match self.graph.get_node(t.tool_or_cap_id) {
                    Some(Node::Tool(tool)) => tool.success_rate,
                    Some(Node::Capability(cap)) => cap.success_rate,
                    None => 0.75,
                };
                (t.tool_or_cap_id, rate)
            })
            .collect()
    }

    async fn plan_from_intent(&self, intent: &str) -> (Dag, HashMap<NodeId, f64>, Vec<Candidate>) {
        let candidates = self
            .scoring
            .discover(intent, DEFAULT_TOP_K, &SearchFilter::default())
            .await;
        let dag = build_dag(&self.graph, &candidates, DEFAULT_TOP_K);
        let predicted: HashMap<NodeId, f64> = candidates.iter().map(|c| (c.id, c.score)).collect();
        (dag, predicted, candidates)
    }

    /// C9 gates the confidence decision: if the first layer's
    /// best candidate falls below its adaptive threshold, the request is
    /// answered with a `suggestion` instead of being dispatched.
    fn confidence_gate(&self, dag: &Dag, predicted: &HashMap<NodeId, f64>) -> bool {
        let Some(layers) = dag.layers() else {
            return false;
        };
        let Some(first_layer) = layers.first() else {
            return false;
        };
        let snapshot = self.analytics.get(&self.graph);

        first_layer.iter().any(|task_id| {
            let Some(task) = dag.task(task_id) else {
                return false;
            };
            let local_alpha = predicted.get(&task.tool_or_cap_id).copied().unwrap_or(0.75);
            let tool_name = self.node_name(task.tool_or_cap_id);
            let episodic_boost = self.learning.episodic().episodic_boost(
                task.tool_or_cap_id,
                local_alpha,
                EPISODIC_WINDOW_DAYS,
                Some(snapshot.communities.as_ref()),
            );
            let threshold = self.learning.thresholds().get_threshold(
                task.tool_or_cap_id,
                &tool_name,
                local_alpha,
                episodic_boost,
            );
            local_alpha < threshold
        })
    }

    // -- execute_dag / continue / abort / approval_response ------------

    pub async fn execute_dag(&self, req: ExecuteDagRequest) -> Result<WorkflowEnvelope> {
        match (req.workflow, req.intent) {
            (Some(dto), _) => {
                let dag = self.dag_from_dto(dto)?;
                let predicted = self.predicted_confidence_for(&dag);
                self.start_workflow(dag, None, predicted, req.config.per_layer_validation)
                    .await
            }
            (None, Some(intent)) => {
                let (dag, predicted, candidates) = self.plan_from_intent(&intent).await;
                if dag.tasks.is_empty() || self.confidence_gate(&dag, &predicted) {
                    return Ok(WorkflowEnvelope::Suggestion {
                        candidates: candidates.iter().map(candidate_to_dto).collect(),
                    });
                }
                self.start_workflow(dag, Some(intent), predicted, req.config.per_layer_validation)
                    .await
            }
            (None, None) => Err(GatewayError::InvalidParams(
                "execute_dag requires either `workflow` or `intent`".to_string(),
            )),
        }
    }

    async fn start_workflow(
        &self,
        dag: Dag,
        intent: Option<String>,
        predicted_confidence: HashMap<NodeId, f64>,
        per_layer_validation: bool,
    ) -> Result<WorkflowEnvelope> {
        let intent_embedding = match &intent {
            Some(text) => self.index.encode(text).await,
            None => Vec::new(),
        };
        let scheduler_config =
            SchedulerConfig::from_gateway_config(&self.config, Some(per_layer_validation));

        let (workflow_id, events) = self.registry.spawn(
            self.graph.clone(),
            self.scoring.clone(),
            self.executor.clone(),
            self.checkpoints.clone(),
            dag.clone(),
            intent.clone(),
            scheduler_config,
        );

        let session = Arc::new(AsyncMutex::new(WorkflowSession {
            events,
            dag,
            intent,
            intent_embedding,
            predicted_confidence,
            per_layer_validation,
            layer_results: Vec::new(),
            current_layer: Vec::new(),
            started_at: Instant::now(),
        }));
        self.sessions.insert(workflow_id, session.clone());

        self.drive(workflow_id, session).await
    }

    pub async fn continue_workflow(
        &self,
        workflow_id: WorkflowId,
        reason: Option<String>,
    ) -> Result<WorkflowEnvelope> {
        let session = self.get_session(workflow_id)?;
        self.registry
            .send_command(workflow_id, Command::Continue { reason })?;
        self.drive(workflow_id, session).await
    }

    pub async fn abort_workflow(&self, workflow_id: WorkflowId, reason: String) -> Result<WorkflowEnvelope> {
        let session = self.get_session(workflow_id)?;
        self.registry
            .send_command(workflow_id, Command::Abort { reason })?;
        self.drive(workflow_id, session).await
    }

    pub async fn approval_response(
        &self,
        workflow_id: WorkflowId,
        checkpoint_id: String,
        approved: bool,
        feedback: Option<String>,
    ) -> Result<WorkflowEnvelope> {
        let checkpoint_id: CheckpointId = checkpoint_id
            .parse()
            .map_err(|_| GatewayError::InvalidParams(format!("invalid checkpoint_id {checkpoint_id}")))?;
        let session = self.get_session(workflow_id)?;
        self.registry.send_command(
            workflow_id,
            Command::ApprovalResponse {
                checkpoint_id,
                approved,
                feedback,
            },
        )?;
        self.drive(workflow_id, session).await
    }

    /// Mid-workflow DAG augmentation: computed here so the
    /// response can report `new_tasks_count`/`task_ids`, and mirrored to
    /// the live scheduler as a `replan_dag` command so it augments its
    /// own in-flight copy identically.
    pub async fn replan_workflow(
        &self,
        workflow_id: WorkflowId,
        new_requirement: String,
        available_context: Value,
    ) -> Result<ReplanEnvelope> {
        let session = self.get_session(workflow_id)?;
        let mut guard = session.lock().await;

        let completed_task_ids: Vec<TaskId> = guard
            .layer_results
            .iter()
            .flatten()
            .map(|o| o.task_id.clone())
            .collect();

        let outcome = replan(
            &self.graph,
            &self.scoring,
            ReplanRequest {
                current_dag: &guard.dag,
                completed_task_ids: &completed_task_ids,
                new_requirement: &new_requirement,
                available_context: &available_context,
            },
        )
        .await?;

        for task in &outcome.dag.tasks {
            guard.predicted_confidence.entry(task.tool_or_cap_id).or_insert(0.75);
        }
        guard.dag = outcome.dag;
        let new_task_ids = outcome.new_task_ids;
        drop(guard);

        self.registry.send_command(
            workflow_id,
            Command::ReplanDag {
                new_requirement,
                available_context,
            },
        )?;

        Ok(ReplanEnvelope {
            workflow_id: workflow_id.to_string(),
            new_tasks_count: new_task_ids.len(),
            task_ids: new_task_ids,
        })
    }

    /// Pumps the workflow's event stream until something MCP-call-shaped
    /// happens: a paused layer (only in per-layer-validation mode), a
    /// HIL decision, or a terminal state.
    async fn drive(
        &self,
        workflow_id: WorkflowId,
        session: Arc<AsyncMutex<WorkflowSession>>,
    ) -> Result<WorkflowEnvelope> {
        let mut guard = session.lock().await;

        loop {
            match guard.events.recv().await {
                Some(ExecutionEvent::WorkflowStart { .. }) | Some(ExecutionEvent::TaskStart { .. }) => {
                    continue;
                }
                Some(ExecutionEvent::TaskComplete { task_id, result, .. }) => {
                    guard.current_layer.push(TaskOutcomeDto {
                        task_id,
                        success: result.success,
                        output: result.output,
                        error: result.error,
                    });
                }
                Some(ExecutionEvent::TaskError { task_id, message, .. }) => {
                    guard.current_layer.push(TaskOutcomeDto {
                        task_id,
                        success: false,
                        output: None,
                        error: Some(message),
                    });
                }
                Some(ExecutionEvent::Checkpoint { layer, .. }) => {
                    let finished_layer = std::mem::take(&mut guard.current_layer);
                    guard.layer_results.push(finished_layer.clone());
                    if guard.per_layer_validation {
                        return Ok(WorkflowEnvelope::LayerComplete {
                            workflow_id: workflow_id.to_string(),
                            layer_index: layer,
                            layer_results: finished_layer,
                            options: vec!["continue".into(), "replan".into(), "abort".into()],
                        });
                    }
                }
                Some(ExecutionEvent::DecisionRequired {
                    layer,
                    task_id,
                    checkpoint_id,
                    ..
                }) => {
                    return Ok(WorkflowEnvelope::DecisionRequired {
                        workflow_id: workflow_id.to_string(),
                        layer_index: layer,
                        task_id,
                        checkpoint_id: checkpoint_id.to_string(),
                    });
                }
                Some(ExecutionEvent::WorkflowComplete { .. }) => {
                    self.finish(workflow_id, &guard).await;
                    let layer_results = guard.layer_results.clone();
                    drop(guard);
                    self.sessions.remove(&workflow_id);
                    return Ok(WorkflowEnvelope::Complete {
                        workflow_id: workflow_id.to_string(),
                        layer_results,
                    });
                }
                Some(ExecutionEvent::WorkflowAborted { reason, .. }) => {
                    self.finish(workflow_id, &guard).await;
                    let layer_results = guard.layer_results.clone();
                    drop(guard);
                    self.sessions.remove(&workflow_id);
                    return Ok(WorkflowEnvelope::Aborted {
                        workflow_id: workflow_id.to_string(),
                        reason,
                        layer_results,
                    });
                }
                None => {
                    // The registry's background task inserts the final
                    // `WorkflowState` immediately after its last event
                    // send, with no further await between the two; a
                    // short bounded retry absorbs that race.
                    for _ in 0..32 {
                        if let Some(state) = self.registry.final_state(workflow_id) {
                            drop(guard);
                            self.sessions.remove(&workflow_id);
                            return Ok(envelope_from_final_state(workflow_id, &state));
                        }
                        tokio::task::yield_now().await;
                    }
                    return Err(GatewayError::WorkflowNotFound(workflow_id.to_string()));
                }
            }
        }
    }

    async fn finish(&self, workflow_id: WorkflowId, session: &WorkflowSession) {
        let task_results: Vec<Vec<TaskResult>> = session
            .layer_results
            .iter()
            .map(|layer| layer.iter().map(outcome_dto_to_task_result).collect())
            .collect();

        let completed = CompletedWorkflow {
            workflow_id,
            intent: session.intent.as_deref(),
            intent_embedding: session.intent_embedding.clone(),
            dag: &session.dag,
            layer_results: &task_results,
            predicted_confidence: session.predicted_confidence.clone(),
            duration_ms: session.started_at.elapsed().as_millis() as u64,
            executed_code: None,
        };
        self.learning.on_workflow_complete(completed).await;
    }

    // -- execute_code ---------------------------------------------------

    pub async fn execute_code(&self, req: ExecuteCodeRequest) -> Result<ExecuteCodeResponse> {
        let started = Instant::now();
        let request = SandboxRequest {
            tool_definitions: Vec::new(),
            code: req.code.clone(),
            context: req.context,
        };
        let outcome = self.executor.run_sandbox(request).await?;
        let duration_ms = started.elapsed().as_millis() as u64;

        if let Some(error) = outcome.error {
            return Err(GatewayError::SandboxError(error));
        }

        for pair in outcome.tools_called.windows(2) {
            if let Err(err) = self
                .graph
                .upsert_observed_edge(pair[0], pair[1], hypergate_core::EdgeKind::Sequence)
            {
                tracing::warn!(error = %err, "execute_code: failed to record observed sequence edge");
            }
        }

        let capability_id = match self
            .learning
            .miner()
            .mine(&req.code, &outcome.tools_called, req.intent.as_deref())
            .await
        {
            Ok(id) => Some(id.to_string()),
            Err(err) => {
                tracing::warn!(error = %err, "execute_code: capability mining failed");
                None
            }
        };

        Ok(ExecuteCodeResponse {
            result: outcome.result,
            tools_called: outcome.tools_called.iter().map(|id| id.to_string()).collect(),
            duration_ms,
            capability_id,
        })
    }
}

fn envelope_from_final_state(workflow_id: WorkflowId, state: &WorkflowState) -> WorkflowEnvelope {
    let layer_results: Vec<Vec<TaskOutcomeDto>> = state
        .layer_results
        .iter()
        .map(|layer| layer.iter().map(task_result_to_dto).collect())
        .collect();

    match state.status {
        WorkflowStatus::Aborted => WorkflowEnvelope::Aborted {
            workflow_id: workflow_id.to_string(),
            reason: "workflow aborted".to_string(),
            layer_results,
        },
        _ => WorkflowEnvelope::Complete {
            workflow_id: workflow_id.to_string(),
            layer_results,
        },
    }
}
