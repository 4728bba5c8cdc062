//! MCP tool request/response shapes. Independent `schemars`
//! DTOs rather than reusing the domain types directly, following the
//! teacher's `official_server.rs` pattern (`SearchRequest`,
//! `GraphNeighborsRequest`, ...) of narrow per-tool parameter structs
//! decoupled from internal graph/workflow types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub fn default_limit() -> usize {
    5
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct DiscoverFilter {
    /// Restrict results to `"tool"` or `"capability"`; omit for both.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub min_score: f64,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DiscoverRequest {
    pub intent: String,
    #[serde(default)]
    pub filter: Option<DiscoverFilter>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub include_related: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateDto {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub name: String,
    pub description: String,
    pub score: f64,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TaskDto {
    pub id: String,
    pub tool_or_cap_id: String,
    /// `"tool"` or `"capability"`; inferred from the graph when omitted.
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Destructive/HIL-gated; inferred from the tool's risk category when
    /// omitted.
    #[serde(default)]
    pub critical: Option<bool>,
    #[serde(default)]
    pub safe_to_retry: bool,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DagDto {
    pub tasks: Vec<TaskDto>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ExecuteDagConfig {
    #[serde(default)]
    pub per_layer_validation: bool,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteDagRequest {
    #[serde(default)]
    pub workflow: Option<DagDto>,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub config: ExecuteDagConfig,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ContinueRequest {
    pub workflow_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AbortRequest {
    pub workflow_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReplanRequestDto {
    pub workflow_id: String,
    pub new_requirement: String,
    #[serde(default)]
    pub available_context: Value,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ApprovalResponseRequestDto {
    pub workflow_id: String,
    pub checkpoint_id: String,
    pub approved: bool,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteCodeRequest {
    pub code: String,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub context: Value,
    #[serde(default)]
    pub sandbox_config: Value,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchCapabilitiesRequest {
    pub intent: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcomeDto {
    pub task_id: String,
    pub success: bool,
    pub output: Option<Value>,
    pub error: Option<String>,
}

/// The `execute_dag`/`continue`/`abort`/`replan`/`approval_response` wire
/// envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkflowEnvelope {
    LayerComplete {
        workflow_id: String,
        layer_index: usize,
        layer_results: Vec<TaskOutcomeDto>,
        options: Vec<String>,
    },
    DecisionRequired {
        workflow_id: String,
        layer_index: usize,
        task_id: String,
        checkpoint_id: String,
    },
    Complete {
        workflow_id: String,
        layer_results: Vec<Vec<TaskOutcomeDto>>,
    },
    Aborted {
        workflow_id: String,
        reason: String,
        layer_results: Vec<Vec<TaskOutcomeDto>>,
    },
    /// Intent-only `execute_dag` whose best candidate fell below the
    /// adaptive threshold: returned instead of dispatching.
    Suggestion {
        candidates: Vec<CandidateDto>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplanEnvelope {
    pub workflow_id: String,
    pub new_tasks_count: usize,
    pub task_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecuteCodeResponse {
    pub result: Value,
    pub tools_called: Vec<String>,
    pub duration_ms: u64,
    pub capability_id: Option<String>,
}
