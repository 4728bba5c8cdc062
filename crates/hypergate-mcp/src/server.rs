//! The MCP tool surface: the 8 tools this gateway exposes over `rmcp`'s
//! JSON-RPC router — a plain struct holding a `ToolRouter<Self>`, one
//! `#[tool]` method per operation, parameters via `Parameters<T>`.

use crate::app::GatewayApp;
use crate::wire::{
    AbortRequest, ApprovalResponseRequestDto, ContinueRequest, DiscoverFilter, DiscoverRequest,
    ExecuteCodeRequest, ExecuteDagRequest, ReplanRequestDto, SearchCapabilitiesRequest,
};
use hypergate_core::GatewayError;
use hypergate_scoring::{CandidateKind, SearchFilter};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler,
};
use std::sync::Arc;

fn to_mcp_error(err: GatewayError) -> McpError {
    let kind = err.kind();
    let data = Some(serde_json::json!({ "kind": kind }));
    match err {
        GatewayError::InvalidParams(msg) => McpError::invalid_params(msg, data),
        other => McpError::internal_error(other.to_string(), data),
    }
}

fn json_result<T: serde::Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| McpError::internal_error(err.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

fn parse_filter(filter: Option<DiscoverFilter>) -> SearchFilter {
    match filter {
        Some(f) => SearchFilter {
            kind: match f.kind.as_deref() {
                Some("tool") => Some(CandidateKind::Tool),
                Some("capability") => Some(CandidateKind::Capability),
                _ => None,
            },
            min_score: f.min_score,
        },
        None => SearchFilter::default(),
    }
}

fn parse_workflow_id(raw: &str) -> Result<hypergate_core::WorkflowId, McpError> {
    raw.parse()
        .map_err(|_| McpError::invalid_params(format!("invalid workflow_id {raw}"), None))
}

#[derive(Clone)]
pub struct HyperGateServer {
    app: Arc<GatewayApp>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl HyperGateServer {
    pub fn new(app: Arc<GatewayApp>) -> Self {
        Self {
            app,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Active search over registered tools and capabilities for a natural-language intent. Returns a ranked list of {type, id, name, description, score}.")]
    async fn discover(
        &self,
        params: Parameters<DiscoverRequest>,
    ) -> Result<CallToolResult, McpError> {
        let request = params.0;
        let filter = parse_filter(request.filter);
        let candidates = self
            .app
            .discover(&request.intent, &filter, request.limit, request.include_related)
            .await;
        json_result(&candidates)
    }

    #[tool(description = "Retrieve the best-matching capability for an intent, if any.")]
    async fn search_capabilities(
        &self,
        params: Parameters<SearchCapabilitiesRequest>,
    ) -> Result<CallToolResult, McpError> {
        let request = params.0;
        let candidates = self.app.search_capabilities(&request.intent, request.limit).await;
        json_result(&candidates)
    }

    #[tool(description = "Run an explicit DAG or plan and run one from an intent. Returns a completed/suggestion/layer_complete/decision_required envelope.")]
    async fn execute_dag(
        &self,
        params: Parameters<ExecuteDagRequest>,
    ) -> Result<CallToolResult, McpError> {
        let envelope = self.app.execute_dag(params.0).await.map_err(to_mcp_error)?;
        json_result(&envelope)
    }

    #[tool(description = "Resume a workflow paused at a checkpoint (per-layer-validation mode).")]
    async fn r#continue(
        &self,
        params: Parameters<ContinueRequest>,
    ) -> Result<CallToolResult, McpError> {
        let request = params.0;
        let workflow_id = parse_workflow_id(&request.workflow_id)?;
        let envelope = self
            .app
            .continue_workflow(workflow_id, request.reason)
            .await
            .map_err(to_mcp_error)?;
        json_result(&envelope)
    }

    #[tool(description = "Abort a running or paused workflow.")]
    async fn abort(&self, params: Parameters<AbortRequest>) -> Result<CallToolResult, McpError> {
        let request = params.0;
        let workflow_id = parse_workflow_id(&request.workflow_id)?;
        let envelope = self
            .app
            .abort_workflow(workflow_id, request.reason)
            .await
            .map_err(to_mcp_error)?;
        json_result(&envelope)
    }

    #[tool(description = "Augment a running workflow's DAG with tasks discovered from a new requirement and available context.")]
    async fn replan(
        &self,
        params: Parameters<ReplanRequestDto>,
    ) -> Result<CallToolResult, McpError> {
        let request = params.0;
        let workflow_id = parse_workflow_id(&request.workflow_id)?;
        let envelope = self
            .app
            .replan_workflow(workflow_id, request.new_requirement, request.available_context)
            .await
            .map_err(to_mcp_error)?;
        json_result(&envelope)
    }

    #[tool(description = "Resolve a human-in-the-loop decision_required event for a critical task.")]
    async fn approval_response(
        &self,
        params: Parameters<ApprovalResponseRequestDto>,
    ) -> Result<CallToolResult, McpError> {
        let request = params.0;
        let workflow_id = parse_workflow_id(&request.workflow_id)?;
        let envelope = self
            .app
            .approval_response(workflow_id, request.checkpoint_id, request.approved, request.feedback)
            .await
            .map_err(to_mcp_error)?;
        json_result(&envelope)
    }

    #[tool(description = "Run user code in the sandbox with injected tool proxies; mines a reusable capability on success.")]
    async fn execute_code(
        &self,
        params: Parameters<ExecuteCodeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let response = self.app.execute_code(params.0).await.map_err(to_mcp_error)?;
        json_result(&response)
    }
}

#[tool_handler]
impl ServerHandler for HyperGateServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "HyperGate: a learning MCP gateway. `discover` tools/capabilities for an \
                 intent, then `execute_dag` to run one; `continue`/`abort`/`replan`/\
                 `approval_response` drive a paused or gated workflow; `execute_code` runs \
                 ad hoc sandboxed code and mines it into a reusable capability."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().enable_logging().build(),
            ..Default::default()
        }
    }
}
