//! The scheduler's `TaskExecutor` implementation: dispatches a `Tool` task
//! to the downstream multiplexer and a `Capability` task into the
//! sandbox, answering the sandbox's RPC bridge callbacks by recursing
//! back into the same downstream dispatch.

use crate::downstream::DownstreamClient;
use crate::sandbox::{BridgeCall, SandboxClient, SandboxRequest, ToolBridge};
use async_trait::async_trait;
use hypergate_core::{GatewayError, Node, Result, Task, TaskKind};
use hypergate_graph::SuperHyperGraph;
use hypergate_scheduler::TaskExecutor;
use serde_json::Value;
use std::sync::Arc;

pub struct GatewayTaskExecutor {
    graph: Arc<SuperHyperGraph>,
    downstream: Arc<dyn DownstreamClient>,
    sandbox: Arc<dyn SandboxClient>,
}

impl GatewayTaskExecutor {
    pub fn new(
        graph: Arc<SuperHyperGraph>,
        downstream: Arc<dyn DownstreamClient>,
        sandbox: Arc<dyn SandboxClient>,
    ) -> Self {
        Self {
            graph,
            downstream,
            sandbox,
        }
    }

    async fn call_tool_node(&self, tool_node_id: hypergate_core::NodeId, args: &Value) -> Result<Value> {
        match self.graph.get_node(tool_node_id) {
            Some(Node::Tool(tool)) => self.downstream.call(&tool.server_id, &tool.name, args).await,
            Some(Node::Capability(_)) => Err(GatewayError::ToolNotFound(format!(
                "{tool_node_id} names a capability, not a raw tool"
            ))),
            None => Err(GatewayError::ToolNotFound(tool_node_id.to_string())),
        }
    }

    /// Runs a sandbox request standalone, outside a scheduled `Task`
    /// (used by `execute_code`, which has no DAG or capability node yet).
    pub async fn run_sandbox(
        &self,
        request: crate::sandbox::SandboxRequest,
    ) -> Result<crate::sandbox::SandboxResult> {
        self.sandbox.run(request, self).await
    }

    fn tool_definitions_for(&self, tools_used: &[hypergate_core::NodeId]) -> Vec<Value> {
        tools_used
            .iter()
            .filter_map(|id| self.graph.get_node(*id))
            .filter_map(|node| match node {
                Node::Tool(tool) => Some(serde_json::json!({
                    "id": tool.id,
                    "name": tool.name,
                    "description": tool.description,
                    "input_schema": tool.input_schema,
                })),
                Node::Capability(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl TaskExecutor for GatewayTaskExecutor {
    async fn execute(&self, task: &Task) -> Result<Value> {
        match task.kind {
            TaskKind::Tool => self.call_tool_node(task.tool_or_cap_id, &task.arguments).await,
            TaskKind::Capability => {
                let Some(Node::Capability(capability)) = self.graph.get_node(task.tool_or_cap_id)
                else {
                    return Err(GatewayError::ToolNotFound(task.tool_or_cap_id.to_string()));
                };

                let request = SandboxRequest {
                    tool_definitions: self.tool_definitions_for(&capability.tools_used),
                    code: capability.code.clone(),
                    context: task.arguments.clone(),
                };

                let outcome = self.sandbox.run(request, self).await?;
                if let Some(error) = outcome.error {
                    return Err(GatewayError::SandboxError(error));
                }

                Ok(serde_json::json!({
                    "result": outcome.result,
                    "tools_called": outcome.tools_called,
                    "traces": outcome.traces,
                }))
            }
        }
    }
}

#[async_trait]
impl ToolBridge for GatewayTaskExecutor {
    async fn call_tool(&self, call: BridgeCall) -> Result<Value> {
        self.call_tool_node(call.tool_id, &call.args).await
    }
}
