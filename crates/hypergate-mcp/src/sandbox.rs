//! Sandbox collaborator contract: the core hands a capability's code and
//! tool definitions to an opaque process and gets back a result plus a
//! trace of which tools it called; during execution the sandbox calls back
//! through an RPC bridge that the core answers with downstream results. A
//! real OS-level sandbox is out of scope here; this module is the seam
//! plus an in-process mock sufficient to drive `execute_code` end to end,
//! using a narrow request/response trait standing in for an external
//! process.

use async_trait::async_trait;
use hypergate_core::{NodeId, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{toolDefinitions, code, context}` sent to the sandbox.
#[derive(Debug, Clone)]
pub struct SandboxRequest {
    pub tool_definitions: Vec<Value>,
    pub code: String,
    pub context: Value,
}

/// `{callId, toolId, args}` the sandbox sends back through the RPC bridge;
/// the core replies with the downstream tool's result.
pub struct BridgeCall {
    pub call_id: u64,
    pub tool_id: NodeId,
    pub args: Value,
}

/// The core's side of the RPC bridge: answers a sandbox callback with the
/// real (or, under `dry_run`, mocked) downstream result.
#[async_trait]
pub trait ToolBridge: Send + Sync {
    async fn call_tool(&self, call: BridgeCall) -> Result<Value>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxTrace {
    pub call_id: u64,
    pub tool_id: NodeId,
    pub args: Value,
    pub result: Option<Value>,
    pub error: Option<String>,
}

/// `{result, toolsCalled[], traces[], error?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxResult {
    pub result: Value,
    pub tools_called: Vec<NodeId>,
    pub traces: Vec<SandboxTrace>,
    pub error: Option<String>,
}

#[async_trait]
pub trait SandboxClient: Send + Sync {
    async fn run(&self, request: SandboxRequest, bridge: &dyn ToolBridge) -> Result<SandboxResult>;
}

/// Executes a declarative tool-call list instead of real user code: each
/// non-empty line of `code` is `<tool-id-uuid> <json-args>`, run in order
/// against the bridge. Good enough to exercise `execute_code` without a
/// real code-execution sandbox.
#[derive(Default)]
pub struct MockSandboxClient;

impl MockSandboxClient {
    pub fn new() -> Self {
        Self
    }

    fn parse_line(line: &str) -> Option<(NodeId, Value)> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (id_part, rest) = line.split_once(char::is_whitespace).unwrap_or((line, "{}"));
        let tool_id = id_part.parse::<NodeId>().ok()?;
        let args: Value = serde_json::from_str(rest.trim()).unwrap_or(Value::Null);
        Some((tool_id, args))
    }
}

#[async_trait]
impl SandboxClient for MockSandboxClient {
    async fn run(&self, request: SandboxRequest, bridge: &dyn ToolBridge) -> Result<SandboxResult> {
        let mut tools_called = Vec::new();
        let mut traces = Vec::new();
        let mut last_result = request.context.clone();
        let mut error = None;

        for (call_id, line) in request.code.lines().enumerate() {
            let Some((tool_id, args)) = Self::parse_line(line) else {
                continue;
            };
            let call_id = call_id as u64;
            match bridge
                .call_tool(BridgeCall {
                    call_id,
                    tool_id,
                    args: args.clone(),
                })
                .await
            {
                Ok(result) => {
                    tools_called.push(tool_id);
                    traces.push(SandboxTrace {
                        call_id,
                        tool_id,
                        args,
                        result: Some(result.clone()),
                        error: None,
                    });
                    last_result = result;
                }
                Err(err) => {
                    traces.push(SandboxTrace {
                        call_id,
                        tool_id,
                        args,
                        result: None,
                        error: Some(err.to_string()),
                    });
                    error = Some(err.to_string());
                    break;
                }
            }
        }

        Ok(SandboxResult {
            result: last_result,
            tools_called,
            traces,
            error,
        })
    }
}
