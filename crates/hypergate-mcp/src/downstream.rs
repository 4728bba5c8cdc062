//! Downstream MCP tool servers sit behind a single MCP endpoint as an
//! opaque collaborator the core only ever calls by
//! `(server_id, tool name, arguments)`. Keeping the actual downstream
//! dispatch behind a narrow trait means the scheduler never depends on
//! transport details.

use async_trait::async_trait;
use dashmap::DashMap;
use hypergate_core::{GatewayError, Result};
use serde_json::Value;

#[async_trait]
pub trait DownstreamClient: Send + Sync {
    async fn call(&self, server_id: &str, tool_name: &str, arguments: &Value) -> Result<Value>;
}

/// In-process fixture standing in for the real downstream multiplexer.
/// Registered handlers let integration tests exercise end-to-end scenarios
/// without a network call.
pub struct MockDownstreamClient {
    handlers: DashMap<String, Box<dyn Fn(&Value) -> Result<Value> + Send + Sync>>,
}

impl Default for MockDownstreamClient {
    fn default() -> Self {
        let client = Self {
            handlers: DashMap::new(),
        };
        client.seed_fixtures();
        client
    }
}

impl MockDownstreamClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(server_id: &str, tool_name: &str) -> String {
        format!("{server_id}:{tool_name}")
    }

    pub fn register<F>(&self, server_id: &str, tool_name: &str, handler: F)
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.handlers
            .insert(Self::key(server_id, tool_name), Box::new(handler));
    }

    /// A handful of stand-in downstream tools covering integration-test
    /// scenarios (`fs:read_file`, `fs:list_dir`, `chat:post`, `db:drop_table`).
    fn seed_fixtures(&self) {
        self.register("fs", "read_file", |args| {
            let path = args.get("path").and_then(|v| v.as_str()).unwrap_or("");
            Ok(serde_json::json!({ "path": path, "content": "hello from disk" }))
        });
        self.register("fs", "list_dir", |args| {
            let path = args.get("path").and_then(|v| v.as_str()).unwrap_or("");
            Ok(serde_json::json!({
                "path": path,
                "entries": ["a.xml", "b.xml", "readme.md"],
            }))
        });
        self.register("chat", "post", |args| {
            let content = args.get("content").cloned().unwrap_or(Value::Null);
            Ok(serde_json::json!({ "posted": content }))
        });
        self.register("db", "drop_table", |args| {
            Ok(serde_json::json!({ "dropped": args.get("table") }))
        });
        self.register("fs", "parse_xml", |args| {
            Ok(serde_json::json!({ "parsed": args.get("files") }))
        });
    }
}

#[async_trait]
impl DownstreamClient for MockDownstreamClient {
    async fn call(&self, server_id: &str, tool_name: &str, arguments: &Value) -> Result<Value> {
        let key = Self::key(server_id, tool_name);
        match self.handlers.get(&key) {
            Some(handler) => handler(arguments),
            None => Err(GatewayError::ToolNotFound(key)),
        }
    }
}
