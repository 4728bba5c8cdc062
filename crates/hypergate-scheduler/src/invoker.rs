//! The scheduler's only collaborator contract for actually running a task
//! (a sandbox call for capabilities, a plain downstream MCP call for
//! tools). `hypergate-mcp` supplies the real implementation; tests use an
//! in-memory fake.

use async_trait::async_trait;
use hypergate_core::{Result, Task};
use serde_json::Value;

#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Runs one task to completion (or error). The scheduler applies the
    /// per-task timeout around this call; implementations should not
    /// impose their own conflicting deadline.
    async fn execute(&self, task: &Task) -> Result<Value>;
}
