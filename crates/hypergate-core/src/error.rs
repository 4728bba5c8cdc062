use thiserror::Error;

/// Error taxonomy surfaced at the MCP boundary. Every domain error
/// the gateway can produce maps to exactly one of these variants; callers
/// match on `kind()` rather than the `Display` string to stay stable across
/// wording changes.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("cycle rejected: {0}")]
    CycleRejected(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("task timed out: {0}")]
    Timeout(String),

    #[error("downstream error: {0}")]
    DownstreamError(String),

    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("approval timed out: {0}")]
    ApprovalTimeout(String),

    #[error("learning failure: {0}")]
    LearningFailure(String),

    #[error("sandbox error: {0}")]
    SandboxError(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

/// The `kind` tag sent in the JSON-RPC `data` field. Kept separate
/// from the `Error` impl so wire serialization doesn't depend on `Display`
/// wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    InvalidParams,
    CycleRejected,
    ToolNotFound,
    Timeout,
    DownstreamError,
    WorkflowNotFound,
    ApprovalTimeout,
    LearningFailure,
    SandboxError,
    Internal,
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::InvalidParams(_) => ErrorKind::InvalidParams,
            GatewayError::CycleRejected(_) => ErrorKind::CycleRejected,
            GatewayError::ToolNotFound(_) => ErrorKind::ToolNotFound,
            GatewayError::Timeout(_) => ErrorKind::Timeout,
            GatewayError::DownstreamError(_) => ErrorKind::DownstreamError,
            GatewayError::WorkflowNotFound(_) => ErrorKind::WorkflowNotFound,
            GatewayError::ApprovalTimeout(_) => ErrorKind::ApprovalTimeout,
            GatewayError::LearningFailure(_) => ErrorKind::LearningFailure,
            GatewayError::SandboxError(_) => ErrorKind::SandboxError,
            GatewayError::Io(_) | GatewayError::Serialization(_) | GatewayError::Configuration(_)
            | GatewayError::Validation(_) => ErrorKind::Internal,
        }
    }

    /// JSON-RPC 2.0 numeric code for the outer envelope.
    pub fn rpc_code(&self) -> i64 {
        match self {
            GatewayError::InvalidParams(_) => -32602,
            GatewayError::Serialization(_) => -32700,
            _ => -32603,
        }
    }
}
