//! Core types, error taxonomy and configuration shared by every HyperGate
//! crate. Every other crate holds only ids into the structures defined
//! here; the `hypergate-graph` store is the sole owner of node/edge records
//! and `hypergate-scheduler` is the sole owner of live `WorkflowState`.

pub mod config;
pub mod error;
pub mod types;
pub mod workflow;

pub use config::GatewayConfig;
pub use error::{ErrorKind, GatewayError, Result};
pub use types::{
    CapabilityNode, Edge, EdgeId, EdgeKind, EdgeSource, Node, NodeId, StaticEdgeKind, StaticStep,
    ToolNode,
};
pub use workflow::{
    Checkpoint, CheckpointId, Command, Dag, EpisodicTrace, ExecutionEvent, Task, TaskId, TaskKind,
    TaskResult, ThompsonState, TraceId, WorkflowId, WorkflowState, WorkflowStatus,
};
