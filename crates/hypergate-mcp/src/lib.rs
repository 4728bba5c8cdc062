//! External MCP surface: wires the graph,
//! vector, scoring, planner, scheduler and learning crates behind a
//! `rmcp` tool router served over stdio or streamable HTTP.

pub mod app;
pub mod downstream;
pub mod sandbox;
pub mod server;
pub mod task_executor;
pub mod transport;
pub mod wire;

pub use app::GatewayApp;
pub use server::HyperGateServer;
pub use transport::{serve_http, serve_stdio};
