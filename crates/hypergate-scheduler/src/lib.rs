//! Execution Scheduler: layered DAG execution,
//! the command queue, checkpoints, HIL approval and resume.

pub mod checkpoint;
pub mod command_queue;
pub mod events;
pub mod executor;
pub mod invoker;
pub mod registry;
pub mod state;

pub use checkpoint::{CheckpointStore, InMemoryCheckpointStore};
pub use command_queue::{CommandSender, QueueClosed};
pub use events::EventSender;
pub use executor::{run_workflow, ResumeState, RunParams};
pub use invoker::TaskExecutor;
pub use registry::WorkflowRegistry;
pub use state::SchedulerConfig;
