//! Pathfinder/DAG builder and mid-workflow replanner.

pub mod pathfinder;
pub mod replanner;

pub use pathfinder::{build_dag, DEFAULT_TOP_K, MAX_DEPENDENCY_PATH_LEN};
pub use replanner::{replan, ReplanOutcome, ReplanRequest};
