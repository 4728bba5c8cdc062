//! Capability mining and the adaptive learning loop: turns executed
//! workflows into reusable capabilities, per-tool risk thresholds and
//! prioritised episodic replay memory.

pub mod capability_miner;
pub mod coordinator;
pub mod episodic_store;
pub mod threshold_manager;

pub use capability_miner::{code_hash, normalize_code, CapabilityMiner};
pub use coordinator::{CompletedWorkflow, LearningCoordinator};
pub use episodic_store::EpisodicStore;
pub use threshold_manager::{AdaptiveThresholdManager, RiskCategory, DECAY};
