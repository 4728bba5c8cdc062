//! Adaptive Threshold Manager: per-tool Beta
//! posteriors sampled via Thompson sampling to derive a risk-aware
//! confidence threshold.

use chrono::Utc;
use dashmap::DashMap;
use hypergate_core::{NodeId, ThompsonState};
use rand_distr::{Distribution, Normal};

pub const DECAY: f64 = 0.99;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskCategory {
    Safe,
    Moderate,
    Dangerous,
}

impl RiskCategory {
    pub fn base_threshold(&self) -> f64 {
        match self {
            RiskCategory::Safe => 0.55,
            RiskCategory::Moderate => 0.70,
            RiskCategory::Dangerous => 0.85,
        }
    }

    /// Classifies by keyword in the tool's name/schema. Unmatched names
    /// default to `Moderate`: erring toward the stricter default is safer
    /// than assuming `Safe` for an unrecognised tool.
    pub fn classify(tool_name: &str) -> Self {
        let name = tool_name.to_ascii_lowercase();
        const SAFE: [&str; 5] = ["read", "list", "get", "search", "fetch"];
        const MODERATE: [&str; 6] = ["write", "create", "update", "commit", "push", "insert"];
        const DANGEROUS: [&str; 4] = ["delete", "remove", "drop", "truncate"];

        if DANGEROUS.iter().any(|k| name.contains(k)) || name.contains("reset") {
            RiskCategory::Dangerous
        } else if SAFE.iter().any(|k| name.contains(k)) || name.contains("query") {
            RiskCategory::Safe
        } else if MODERATE.iter().any(|k| name.contains(k)) {
            RiskCategory::Moderate
        } else {
            RiskCategory::Moderate
        }
    }
}

fn clip(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

pub struct AdaptiveThresholdManager {
    states: DashMap<NodeId, ThompsonState>,
    overrides: DashMap<NodeId, RiskCategory>,
}

impl Default for AdaptiveThresholdManager {
    fn default() -> Self {
        Self {
            states: DashMap::new(),
            overrides: DashMap::new(),
        }
    }
}

impl AdaptiveThresholdManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_risk_override(&self, tool_id: NodeId, category: RiskCategory) {
        self.overrides.insert(tool_id, category);
    }

    fn risk_category(&self, tool_id: NodeId, tool_name: &str) -> RiskCategory {
        self.overrides
            .get(&tool_id)
            .map(|e| *e)
            .unwrap_or_else(|| RiskCategory::classify(tool_name))
    }

    /// Decays and increments only the parameter matching this call's
    /// outcome (on success, α ← α·ρ + 1; on failure, β ← β·ρ + 1), which
    /// keeps both parameters monotonically ≥ 1 without an explicit floor.
    pub fn record_outcome(&self, tool_id: NodeId, success: bool) {
        let mut entry = self
            .states
            .entry(tool_id)
            .or_insert_with(|| ThompsonState::seeded(tool_id));
        if success {
            entry.alpha = entry.alpha * DECAY + 1.0;
        } else {
            entry.beta = entry.beta * DECAY + 1.0;
        }
        entry.last_updated = Utc::now();
    }

    /// Normal-approximated Beta(α, β) sample, using a normal distribution
    /// with matched mean and variance.
    fn sampled_success_rate(alpha: f64, beta: f64) -> f64 {
        let mean = alpha / (alpha + beta);
        let variance = (alpha * beta) / ((alpha + beta).powi(2) * (alpha + beta + 1.0));
        let std_dev = variance.max(0.0).sqrt();
        if std_dev == 0.0 {
            return mean;
        }
        let mut rng = rand::rng();
        let Ok(normal) = Normal::new(mean, std_dev) else {
            return mean;
        };
        clip(normal.sample(&mut rng), 0.0, 1.0)
    }

    /// `getThreshold(toolId, localα, ctx)`.
    pub fn get_threshold(
        &self,
        tool_id: NodeId,
        tool_name: &str,
        local_alpha: f64,
        episodic_boost: f64,
    ) -> f64 {
        let state = self
            .states
            .get(&tool_id)
            .map(|e| (e.alpha, e.beta))
            .unwrap_or((1.0, 1.0));
        let risk = self.risk_category(tool_id, tool_name);
        let base = risk.base_threshold();
        let s_hat = Self::sampled_success_rate(state.0, state.1);

        let threshold = clip(
            base + (0.75 - s_hat) * 0.15 + (local_alpha - 0.75) * 0.10 - episodic_boost,
            0.40,
            0.90,
        );

        if risk == RiskCategory::Dangerous {
            threshold.max(0.80)
        } else {
            threshold
        }
    }

    pub fn state_of(&self, tool_id: NodeId) -> ThompsonState {
        self.states
            .get(&tool_id)
            .map(|e| e.clone())
            .unwrap_or_else(|| ThompsonState::seeded(tool_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn risk_classification_matches_keyword_table() {
        assert_eq!(RiskCategory::classify("fs_read_file"), RiskCategory::Safe);
        assert_eq!(RiskCategory::classify("db_write_row"), RiskCategory::Moderate);
        assert_eq!(RiskCategory::classify("fs_delete_file"), RiskCategory::Dangerous);
    }

    #[test]
    fn thompson_state_never_drops_below_one() {
        let manager = AdaptiveThresholdManager::new();
        let tool = Uuid::new_v4();
        for _ in 0..50 {
            manager.record_outcome(tool, false);
        }
        let state = manager.state_of(tool);
        assert!(state.alpha >= 1.0);
        assert!(state.beta >= 1.0);
    }

    #[test]
    fn low_success_rate_raises_threshold_above_base_plus_margin() {
        let manager = AdaptiveThresholdManager::new();
        let tool = Uuid::new_v4();
        for _ in 0..10 {
            manager.record_outcome(tool, false);
        }
        let threshold = manager.get_threshold(tool, "fs_write_file", 0.75, 0.0);
        assert!(threshold >= RiskCategory::Moderate.base_threshold() + 0.075);
    }

    #[test]
    fn dangerous_tools_are_hard_floored() {
        let manager = AdaptiveThresholdManager::new();
        let tool = Uuid::new_v4();
        for _ in 0..20 {
            manager.record_outcome(tool, true);
        }
        let threshold = manager.get_threshold(tool, "db_drop_table", 0.75, 0.15);
        assert!(threshold >= 0.80);
    }
}
