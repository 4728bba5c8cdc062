//! Episodic Trace Store: append-only,
//! prioritised-replay memory of execution outcomes.

use hypergate_core::{EpisodicTrace, NodeId};
use parking_lot::RwLock;
use rand::Rng;
use std::collections::HashMap;

const EPSILON: f64 = 1e-3;

fn priority_of(predicted: f64, actual: f64) -> f64 {
    (predicted - actual).abs().powf(0.6) + EPSILON
}

pub struct EpisodicStore {
    traces: RwLock<Vec<EpisodicTrace>>,
}

impl Default for EpisodicStore {
    fn default() -> Self {
        Self {
            traces: RwLock::new(Vec::new()),
        }
    }
}

impl EpisodicStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a trace, computing its initial priority from the
    /// scheduler's pre-execution confidence vs. the observed outcome.
    pub fn insert(&self, mut trace: EpisodicTrace, predicted_confidence: f64) {
        let actual = if trace.success { 1.0 } else { 0.0 };
        let td_error = predicted_confidence - actual;
        trace.td_error = td_error;
        trace.priority = priority_of(predicted_confidence, actual);
        self.traces.write().push(trace);
    }

    pub fn len(&self) -> usize {
        self.traces.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Prioritised-proportional sampling with importance-sampling
    /// correction: returns up to `k` traces paired with
    /// their weight `(1/(N·P))^β`, `β` annealed by the caller from
    /// 0.4 toward 1.0.
    pub fn sample(&self, k: usize, beta: f64) -> Vec<(EpisodicTrace, f64)> {
        let traces = self.traces.read();
        if traces.is_empty() || k == 0 {
            return Vec::new();
        }
        let total_priority: f64 = traces.iter().map(|t| t.priority).sum();
        if total_priority <= 0.0 {
            return Vec::new();
        }
        let n = traces.len() as f64;
        let mut rng = rand::rng();
        let mut out = Vec::with_capacity(k.min(traces.len()));

        for _ in 0..k.min(traces.len()) {
            let mut target = rng.random::<f64>() * total_priority;
            let mut chosen = traces.last().expect("non-empty");
            for t in traces.iter() {
                target -= t.priority;
                if target <= 0.0 {
                    chosen = t;
                    break;
                }
            }
            let prob = (chosen.priority / total_priority).max(f64::MIN_POSITIVE);
            let weight = (1.0 / (n * prob)).powf(beta);
            out.push((chosen.clone(), weight));
        }
        out
    }

    /// Recomputes a reused trace's priority from a fresh TD error (spec
    /// §4.10: "Priorities are recomputed when a trace is reused").
    pub fn update_priority(&self, trace_id: hypergate_core::TraceId, predicted: f64, actual: f64) {
        let mut traces = self.traces.write();
        if let Some(t) = traces.iter_mut().find(|t| t.trace_id == trace_id) {
            t.td_error = predicted - actual;
            t.priority = priority_of(predicted, actual);
        }
    }

    /// `findSimilar(toolId, localα, windowDays)`: traces
    /// whose per-tool confidence at dispatch time is close to the
    /// queried `localα`, touching the queried tool (exactly, or via its
    /// community when `communities` is supplied), within the recency
    /// window, most-recent first.
    pub fn find_similar(
        &self,
        tool_id: NodeId,
        local_alpha: f64,
        window_days: i64,
        communities: Option<&HashMap<NodeId, u64>>,
    ) -> Vec<EpisodicTrace> {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(window_days);
        let target_community = communities.and_then(|c| c.get(&tool_id).copied());

        let mut matches: Vec<EpisodicTrace> = self
            .traces
            .read()
            .iter()
            .filter(|t| t.timestamp >= cutoff)
            .filter(|t| {
                t.local_alpha
                    .get(&tool_id)
                    .map(|a| (a - local_alpha).abs() < 0.1)
                    .unwrap_or(false)
            })
            .filter(|t| {
                let touches_tool = t.path.contains(&tool_id);
                let touches_community = target_community
                    .and_then(|cid| {
                        communities.map(|c| {
                            t.path
                                .iter()
                                .any(|n| c.get(n).copied() == Some(cid))
                        })
                    })
                    .unwrap_or(false);
                touches_tool || touches_community
            })
            .cloned()
            .collect();

        matches.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matches
    }

    /// `clip(0.5·(rate-0.70), -0.10, +0.15) ·min(1, n/20)`, zero below
    /// `n < 3` matched traces.
    pub fn episodic_boost(
        &self,
        tool_id: NodeId,
        local_alpha: f64,
        window_days: i64,
        communities: Option<&HashMap<NodeId, u64>>,
    ) -> f64 {
        let matched = self.find_similar(tool_id, local_alpha, window_days, communities);
        let n = matched.len();
        if n < 3 {
            return 0.0;
        }
        let successes = matched.iter().filter(|t| t.success).count() as f64;
        let rate = successes / n as f64;
        let raw = (0.5 * (rate - 0.70)).max(-0.10).min(0.15);
        raw * (1.0_f64).min(n as f64 / 20.0)
    }

    /// Prunes traces below `floor` priority older than `retention_days`.
    pub fn prune(&self, floor: f64, retention_days: i64) {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(retention_days);
        self.traces
            .write()
            .retain(|t| t.priority >= floor || t.timestamp >= cutoff);
    }
}
