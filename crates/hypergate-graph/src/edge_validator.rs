//! Edge Validator.
//!
//! For `contains`/`dependency` edges, a DFS from `to` following out-edges of
//! the same kind decides whether `from` is reachable; if so the insert would
//! close a cycle and is rejected. `provides`/`sequence` edges never need
//! this check — cycles are a legitimate relation for them, not an ownership
//! error.

use hypergate_core::{EdgeKind, GatewayError, NodeId, Result};
use std::collections::HashSet;

/// Anything the validator needs to read to decide reachability. Implemented
/// by the store so the validator stays a pure, independently testable unit.
pub trait AdjacencyView {
    fn out_neighbors(&self, node: NodeId, kind: EdgeKind) -> Vec<NodeId>;
}

pub struct EdgeValidator;

impl EdgeValidator {
    /// Returns `Ok(())` if inserting `from -> to` of `kind` would not create
    /// a cycle, or `Err(CycleRejected)` naming the alternative edge kind a
    /// caller should use instead.
    pub fn check<A: AdjacencyView>(adj: &A, from: NodeId, to: NodeId, kind: EdgeKind) -> Result<()> {
        if !kind.is_dag_strict() {
            return Ok(());
        }
        if from == to {
            return Err(GatewayError::CycleRejected(format!(
                "self-loop on node {from} for {kind:?} edge; consider a `provides` edge instead"
            )));
        }

        if Self::reachable(adj, to, from, kind) {
            return Err(GatewayError::CycleRejected(format!(
                "inserting {from} -> {to} ({kind:?}) would close a cycle back to {from}; \
                 consider a `provides` edge to express data flow without ordering"
            )));
        }
        Ok(())
    }

    fn reachable<A: AdjacencyView>(adj: &A, start: NodeId, target: NodeId, kind: EdgeKind) -> bool {
        let mut stack = vec![start];
        let mut seen = HashSet::new();
        while let Some(node) = stack.pop() {
            if node == target {
                return true;
            }
            if !seen.insert(node) {
                continue;
            }
            for next in adj.out_neighbors(node, kind) {
                if !seen.contains(&next) {
                    stack.push(next);
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use uuid::Uuid;

    struct FakeAdj(HashMap<(NodeId, EdgeKind), Vec<NodeId>>);

    impl AdjacencyView for FakeAdj {
        fn out_neighbors(&self, node: NodeId, kind: EdgeKind) -> Vec<NodeId> {
            self.0.get(&(node, kind)).cloned().unwrap_or_default()
        }
    }

    #[test]
    fn rejects_cycle_on_contains() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut map = HashMap::new();
        map.insert((a, EdgeKind::Contains), vec![b]);
        let adj = FakeAdj(map);

        // A --contains--> B already present; B --contains--> A would cycle.
        let result = EdgeValidator::check(&adj, b, a, EdgeKind::Contains);
        assert!(matches!(result, Err(GatewayError::CycleRejected(_))));
    }

    #[test]
    fn allows_cycle_on_provides() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut map = HashMap::new();
        map.insert((a, EdgeKind::Provides), vec![b]);
        let adj = FakeAdj(map);

        assert!(EdgeValidator::check(&adj, b, a, EdgeKind::Provides).is_ok());
    }

    #[test]
    fn allows_non_cyclic_insert() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let mut map = HashMap::new();
        map.insert((a, EdgeKind::Dependency), vec![b]);
        let adj = FakeAdj(map);

        assert!(EdgeValidator::check(&adj, b, c, EdgeKind::Dependency).is_ok());
    }
}
