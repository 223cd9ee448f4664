//! Causal ordering of same-tag firings.

use std::collections::{HashMap, VecDeque};

use crate::composite::{ActorId, Edge, Graph, PortLoc};
use crate::error::SchedulingError;

/// Topological levels of the actors of a graph.
///
/// The dependency graph has an edge from each actor to every actor it feeds,
/// except for connections leaving a delayed port. Actors of level 0 have no
/// same-tag dependency; the level of every other actor exceeds the level of
/// each of its dependencies.
#[derive(Clone, Debug, Default)]
pub(crate) struct CausalOrder {
    depths: HashMap<ActorId, usize>,
    order: Vec<ActorId>,
    version: u64,
}

impl CausalOrder {
    pub(crate) fn compute(graph: &Graph, edges: &[Edge]) -> Result<Self, SchedulingError> {
        let position: HashMap<ActorId, usize> =
            graph.order.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        let n = graph.order.len();

        let mut successors = vec![Vec::new(); n];
        let mut pending = vec![0usize; n];
        for edge in edges {
            let (PortLoc::Actor(src, _), PortLoc::Actor(dst, _)) = (edge.source, edge.sink) else {
                continue;
            };
            if graph.source_spec(edge.source).is_delayed() {
                continue;
            }
            let (Some(&s), Some(&d)) = (position.get(&src), position.get(&dst)) else {
                continue;
            };
            successors[s].push(d);
            pending[d] += 1;
        }

        let mut depth = vec![0usize; n];
        let mut ready: VecDeque<usize> = (0..n).filter(|&i| pending[i] == 0).collect();
        let mut visited = 0;
        while let Some(i) = ready.pop_front() {
            visited += 1;
            for &j in &successors[i] {
                depth[j] = depth[j].max(depth[i] + 1);
                pending[j] -= 1;
                if pending[j] == 0 {
                    ready.push_back(j);
                }
            }
        }

        if visited < n {
            let actors = (0..n)
                .filter(|&i| pending[i] > 0)
                .filter_map(|i| graph.slot(graph.order[i]).map(|s| s.name.clone()))
                .collect();

            return Err(SchedulingError::CausalityLoop { actors });
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|&i| (depth[i], i));

        Ok(Self {
            depths: graph
                .order
                .iter()
                .enumerate()
                .map(|(i, &id)| (id, depth[i]))
                .collect(),
            order: order.into_iter().map(|i| graph.order[i]).collect(),
            version: graph.version,
        })
    }

    /// Returns the level of an actor.
    pub(crate) fn depth(&self, actor: ActorId) -> usize {
        self.depths.get(&actor).copied().unwrap_or(0)
    }

    /// Returns the actors sorted by level, then by declaration order.
    pub(crate) fn order(&self) -> &[ActorId] {
        &self.order
    }

    pub(crate) fn version(&self) -> u64 {
        self.version
    }
}
