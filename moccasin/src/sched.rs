//! Static dataflow scheduling.
//!
//! A [`Schedule`] is computed from the per-firing rates declared on the ports
//! of the actors of a composite:
//!
//! 1. the balance equations `count(A) * rate(A.out) = count(B) * rate(B.in)`
//!    are solved for the smallest positive integer repetition vector of each
//!    connected component,
//! 2. one period is simulated from the initial tokens, repeatedly firing the
//!    first actor in declaration order which has enough input tokens, as many
//!    times as it can,
//! 3. the peak occupancy of each connection during the simulated period gives
//!    the capacity of its receiver.
//!
//! A period leaves the occupancy of every connection unchanged. The
//! simulation fails if a cycle does not carry enough initial tokens.

mod balance;
mod causality;

use std::fmt;

use tracing::debug;

use crate::composite::{ActorId, ConnectionId, Edge, Graph, PortLoc};
use crate::error::SchedulingError;

use balance::RateEdge;

pub(crate) use causality::CausalOrder;

/// A run of consecutive firings of the same actor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Firing {
    actor: ActorId,
    count: usize,
}

impl Firing {
    /// Returns the fired actor.
    pub fn actor(&self) -> ActorId {
        self.actor
    }

    /// Returns the number of consecutive firings.
    pub fn count(&self) -> usize {
        self.count
    }
}

/// A repeating firing sequence satisfying the balance equations.
#[derive(Clone, PartialEq, Eq)]
pub struct Schedule {
    firings: Vec<Firing>,
    repetitions: Vec<(ActorId, usize)>,
    buffer_sizes: Vec<(ConnectionId, usize)>,
    version: u64,
}

impl Schedule {
    pub(crate) fn compute(graph: &Graph, edges: &[Edge]) -> Result<Self, SchedulingError> {
        let position = |id: ActorId| graph.position(id);
        let n = graph.order.len();

        // Rate constraints between contained actors, with the index of the
        // corresponding edge.
        let mut inner: Vec<(usize, RateEdge)> = Vec::new();
        for (k, edge) in edges.iter().enumerate() {
            let source_spec = graph.source_spec(edge.source);
            let sink_spec = graph.sink_spec(edge.sink);
            if source_spec.rate() == 0 {
                return Err(SchedulingError::ZeroRate {
                    port: graph.qualified(edge.source, source_spec),
                });
            }
            if sink_spec.rate() == 0 {
                return Err(SchedulingError::ZeroRate {
                    port: graph.qualified(edge.sink, sink_spec),
                });
            }
            if let (Some(s), Some(d)) = (
                edge.source.actor().and_then(position),
                edge.sink.actor().and_then(position),
            ) {
                inner.push((
                    k,
                    RateEdge {
                        source: s,
                        production: source_spec.rate(),
                        sink: d,
                        consumption: sink_spec.rate(),
                    },
                ));
            }
        }

        let rate_edges: Vec<RateEdge> = inner.iter().map(|&(_, e)| e).collect();
        let repetitions = balance::solve(n, &rate_edges).map_err(|i| {
            let edge = edges[inner[i].0];
            SchedulingError::InconsistentRates {
                port: graph.qualified(edge.sink, graph.sink_spec(edge.sink)),
            }
        })?;

        // Boundary rates must match what one period moves across the
        // boundary.
        let mut buffer_sizes: Vec<(ConnectionId, usize)> = Vec::new();
        for edge in edges {
            let (boundary, actor, rate) = match (edge.source, edge.sink) {
                (PortLoc::Boundary(b), PortLoc::Actor(id, _)) => (
                    &graph.boundary_inputs[b],
                    id,
                    graph.sink_spec(edge.sink).rate(),
                ),
                (PortLoc::Actor(id, _), PortLoc::Boundary(b)) => (
                    &graph.boundary_outputs[b],
                    id,
                    graph.source_spec(edge.source).rate(),
                ),
                _ => continue,
            };
            let reps = position(actor).map_or(0, |i| repetitions[i]);
            let required = rate * reps;
            if boundary.rate() != required {
                return Err(SchedulingError::BoundaryRateMismatch {
                    port: format!("{}.{}", graph.name, boundary.name()),
                    declared: boundary.rate(),
                    required,
                });
            }
            buffer_sizes.push((edge.id, required));
        }

        // Simulate one period.
        let mut occupancy: Vec<usize> = inner
            .iter()
            .map(|&(k, _)| graph.source_spec(edges[k].source).initial_tokens().len())
            .collect();
        let mut peak = occupancy.clone();
        let mut remaining = repetitions.clone();
        let mut firings: Vec<Firing> = Vec::new();

        let can_fire = |i: usize, occupancy: &[usize]| {
            inner
                .iter()
                .zip(occupancy)
                .all(|(&(_, e), &occ)| e.sink != i || occ >= e.consumption)
        };

        while remaining.iter().any(|&r| r > 0) {
            let Some(i) = (0..n).find(|&i| remaining[i] > 0 && can_fire(i, &occupancy)) else {
                let actors = (0..n)
                    .filter(|&i| remaining[i] > 0)
                    .filter_map(|i| graph.slot(graph.order[i]).map(|s| s.name.clone()))
                    .collect();

                return Err(SchedulingError::Deadlock { actors });
            };

            let mut count = 0;
            while remaining[i] > 0 && can_fire(i, &occupancy) {
                // Production is accounted before consumption so that the peak
                // of a self-loop covers an actor sending before it reads.
                for (slot, &(_, e)) in inner.iter().enumerate() {
                    if e.source == i {
                        occupancy[slot] += e.production;
                        peak[slot] = peak[slot].max(occupancy[slot]);
                    }
                }
                for (slot, &(_, e)) in inner.iter().enumerate() {
                    if e.sink == i {
                        occupancy[slot] -= e.consumption;
                    }
                }
                remaining[i] -= 1;
                count += 1;
            }

            let actor = graph.order[i];
            match firings.last_mut() {
                Some(last) if last.actor == actor => last.count += count,
                _ => firings.push(Firing { actor, count }),
            }
        }

        for (slot, &(k, _)) in inner.iter().enumerate() {
            buffer_sizes.push((edges[k].id, peak[slot].max(1)));
        }
        buffer_sizes.sort_by_key(|&(id, _)| id);

        let schedule = Self {
            firings,
            repetitions: graph.order.iter().copied().zip(repetitions).collect(),
            buffer_sizes,
            version: graph.version,
        };
        debug!(composite = %graph.name, schedule = ?schedule, "computed dataflow schedule");

        Ok(schedule)
    }

    /// Returns the firing sequence of one period.
    pub fn firings(&self) -> &[Firing] {
        &self.firings
    }

    /// Iterates over the firing sequence of one period, one actor per
    /// firing.
    pub fn iter(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.firings
            .iter()
            .flat_map(|f| std::iter::repeat(f.actor).take(f.count))
    }

    /// Returns the number of firings of an actor per period.
    pub fn repetitions(&self, actor: ActorId) -> usize {
        self.repetitions
            .iter()
            .find(|(a, _)| *a == actor)
            .map_or(0, |&(_, r)| r)
    }

    /// Returns the receiver capacity required by a connection.
    pub fn buffer_size(&self, connection: ConnectionId) -> Option<usize> {
        self.buffer_sizes
            .iter()
            .find(|(c, _)| *c == connection)
            .map(|&(_, size)| size)
    }

    /// Returns the version of the graph the schedule was computed for.
    pub fn version(&self) -> u64 {
        self.version
    }
}

impl fmt::Debug for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schedule")
            .field(
                "firings",
                &self
                    .firings
                    .iter()
                    .map(|f| (f.actor.0, f.count))
                    .collect::<Vec<_>>(),
            )
            .field("buffer_sizes", &self.buffer_sizes)
            .field("version", &self.version)
            .finish()
    }
}
