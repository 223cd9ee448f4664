//! Topology of a composite actor.

use std::collections::HashMap;
use std::sync::Arc;

use slab::Slab;

use crate::actor::{ActorSlot, Frame, PortDirection, PortSpec};
use crate::composite::{ActorId, Connection, ConnectionId, Endpoint, PortRef};
use crate::error::{ActionError, ConfigurationError};
use crate::receiver::{PortAddress, Receiver};

/// Location of a resolved port.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum PortLoc {
    /// Port of a contained actor, with its index among the actor's inputs
    /// or outputs.
    Actor(ActorId, usize),
    /// Boundary port of the composite, with its index among the boundary
    /// inputs or outputs.
    Boundary(usize),
}

impl PortLoc {
    pub(crate) fn actor(&self) -> Option<ActorId> {
        match self {
            Self::Actor(id, _) => Some(*id),
            Self::Boundary(_) => None,
        }
    }
}

/// A connection with both ends resolved.
///
/// The source is either an actor output or a boundary input, and the sink
/// either an actor input or a boundary output.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Edge {
    pub(crate) id: ConnectionId,
    pub(crate) source: PortLoc,
    pub(crate) sink: PortLoc,
}

/// Description of a connection handed to receiver factories.
#[derive(Debug)]
pub(crate) struct Link<'a> {
    pub(crate) edge: Edge,
    pub(crate) producer_name: &'a str,
    pub(crate) consumer_name: &'a str,
    pub(crate) address: PortAddress,
}

/// Actors, boundary ports and connections of a composite.
#[derive(Debug)]
pub(crate) struct Graph {
    pub(crate) name: String,
    pub(crate) slots: Slab<ActorSlot>,
    /// Contained actors in the order they were added.
    pub(crate) order: Vec<ActorId>,
    /// Connections in the order they were made.
    pub(crate) connections: Vec<Connection>,
    pub(crate) boundary_inputs: Vec<PortSpec>,
    pub(crate) boundary_outputs: Vec<PortSpec>,
    /// Receivers fed by each channel of each boundary input.
    pub(crate) inside_outputs: Vec<Vec<Vec<Arc<dyn Receiver>>>>,
    /// Receivers bound to each channel of each boundary output.
    pub(crate) inside_inputs: Vec<Vec<Arc<dyn Receiver>>>,
    pub(crate) version: u64,
    next_connection: usize,
}

impl Graph {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            slots: Slab::new(),
            order: Vec::new(),
            connections: Vec::new(),
            boundary_inputs: Vec::new(),
            boundary_outputs: Vec::new(),
            inside_outputs: Vec::new(),
            inside_inputs: Vec::new(),
            version: 0,
            next_connection: 0,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.version += 1;
    }

    pub(crate) fn next_connection_id(&mut self) -> ConnectionId {
        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;

        id
    }

    pub(crate) fn slot(&self, id: ActorId) -> Option<&ActorSlot> {
        self.slots.get(id.0)
    }

    pub(crate) fn slot_mut(&mut self, id: ActorId) -> Option<&mut ActorSlot> {
        self.slots.get_mut(id.0)
    }

    /// Returns the declaration index of an actor.
    pub(crate) fn position(&self, id: ActorId) -> Option<usize> {
        self.order.iter().position(|&a| a == id)
    }

    /// Returns the name of the actor owning a port, or the name of the
    /// composite for a boundary port.
    pub(crate) fn owner_name(&self, loc: PortLoc) -> &str {
        match loc {
            PortLoc::Actor(id, _) => self.slot(id).map_or("?", |s| s.name.as_str()),
            PortLoc::Boundary(_) => &self.name,
        }
    }

    /// Returns the specification of a connection source.
    pub(crate) fn source_spec(&self, loc: PortLoc) -> &PortSpec {
        match loc {
            PortLoc::Actor(id, index) => &self.slots[id.0].outputs[index].spec,
            PortLoc::Boundary(index) => &self.boundary_inputs[index],
        }
    }

    /// Returns the specification of a connection sink.
    pub(crate) fn sink_spec(&self, loc: PortLoc) -> &PortSpec {
        match loc {
            PortLoc::Actor(id, index) => &self.slots[id.0].inputs[index].spec,
            PortLoc::Boundary(index) => &self.boundary_outputs[index],
        }
    }

    pub(crate) fn qualified(&self, loc: PortLoc, spec: &PortSpec) -> String {
        format!("{}.{}", self.owner_name(loc), spec.name())
    }

    /// Resolves a port used as the source of a connection.
    pub(crate) fn resolve_source(&self, port: &PortRef) -> Result<PortLoc, ConfigurationError> {
        self.resolve(port, PortDirection::Output)
    }

    /// Resolves a port used as the sink of a connection.
    pub(crate) fn resolve_sink(&self, port: &PortRef) -> Result<PortLoc, ConfigurationError> {
        self.resolve(port, PortDirection::Input)
    }

    /// Resolves a port seen from inside the composite.
    ///
    /// Boundary inputs behave as outputs from the inside, and boundary
    /// outputs as inputs.
    fn resolve(
        &self,
        port: &PortRef,
        inside: PortDirection,
    ) -> Result<PortLoc, ConfigurationError> {
        let name = port.name();
        let (found, other, owner) = match port.endpoint() {
            Endpoint::Actor(id) => {
                let slot = self.slot(id).ok_or_else(|| ConfigurationError::UnknownActor {
                    container: self.name.clone(),
                })?;
                let (found, other) = match inside {
                    PortDirection::Output => (slot.output_index(name), slot.input_index(name)),
                    PortDirection::Input => (slot.input_index(name), slot.output_index(name)),
                };

                (found.map(|i| PortLoc::Actor(id, i)), other.is_some(), &slot.name)
            }
            Endpoint::Boundary => {
                let position = |specs: &[PortSpec]| specs.iter().position(|s| s.name() == name);
                let (found, other) = match inside {
                    PortDirection::Output => (
                        position(&self.boundary_inputs),
                        position(&self.boundary_outputs),
                    ),
                    PortDirection::Input => (
                        position(&self.boundary_outputs),
                        position(&self.boundary_inputs),
                    ),
                };

                (found.map(PortLoc::Boundary), other.is_some(), &self.name)
            }
        };

        match found {
            Some(loc) => Ok(loc),
            None if other => {
                let expected = match (port.endpoint(), inside) {
                    (Endpoint::Actor(_), d) => d,
                    (Endpoint::Boundary, PortDirection::Output) => PortDirection::Input,
                    (Endpoint::Boundary, PortDirection::Input) => PortDirection::Output,
                };

                Err(ConfigurationError::DirectionMismatch {
                    port: format!("{owner}.{name}"),
                    expected,
                })
            }
            None => Err(ConfigurationError::UnknownPort {
                actor: owner.clone(),
                port: name.to_owned(),
            }),
        }
    }

    /// Resolves and checks a connection, ignoring the connection `skip` when
    /// counting the sources of the sink.
    pub(crate) fn check_connection(
        &self,
        source: &PortRef,
        sink: &PortRef,
        skip: Option<ConnectionId>,
    ) -> Result<(PortLoc, PortLoc), ConfigurationError> {
        let source_loc = self.resolve_source(source)?;
        let sink_loc = self.resolve_sink(sink)?;
        let source_spec = self.source_spec(source_loc);
        let sink_spec = self.sink_spec(sink_loc);

        if !source_spec.ty().is_assignable_to(sink_spec.ty()) {
            return Err(ConfigurationError::TypeMismatch {
                source: self.qualified(source_loc, source_spec),
                source_type: source_spec.ty(),
                sink: self.qualified(sink_loc, sink_spec),
                sink_type: sink_spec.ty(),
            });
        }

        if !sink_spec.is_multiport() {
            let taken = self
                .connections
                .iter()
                .filter(|c| Some(c.id) != skip)
                .any(|c| c.sink == *sink);
            if taken {
                return Err(ConfigurationError::MultipleSources {
                    port: self.qualified(sink_loc, sink_spec),
                });
            }
        }

        Ok((source_loc, sink_loc))
    }

    /// Resolves all connections, in connection order.
    pub(crate) fn edges(&self) -> Result<Vec<Edge>, ConfigurationError> {
        self.connections
            .iter()
            .map(|c| {
                Ok(Edge {
                    id: c.id,
                    source: self.resolve_source(&c.source)?,
                    sink: self.resolve_sink(&c.sink)?,
                })
            })
            .collect()
    }

    /// Re-checks every structural invariant.
    pub(crate) fn validate(&self) -> Result<(), ConfigurationError> {
        for c in &self.connections {
            self.check_connection(&c.source, &c.sink, Some(c.id))?;
        }

        Ok(())
    }

    /// Binds a fresh receiver to every connection.
    ///
    /// Single ports use channel 0 for all their connections, whereas each
    /// connection of a multiport gets its own channel, in connection order.
    pub(crate) fn create_receivers(
        &mut self,
        mut factory: impl FnMut(&Link<'_>) -> Arc<dyn Receiver>,
    ) -> Result<(), ConfigurationError> {
        let edges = self.edges()?;

        for (_, slot) in self.slots.iter_mut() {
            for input in &mut slot.inputs {
                input.channels.clear();
            }
            for output in &mut slot.outputs {
                output.channels.clear();
            }
        }
        self.inside_outputs = vec![Vec::new(); self.boundary_inputs.len()];
        self.inside_inputs = vec![Vec::new(); self.boundary_outputs.len()];

        for edge in edges {
            let sink_channel = match edge.sink {
                PortLoc::Actor(id, index) => self.slots[id.0].inputs[index].channels.len(),
                PortLoc::Boundary(index) => self.inside_inputs[index].len(),
            };
            let sink_spec = self.sink_spec(edge.sink);
            let link = Link {
                edge,
                producer_name: self.owner_name(edge.source),
                consumer_name: self.owner_name(edge.sink),
                address: PortAddress::new(
                    self.owner_name(edge.sink),
                    sink_spec.name(),
                    sink_channel,
                ),
            };
            let receiver = factory(&link);

            match edge.sink {
                PortLoc::Actor(id, index) => {
                    self.slots[id.0].inputs[index].channels.push(receiver.clone())
                }
                PortLoc::Boundary(index) => self.inside_inputs[index].push(receiver.clone()),
            }

            let (multiport, channels) = match edge.source {
                PortLoc::Actor(id, index) => {
                    let output = &mut self.slots[id.0].outputs[index];
                    (output.spec.is_multiport(), &mut output.channels)
                }
                PortLoc::Boundary(index) => (
                    self.boundary_inputs[index].is_multiport(),
                    &mut self.inside_outputs[index],
                ),
            };
            if multiport || channels.is_empty() {
                channels.push(Vec::new());
            }
            if let Some(last) = channels.last_mut() {
                last.push(receiver);
            }
        }

        Ok(())
    }

    /// Discards all tokens held by inner receivers.
    pub(crate) fn clear_receivers(&self) {
        for (_, slot) in self.slots.iter() {
            slot.clear_inputs();
        }
        for receiver in self.inside_inputs.iter().flatten() {
            receiver.clear();
        }
    }

    /// Returns mutable references to all slots, in declaration order.
    pub(crate) fn slots_in_order(&mut self) -> Vec<&mut ActorSlot> {
        let mut by_key: HashMap<usize, &mut ActorSlot> = self.slots.iter_mut().collect();

        self.order
            .iter()
            .filter_map(|id| by_key.remove(&id.0))
            .collect()
    }

    /// Preinitializes all actors in declaration order.
    pub(crate) fn preinitialize_all(&mut self, frame: &mut Frame) -> Result<(), ActionError> {
        for slot in self.slots_in_order() {
            slot.preinitialize(frame)?;
        }

        Ok(())
    }

    /// Calls wrapup on every actor that was preinitialized, even if some of
    /// them fail, and returns the first error.
    pub(crate) fn wrapup_all(&mut self, frame: &mut Frame) -> Result<(), ActionError> {
        let mut result = Ok(());
        for slot in self.slots_in_order() {
            let outcome = slot.wrapup(frame);
            if result.is_ok() {
                result = outcome;
            }
        }

        result
    }
}
