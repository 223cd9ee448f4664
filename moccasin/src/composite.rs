//! Hierarchical composition.
//!
//! A [`CompositeActor`] owns a graph of contained actors, its boundary ports
//! and the [`Director`] that executes the graph. Since it implements
//! [`Actor`], a composite can itself be contained in another composite,
//! possibly governed by a different director.
//!
//! # Examples
//!
//! A rate-mismatched producer/consumer pair under a dataflow director:
//!
//! ```
//! use moccasin::composite::CompositeActor;
//! use moccasin::director::SdfDirector;
//! use moccasin::library::{Ramp, Recorder};
//!
//! let mut top = CompositeActor::new("top", SdfDirector::new());
//! let ramp = top.add_actor("ramp", Ramp::new(0).with_rate(2)).unwrap();
//! let recorder = Recorder::new().with_rate(3);
//! let sink = top.add_actor("sink", recorder).unwrap();
//! top.connect(ramp.port("out"), sink.port("in")).unwrap();
//!
//! let schedule = top.schedule().unwrap();
//! assert_eq!(schedule.repetitions(ramp), 3);
//! assert_eq!(schedule.repetitions(sink), 2);
//! ```

mod graph;

use std::fmt;

use crate::actor::{Actor, ActorSlot, ActorState, Context, Frame, PortDirection, PortSpec};
use crate::director::{Continuation, Director};
use crate::error::{ActionError, ConfigurationError, ExecutionError};
use crate::receiver::Receiver;
use crate::sched::Schedule;
use crate::time::{MonotonicTime, SuperdenseTime};

pub(crate) use graph::{Edge, Graph, PortLoc};

/// Identifier of an actor within its composite.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorId(pub(crate) usize);

impl ActorId {
    /// Returns a reference to a port of this actor.
    pub fn port(self, name: impl Into<String>) -> PortRef {
        PortRef {
            endpoint: Endpoint::Actor(self),
            name: name.into(),
        }
    }
}

/// Owner of a referenced port.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// A contained actor.
    Actor(ActorId),
    /// The composite itself.
    Boundary,
}

/// A reference to a port by name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PortRef {
    endpoint: Endpoint,
    name: String,
}

impl PortRef {
    /// Returns the owner of the port.
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Returns the port name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Identifier of a connection within its composite.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub(crate) usize);

/// A binding from a source port to a sink port.
///
/// Seen from inside a composite, sources are outputs of contained actors or
/// boundary inputs, and sinks are inputs of contained actors or boundary
/// outputs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Connection {
    pub(crate) id: ConnectionId,
    pub(crate) source: PortRef,
    pub(crate) sink: PortRef,
}

impl Connection {
    /// Returns the connection identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the source port.
    pub fn source(&self) -> &PortRef {
        &self.source
    }

    /// Returns the sink port.
    pub fn sink(&self) -> &PortRef {
        &self.sink
    }
}

/// An actor containing a graph of actors executed by a director.
pub struct CompositeActor {
    director: Director,
    graph: Graph,
    frame: Option<Frame>,
}

impl CompositeActor {
    /// Creates an empty composite governed by the specified director.
    pub fn new(name: impl Into<String>, director: impl Into<Director>) -> Self {
        Self {
            director: director.into(),
            graph: Graph::new(name.into()),
            frame: None,
        }
    }

    /// Returns a reference to a boundary port of a composite, for use in
    /// [`connect()`](Self::connect).
    pub fn boundary(name: impl Into<String>) -> PortRef {
        PortRef {
            endpoint: Endpoint::Boundary,
            name: name.into(),
        }
    }

    /// Returns the name of the composite.
    pub fn name(&self) -> &str {
        &self.graph.name
    }

    /// Returns the director.
    pub fn director(&self) -> &Director {
        &self.director
    }

    /// Returns the version of the graph.
    ///
    /// The version is incremented by every structural change, which
    /// invalidates cached schedules.
    pub fn version(&self) -> u64 {
        self.graph.version
    }

    /// Adds an actor and returns its identifier.
    ///
    /// The ports of the actor are read once, from [`Actor::ports()`].
    pub fn add_actor(
        &mut self,
        name: impl Into<String>,
        actor: impl Actor + 'static,
    ) -> Result<ActorId, ConfigurationError> {
        self.add_boxed_actor(name, Box::new(actor))
    }

    /// Adds a boxed actor and returns its identifier.
    pub fn add_boxed_actor(
        &mut self,
        name: impl Into<String>,
        actor: Box<dyn Actor>,
    ) -> Result<ActorId, ConfigurationError> {
        let name = name.into();
        if self.graph.slots.iter().any(|(_, s)| s.name == name) {
            return Err(ConfigurationError::NameCollision {
                container: self.graph.name.clone(),
                name,
            });
        }

        let slot = ActorSlot::new(name, actor);
        let mut seen: Vec<&str> = Vec::new();
        let names = slot.inputs.iter().map(|p| &p.spec).chain(slot.outputs.iter().map(|p| &p.spec));
        for spec in names {
            if seen.contains(&spec.name()) {
                return Err(ConfigurationError::NameCollision {
                    container: slot.name.clone(),
                    name: spec.name().to_owned(),
                });
            }
            seen.push(spec.name());
        }

        let id = ActorId(self.graph.slots.insert(slot));
        self.graph.order.push(id);
        self.graph.touch();

        Ok(id)
    }

    /// Removes an actor together with its connections.
    pub fn remove_actor(&mut self, id: ActorId) -> Result<Box<dyn Actor>, ConfigurationError> {
        let slot = self
            .graph
            .slots
            .try_remove(id.0)
            .ok_or_else(|| ConfigurationError::UnknownActor {
                container: self.graph.name.clone(),
            })?;
        self.graph.order.retain(|&a| a != id);
        self.graph.connections.retain(|c| {
            c.source.endpoint != Endpoint::Actor(id) && c.sink.endpoint != Endpoint::Actor(id)
        });
        self.graph.touch();

        Ok(slot.actor)
    }

    /// Declares a boundary port.
    ///
    /// Boundary ports must be declared before the composite is added to its
    /// container.
    pub fn add_port(&mut self, spec: PortSpec) -> Result<(), ConfigurationError> {
        let exists = self
            .graph
            .boundary_inputs
            .iter()
            .chain(&self.graph.boundary_outputs)
            .any(|s| s.name() == spec.name());
        if exists {
            return Err(ConfigurationError::NameCollision {
                container: self.graph.name.clone(),
                name: spec.name().to_owned(),
            });
        }
        match spec.direction() {
            PortDirection::Input => self.graph.boundary_inputs.push(spec),
            PortDirection::Output => self.graph.boundary_outputs.push(spec),
        }
        self.graph.touch();

        Ok(())
    }

    /// Connects a source port to a sink port.
    ///
    /// The type of the source must be assignable to the type of the sink, and
    /// a sink that is not a multiport accepts a single connection.
    pub fn connect(
        &mut self,
        source: PortRef,
        sink: PortRef,
    ) -> Result<ConnectionId, ConfigurationError> {
        self.graph.check_connection(&source, &sink, None)?;

        let id = self.graph.next_connection_id();
        self.graph.connections.push(Connection { id, source, sink });
        self.graph.touch();

        Ok(id)
    }

    /// Removes a connection and returns it, if it exists.
    pub fn disconnect(&mut self, id: ConnectionId) -> Option<Connection> {
        let position = self.graph.connections.iter().position(|c| c.id == id)?;
        self.graph.touch();

        Some(self.graph.connections.remove(position))
    }

    /// Changes the rate of a port of a contained actor or of a boundary port.
    pub fn set_rate(&mut self, port: &PortRef, rate: usize) -> Result<(), ConfigurationError> {
        let name = port.name();
        let spec = match port.endpoint() {
            Endpoint::Actor(id) => {
                let slot = self.graph.slots.get_mut(id.0).ok_or_else(|| {
                    ConfigurationError::UnknownActor {
                        container: self.graph.name.clone(),
                    }
                })?;
                let actor = slot.name.clone();
                slot.inputs
                    .iter_mut()
                    .map(|p| &mut p.spec)
                    .chain(slot.outputs.iter_mut().map(|p| &mut p.spec))
                    .find(|s| s.name() == name)
                    .ok_or(ConfigurationError::UnknownPort {
                        actor,
                        port: name.to_owned(),
                    })?
            }
            Endpoint::Boundary => self
                .graph
                .boundary_inputs
                .iter_mut()
                .chain(self.graph.boundary_outputs.iter_mut())
                .find(|s| s.name() == name)
                .ok_or_else(|| ConfigurationError::UnknownPort {
                    actor: self.graph.name.clone(),
                    port: name.to_owned(),
                })?,
        };
        spec.set_rate(rate);
        self.graph.touch();

        Ok(())
    }

    /// Returns the identifier of the actor with the specified name.
    pub fn actor_id(&self, name: &str) -> Option<ActorId> {
        self.graph
            .order
            .iter()
            .copied()
            .find(|&id| self.graph.slot(id).is_some_and(|s| s.name == name))
    }

    /// Returns the name of a contained actor.
    pub fn actor_name(&self, id: ActorId) -> Option<&str> {
        self.graph.slot(id).map(|s| s.name.as_str())
    }

    /// Returns the lifecycle state of a contained actor.
    pub fn actor_state(&self, id: ActorId) -> Option<ActorState> {
        self.graph.slot(id).map(|s| s.state)
    }

    /// Returns a contained actor.
    pub fn actor(&self, id: ActorId) -> Option<&dyn Actor> {
        self.graph.slot(id).map(|s| &*s.actor)
    }

    /// Returns a mutable reference to a contained actor.
    pub fn actor_mut(&mut self, id: ActorId) -> Option<&mut (dyn Actor + 'static)> {
        self.graph.slot_mut(id).map(|s| &mut *s.actor)
    }

    /// Returns the contained actors in the order they were added.
    pub fn actors(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.graph.order.iter().copied()
    }

    /// Returns the connections in the order they were made.
    pub fn connections(&self) -> &[Connection] {
        &self.graph.connections
    }

    /// Returns the specification of a port of a contained actor or of a
    /// boundary port.
    pub fn port_spec(&self, port: &PortRef) -> Option<&PortSpec> {
        let name = port.name();
        match port.endpoint() {
            Endpoint::Actor(id) => {
                let slot = self.graph.slot(id)?;
                slot.inputs
                    .iter()
                    .map(|p| &p.spec)
                    .chain(slot.outputs.iter().map(|p| &p.spec))
                    .find(|s| s.name() == name)
            }
            Endpoint::Boundary => self
                .graph
                .boundary_inputs
                .iter()
                .chain(&self.graph.boundary_outputs)
                .find(|s| s.name() == name),
        }
    }

    /// Computes the static dataflow schedule of the contained graph.
    ///
    /// This is a read-only operation which can be used regardless of the
    /// director, for instance to emit an equivalent static firing order.
    pub fn schedule(&self) -> Result<Schedule, ExecutionError> {
        let edges = self.graph.edges()?;

        Ok(Schedule::compute(&self.graph, &edges)?)
    }

    /// Checks the structural invariants of the graph and of all nested
    /// graphs, and computes whatever the directors derive from the topology
    /// (schedules, causal orders).
    ///
    /// This is called by the manager before preinitialization.
    pub fn validate(&mut self) -> Result<(), ExecutionError> {
        self.graph.validate()?;
        for (_, slot) in self.graph.slots.iter_mut() {
            if let Some(composite) = slot.actor.as_composite_mut() {
                composite.validate()?;
            }
        }

        self.director.validate(&self.graph)
    }

    /// Returns the current tag of the director, once preinitialized.
    pub fn tag(&self) -> Option<SuperdenseTime> {
        self.frame.as_ref().map(|f| f.tag)
    }

    /// Returns the time at which the next iteration takes place.
    pub(crate) fn next_iteration_time(&self) -> Option<MonotonicTime> {
        let frame = self.frame.as_ref()?;

        Some(self.director.next_iteration_time(frame))
    }

    /// Runs postfire and returns the continuation decided by the director.
    pub(crate) fn postfire_continuation(
        &mut self,
        ctx: &mut Context<'_>,
    ) -> Result<Continuation, ActionError> {
        let Self {
            director,
            graph,
            frame,
        } = self;
        let frame = preinitialized(frame, ctx)?;

        director.postfire(graph, frame, ctx)
    }

    /// Moves tokens from the outer receivers of the boundary inputs to the
    /// inner receivers.
    fn transfer_inputs(&self, ctx: &Context<'_>) -> Result<(), ActionError> {
        let exact = self.director.transfers_exact_rate();
        for (index, input) in ctx.inputs.iter().enumerate() {
            let inside = self.graph.inside_outputs.get(index);
            for (channel, outer) in input.channels.iter().enumerate() {
                let count = if exact { input.spec.rate() } else { outer.len() };
                let targets = inside.and_then(|c| c.get(channel)).map_or(&[][..], |r| &r[..]);
                for _ in 0..count {
                    let token = outer
                        .get()
                        .map_err(|e| transfer_error(ctx, input.spec.name(), e))?;
                    for target in targets {
                        target
                            .put(token.clone())
                            .map_err(|e| transfer_error(ctx, input.spec.name(), e))?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Moves all tokens from the inner receivers of the boundary outputs to
    /// the outer receivers.
    fn transfer_outputs(&self, ctx: &Context<'_>) -> Result<(), ActionError> {
        for (index, output) in ctx.outputs.iter().enumerate() {
            let Some(inside) = self.graph.inside_inputs.get(index) else {
                continue;
            };
            for (channel, inner) in inside.iter().enumerate() {
                let targets = output.channels.get(channel).map_or(&[][..], |r| &r[..]);
                while inner.has_token() {
                    let token = inner
                        .get()
                        .map_err(|e| transfer_error(ctx, output.spec.name(), e))?;
                    for target in targets {
                        target
                            .put(token.clone())
                            .map_err(|e| transfer_error(ctx, output.spec.name(), e))?;
                    }
                }
            }
        }

        Ok(())
    }
}

fn transfer_error(
    ctx: &Context<'_>,
    port: &str,
    error: crate::receiver::ReceiverError,
) -> ActionError {
    ActionError::Receiver {
        actor: ctx.name().to_owned(),
        port: port.to_owned(),
        error,
    }
}

fn preinitialized<'a>(
    frame: &'a mut Option<Frame>,
    ctx: &Context<'_>,
) -> Result<&'a mut Frame, ActionError> {
    frame
        .as_mut()
        .ok_or_else(|| ctx.error("the composite was not preinitialized"))
}

impl Actor for CompositeActor {
    fn ports(&self) -> Vec<PortSpec> {
        self.graph
            .boundary_inputs
            .iter()
            .chain(&self.graph.boundary_outputs)
            .cloned()
            .collect()
    }

    fn preinitialize(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError> {
        let frame = self.frame.insert(ctx.frame.nested(ctx.tag()));

        self.director.preinitialize(&mut self.graph, frame, ctx)
    }

    fn initialize(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError> {
        let Self {
            director,
            graph,
            frame,
        } = self;
        let frame = preinitialized(frame, ctx)?;

        director.initialize(graph, frame, ctx)
    }

    fn prefire(&mut self, ctx: &mut Context<'_>) -> Result<bool, ActionError> {
        let Self {
            director,
            graph,
            frame,
        } = self;
        let frame = preinitialized(frame, ctx)?;

        director.prefire(graph, frame, ctx)
    }

    fn fire(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError> {
        self.transfer_inputs(ctx)?;
        {
            let Self {
                director,
                graph,
                frame,
            } = self;
            let frame = preinitialized(frame, ctx)?;
            director.fire(graph, frame, ctx)?;
        }

        self.transfer_outputs(ctx)
    }

    fn postfire(&mut self, ctx: &mut Context<'_>) -> Result<bool, ActionError> {
        Ok(self.postfire_continuation(ctx)? != Continuation::Terminate)
    }

    fn wrapup(&mut self, _ctx: &mut Context<'_>) -> Result<(), ActionError> {
        let Some(frame) = self.frame.as_mut() else {
            return Ok(());
        };

        self.director.wrapup(&mut self.graph, frame)
    }

    fn as_composite(&self) -> Option<&CompositeActor> {
        Some(self)
    }

    fn as_composite_mut(&mut self) -> Option<&mut CompositeActor> {
        Some(self)
    }
}

impl fmt::Debug for CompositeActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeActor")
            .field("name", &self.graph.name)
            .field("director", &self.director.name())
            .field("actors", &self.graph.order.len())
            .field("connections", &self.graph.connections.len())
            .field("version", &self.graph.version)
            .finish_non_exhaustive()
    }
}
