use std::fmt;

use tracing::trace_span;

use crate::actor::context::{Context, Frame};
use crate::actor::port::{InputPort, OutputPort};
use crate::actor::{Actor, ActorState, PortDirection};
use crate::error::ActionError;
use crate::logging::ModelTimeGuard;

/// An actor together with its runtime ports and lifecycle state.
pub(crate) struct ActorSlot {
    pub(crate) name: String,
    pub(crate) actor: Box<dyn Actor>,
    pub(crate) inputs: Vec<InputPort>,
    pub(crate) outputs: Vec<OutputPort>,
    pub(crate) state: ActorState,
}

impl ActorSlot {
    /// Wraps an actor and instantiates the ports it declares.
    pub(crate) fn new(name: String, actor: Box<dyn Actor>) -> Self {
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        for spec in actor.ports() {
            match spec.direction() {
                PortDirection::Input => inputs.push(InputPort::new(spec)),
                PortDirection::Output => outputs.push(OutputPort::new(spec)),
            }
        }

        Self {
            name,
            actor,
            inputs,
            outputs,
            state: ActorState::Constructed,
        }
    }

    /// Calls the actor within its tracing span.
    fn call<R>(
        &mut self,
        frame: &mut Frame,
        phase: &'static str,
        f: impl FnOnce(&mut dyn Actor, &mut Context<'_>) -> Result<R, ActionError>,
    ) -> Result<R, ActionError> {
        let span = trace_span!(target: "moccasin", "actor", name = %self.name, phase);
        let _enter = span.enter();
        let _time = ModelTimeGuard::enter(frame.tag);

        let mut ctx = Context::new(&self.name, &self.inputs, &self.outputs, frame);

        f(&mut *self.actor, &mut ctx)
    }

    pub(crate) fn preinitialize(&mut self, frame: &mut Frame) -> Result<(), ActionError> {
        self.state = ActorState::Preinitialized;
        self.call(frame, "preinitialize", |a, ctx| a.preinitialize(ctx))
    }

    pub(crate) fn initialize(&mut self, frame: &mut Frame) -> Result<(), ActionError> {
        self.call(frame, "initialize", |a, ctx| a.initialize(ctx))?;
        self.state = ActorState::Initialized;

        Ok(())
    }

    pub(crate) fn prefire(&mut self, frame: &mut Frame) -> Result<bool, ActionError> {
        let ready = self.call(frame, "prefire", |a, ctx| a.prefire(ctx))?;
        self.state = ActorState::Prefired;

        Ok(ready)
    }

    pub(crate) fn fire(&mut self, frame: &mut Frame) -> Result<(), ActionError> {
        self.call(frame, "fire", |a, ctx| a.fire(ctx))?;
        self.state = ActorState::Fired;

        Ok(())
    }

    pub(crate) fn postfire(&mut self, frame: &mut Frame) -> Result<bool, ActionError> {
        let resume = self.call(frame, "postfire", |a, ctx| a.postfire(ctx))?;
        self.state = ActorState::Postfired;

        Ok(resume)
    }

    /// Runs prefire, fire and postfire in sequence.
    ///
    /// Returns `None` if the actor declined to fire, and otherwise the value
    /// returned by postfire.
    pub(crate) fn iterate(&mut self, frame: &mut Frame) -> Result<Option<bool>, ActionError> {
        if !self.prefire(frame)? {
            return Ok(None);
        }
        self.fire(frame)?;

        self.postfire(frame).map(Some)
    }

    /// Calls wrapup if the actor was preinitialized and not yet wrapped up.
    pub(crate) fn wrapup(&mut self, frame: &mut Frame) -> Result<(), ActionError> {
        if matches!(self.state, ActorState::Constructed | ActorState::WrappedUp) {
            return Ok(());
        }
        self.state = ActorState::WrappedUp;

        self.call(frame, "wrapup", |a, ctx| a.wrapup(ctx))
    }

    /// Sends the initial tokens declared by the output ports.
    pub(crate) fn emit_initial_tokens(&self) -> Result<(), ActionError> {
        for output in &self.outputs {
            let spec = &output.spec;
            for token in spec.initial_tokens() {
                if !spec.ty().admits(token) {
                    return Err(ActionError::TypeMismatch {
                        actor: self.name.clone(),
                        port: spec.name().to_owned(),
                        expected: spec.ty(),
                        found: token.ty(),
                    });
                }
                for receiver in output.channels.iter().flatten() {
                    receiver
                        .put(token.clone())
                        .map_err(|error| ActionError::Receiver {
                            actor: self.name.clone(),
                            port: spec.name().to_owned(),
                            error,
                        })?;
                }
            }
        }

        Ok(())
    }

    /// Discards the tokens held by the receivers of the input ports.
    pub(crate) fn clear_inputs(&self) {
        for receiver in self.inputs.iter().flat_map(|p| &p.channels) {
            receiver.clear();
        }
    }

    pub(crate) fn input_index(&self, port: &str) -> Option<usize> {
        self.inputs.iter().position(|p| p.spec.name() == port)
    }

    pub(crate) fn output_index(&self, port: &str) -> Option<usize> {
        self.outputs.iter().position(|p| p.spec.name() == port)
    }
}

impl fmt::Debug for ActorSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorSlot")
            .field("name", &self.name)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
