use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::actor::port::{InputPort, OutputPort};
use crate::error::ActionError;
use crate::manager::RunControl;
use crate::receiver::ReceiverError;
use crate::time::{MonotonicTime, SuperdenseTime};
use crate::token::Token;

/// Execution state shared by all actors fired by one director.
#[derive(Debug)]
pub(crate) struct Frame {
    /// Current tag of the director.
    pub(crate) tag: SuperdenseTime,
    /// Time at which the run ends, if any.
    pub(crate) stop_time: Option<MonotonicTime>,
    /// Integration step of a continuous director.
    pub(crate) step_size: Option<Duration>,
    /// Firing requests collected from the last fired actor.
    pub(crate) refires: Vec<MonotonicTime>,
    /// Run-wide control flags.
    pub(crate) control: Arc<RunControl>,
    /// Nesting level of the director, 0 for the manager itself.
    pub(crate) depth: usize,
}

impl Frame {
    pub(crate) fn new(
        tag: SuperdenseTime,
        stop_time: Option<MonotonicTime>,
        control: Arc<RunControl>,
    ) -> Self {
        Self {
            tag,
            stop_time,
            step_size: None,
            refires: Vec::new(),
            control,
            depth: 0,
        }
    }

    /// Creates the frame of a director nested in the director owning `self`.
    pub(crate) fn nested(&self, tag: SuperdenseTime) -> Self {
        Self {
            depth: self.depth + 1,
            ..Self::new(tag, self.stop_time, self.control.clone())
        }
    }

    /// Creates a frame at the same nesting level, for an actor running on
    /// its own thread.
    pub(crate) fn fork(&self) -> Self {
        Self {
            step_size: self.step_size,
            depth: self.depth,
            ..Self::new(self.tag, self.stop_time, self.control.clone())
        }
    }
}

/// The view an actor has of its ports and of its director during a
/// lifecycle call.
///
/// Ports are addressed by the name given in their
/// [`PortSpec`](crate::actor::PortSpec). Operations on a port that does not
/// exist fail with [`ActionError::Failed`].
pub struct Context<'a> {
    name: &'a str,
    pub(crate) inputs: &'a [InputPort],
    pub(crate) outputs: &'a [OutputPort],
    pub(crate) frame: &'a mut Frame,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        name: &'a str,
        inputs: &'a [InputPort],
        outputs: &'a [OutputPort],
        frame: &'a mut Frame,
    ) -> Self {
        Self {
            name,
            inputs,
            outputs,
            frame,
        }
    }

    /// Returns the name of the actor.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Returns the current timestamp.
    pub fn time(&self) -> MonotonicTime {
        self.frame.tag.timestamp()
    }

    /// Returns the current tag, including the microstep.
    pub fn tag(&self) -> SuperdenseTime {
        self.frame.tag
    }

    /// Returns the time at which the run ends, if any.
    pub fn stop_time(&self) -> Option<MonotonicTime> {
        self.frame.stop_time
    }

    /// Returns the integration step when fired by a continuous director.
    pub fn step_size(&self) -> Option<Duration> {
        self.frame.step_size
    }

    /// Returns the number of channels of an input port.
    ///
    /// Unknown ports have no channel.
    pub fn width(&self, port: &str) -> usize {
        self.find_input(port).map_or(0, |p| p.channels.len())
    }

    /// Returns the number of channels of an output port.
    ///
    /// Unknown ports have no channel.
    pub fn output_width(&self, port: &str) -> usize {
        self.find_output(port).map_or(0, |p| p.channels.len())
    }

    /// Returns the declared rate of a port.
    pub fn rate(&self, port: &str) -> Option<usize> {
        self.find_input(port)
            .map(|p| p.spec.rate())
            .or_else(|| self.find_output(port).map(|p| p.spec.rate()))
    }

    /// Checks whether a token is available on channel 0 of an input port.
    pub fn has_token(&self, port: &str) -> bool {
        self.has_tokens(port, 0, 1)
    }

    /// Checks whether at least `n` tokens are available on a channel of an
    /// input port.
    pub fn has_tokens(&self, port: &str, channel: usize, n: usize) -> bool {
        self.find_input(port)
            .and_then(|p| p.channels.get(channel))
            .is_some_and(|r| r.has_tokens(n))
    }

    /// Takes a token from channel 0 of an input port.
    pub fn get(&mut self, port: &str) -> Result<Token, ActionError> {
        self.get_from(port, 0)
    }

    /// Takes a token from a channel of an input port.
    pub fn get_from(&mut self, port: &str, channel: usize) -> Result<Token, ActionError> {
        let receiver = self
            .input(port)?
            .channels
            .get(channel)
            .ok_or_else(|| self.receiver_error(port, ReceiverError::NoToken))?;

        receiver.get().map_err(|e| self.receiver_error(port, e))
    }

    /// Takes `n` tokens from a channel of an input port.
    pub fn get_n(
        &mut self,
        port: &str,
        channel: usize,
        n: usize,
    ) -> Result<Vec<Token>, ActionError> {
        (0..n).map(|_| self.get_from(port, channel)).collect()
    }

    /// Sends a token on channel 0 of an output port.
    ///
    /// The channel 0 of a single output port reaches every connected
    /// receiver.
    pub fn send(&mut self, port: &str, token: impl Into<Token>) -> Result<(), ActionError> {
        self.send_to(port, 0, token)
    }

    /// Sends a token on a channel of an output port.
    ///
    /// Sending on an unconnected channel is a no-op.
    pub fn send_to(
        &mut self,
        port: &str,
        channel: usize,
        token: impl Into<Token>,
    ) -> Result<(), ActionError> {
        let token = token.into();
        let output = self.typed_output(port, &token)?;
        if let Some(receivers) = output.channels.get(channel) {
            for receiver in receivers {
                receiver
                    .put(token.clone())
                    .map_err(|e| self.receiver_error(port, e))?;
            }
        }

        Ok(())
    }

    /// Sends a token on every channel of an output port.
    pub fn broadcast(&mut self, port: &str, token: impl Into<Token>) -> Result<(), ActionError> {
        let token = token.into();
        let output = self.typed_output(port, &token)?;
        for receiver in output.channels.iter().flatten() {
            receiver
                .put(token.clone())
                .map_err(|e| self.receiver_error(port, e))?;
        }

        Ok(())
    }

    /// Requests a firing of this actor at the specified time.
    ///
    /// Requests strictly in the past fail with [`ActionError::InvalidTime`].
    /// A request at the current timestamp is honored at a later microstep.
    pub fn fire_at(&mut self, time: MonotonicTime) -> Result<(), ActionError> {
        if time < self.time() {
            return Err(ActionError::InvalidTime {
                actor: self.name.to_owned(),
                requested: time,
                current: self.frame.tag,
            });
        }
        self.frame.refires.push(time);

        Ok(())
    }

    /// Requests a firing of this actor after the specified delay.
    pub fn fire_after(&mut self, delay: Duration) -> Result<(), ActionError> {
        self.fire_at(self.time() + delay)
    }

    /// Requests the run to stop after the current iteration.
    pub fn request_stop(&self) {
        self.frame.control.stop();
    }

    /// Checks whether a stop was requested.
    pub fn is_stop_requested(&self) -> bool {
        self.frame.control.is_stop_requested()
    }

    /// Creates an [`ActionError::Failed`] error attributed to this actor.
    pub fn error(&self, message: impl Into<String>) -> ActionError {
        ActionError::Failed {
            actor: self.name.to_owned(),
            message: message.into(),
        }
    }

    /// Checks whether this context is the one of the manager, i.e. whether
    /// the actor is the top-level composite.
    pub(crate) fn is_top_level(&self) -> bool {
        self.frame.depth == 0
    }

    fn find_input(&self, port: &str) -> Option<&'a InputPort> {
        self.inputs.iter().find(|p| p.spec.name() == port)
    }

    fn find_output(&self, port: &str) -> Option<&'a OutputPort> {
        self.outputs.iter().find(|p| p.spec.name() == port)
    }

    fn input(&self, port: &str) -> Result<&'a InputPort, ActionError> {
        self.find_input(port)
            .ok_or_else(|| self.error(format!("no input port named '{port}'")))
    }

    fn typed_output(&self, port: &str, token: &Token) -> Result<&'a OutputPort, ActionError> {
        let output = self
            .find_output(port)
            .ok_or_else(|| self.error(format!("no output port named '{port}'")))?;
        if !output.spec.ty().admits(token) {
            return Err(ActionError::TypeMismatch {
                actor: self.name.to_owned(),
                port: port.to_owned(),
                expected: output.spec.ty(),
                found: token.ty(),
            });
        }

        Ok(output)
    }

    fn receiver_error(&self, port: &str, error: ReceiverError) -> ActionError {
        ActionError::Receiver {
            actor: self.name.to_owned(),
            port: port.to_owned(),
            error,
        }
    }
}

impl fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.name)
            .field("tag", &self.frame.tag)
            .finish_non_exhaustive()
    }
}
