//! Error taxonomy.
//!
//! Errors are split by the phase in which they are detected:
//!
//! * [`ConfigurationError`]: a malformed graph, reported while the graph is
//!   built or validated, before any actor is preinitialized,
//! * [`SchedulingError`]: a graph whose rates or causal structure cannot be
//!   scheduled, also reported before preinitialization,
//! * [`ActionError`]: a failure raised while the model executes.
//!
//! [`ExecutionError`] is the union returned by [`run()`](crate::manager::run)
//! and [`Manager::run()`](crate::manager::Manager::run).

use std::error::Error;
use std::fmt;

use crate::actor::PortDirection;
use crate::receiver::ReceiverError;
use crate::time::{MonotonicTime, SuperdenseTime};
use crate::token::TokenType;

/// An error detected while building or validating a graph.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// Two actors or two ports of the same container share a name.
    NameCollision {
        /// Name of the container.
        container: String,
        /// Duplicated name.
        name: String,
    },
    /// An actor identifier does not belong to the container.
    UnknownActor {
        /// Name of the container.
        container: String,
    },
    /// An actor has no port with the requested name.
    UnknownPort {
        /// Name of the actor, or of the container for a boundary port.
        actor: String,
        /// Requested port name.
        port: String,
    },
    /// A port was used in the wrong direction.
    DirectionMismatch {
        /// Qualified port name.
        port: String,
        /// Direction the port was expected to have.
        expected: PortDirection,
    },
    /// The type of a source port cannot be assigned to its sink.
    TypeMismatch {
        /// Qualified source port name.
        source: String,
        /// Type of the source port.
        source_type: TokenType,
        /// Qualified sink port name.
        sink: String,
        /// Type of the sink port.
        sink_type: TokenType,
    },
    /// A single (non-multi) input port was connected more than once.
    MultipleSources {
        /// Qualified port name.
        port: String,
    },
    /// An input port that must receive tokens is left unconnected.
    DanglingPort {
        /// Qualified port name.
        port: String,
    },
    /// The director cannot exchange tokens across the boundary of its
    /// composite.
    UnsupportedBoundary {
        /// Name of the composite.
        composite: String,
        /// Name of the director.
        director: &'static str,
    },
    /// A director or run parameter is out of range.
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Explanation.
        reason: String,
    },
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NameCollision { container, name } => {
                write!(fmt, "the name '{name}' is already used in '{container}'")
            }
            Self::UnknownActor { container } => {
                write!(fmt, "the actor identifier does not belong to '{container}'")
            }
            Self::UnknownPort { actor, port } => {
                write!(fmt, "'{actor}' has no port named '{port}'")
            }
            Self::DirectionMismatch { port, expected } => {
                write!(fmt, "port '{port}' was expected to be an {expected} port")
            }
            Self::TypeMismatch {
                source,
                source_type,
                sink,
                sink_type,
            } => write!(
                fmt,
                "cannot connect '{source}' of type {source_type} to '{sink}' of type {sink_type}"
            ),
            Self::MultipleSources { port } => {
                write!(fmt, "the single input port '{port}' is already connected")
            }
            Self::DanglingPort { port } => {
                write!(fmt, "the input port '{port}' is not connected")
            }
            Self::UnsupportedBoundary {
                composite,
                director,
            } => write!(
                fmt,
                "the {director} director of '{composite}' cannot transfer tokens across its boundary"
            ),
            Self::InvalidParameter { name, reason } => {
                write!(fmt, "invalid parameter '{name}': {reason}")
            }
        }
    }
}

impl Error for ConfigurationError {}

/// An error detected while computing a schedule or a causal order.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum SchedulingError {
    /// The balance equations have no positive solution.
    InconsistentRates {
        /// Qualified name of the port where the conflict was found.
        port: String,
    },
    /// A cycle does not carry enough initial tokens for a complete period.
    Deadlock {
        /// Actors that could not complete their repetitions.
        actors: Vec<String>,
    },
    /// A zero-delay dependency cycle in a timed or continuous composite.
    CausalityLoop {
        /// Actors on or downstream of the cycle.
        actors: Vec<String>,
    },
    /// The rate declared on a boundary port disagrees with the inner
    /// schedule.
    BoundaryRateMismatch {
        /// Qualified boundary port name.
        port: String,
        /// Declared rate.
        declared: usize,
        /// Number of tokens moved by one period of the inner schedule.
        required: usize,
    },
    /// A connected port declares a zero rate.
    ZeroRate {
        /// Qualified port name.
        port: String,
    },
}

impl fmt::Display for SchedulingError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InconsistentRates { port } => {
                write!(fmt, "inconsistent production and consumption rates at '{port}'")
            }
            Self::Deadlock { actors } => write!(
                fmt,
                "the schedule deadlocks: {} cannot complete a period",
                actors.join(", ")
            ),
            Self::CausalityLoop { actors } => write!(
                fmt,
                "zero-delay loop through {}",
                actors.join(", ")
            ),
            Self::BoundaryRateMismatch {
                port,
                declared,
                required,
            } => write!(
                fmt,
                "boundary port '{port}' declares a rate of {declared} but the schedule moves {required} tokens per period"
            ),
            Self::ZeroRate { port } => write!(fmt, "port '{port}' declares a zero rate"),
        }
    }
}

impl Error for SchedulingError {}

/// The operation a blocked process was waiting on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BlockedOperation {
    /// Waiting for a token.
    Get,
    /// Waiting for room or for a rendezvous partner.
    Put,
}

/// A process that was blocked when a deadlock was detected.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeadlockInfo {
    /// Name of the blocked actor.
    pub actor: String,
    /// Name of the channel the actor is blocked on.
    pub channel: String,
    /// Blocked operation.
    pub operation: BlockedOperation,
}

/// An error raised while the model executes.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum ActionError {
    /// A firing was requested strictly before the current time.
    InvalidTime {
        /// Requesting actor.
        actor: String,
        /// Requested timestamp.
        requested: MonotonicTime,
        /// Current tag.
        current: SuperdenseTime,
    },
    /// All processes are blocked and none can make progress.
    Deadlock(Vec<DeadlockInfo>),
    /// A receiver operation failed.
    Receiver {
        /// Actor performing the operation.
        actor: String,
        /// Port on which it was performed.
        port: String,
        /// Underlying receiver error.
        error: ReceiverError,
    },
    /// A scheduled actor declined to fire.
    NotReady {
        /// Name of the actor.
        actor: String,
    },
    /// A token was sent on a port of an incompatible type.
    TypeMismatch {
        /// Sending actor.
        actor: String,
        /// Output port.
        port: String,
        /// Declared type of the port.
        expected: TokenType,
        /// Type of the offending token.
        found: TokenType,
    },
    /// A bounded queue would have to grow beyond its maximum capacity to
    /// resolve an artificial deadlock.
    QueueCapacityExceeded {
        /// Name of the channel.
        channel: String,
        /// Maximum capacity.
        capacity: usize,
    },
    /// An actor thread panicked.
    Panicked {
        /// Name of the actor.
        actor: String,
        /// Panic payload, if it was a string.
        message: String,
    },
    /// An actor reported a failure.
    Failed {
        /// Name of the actor.
        actor: String,
        /// Explanation.
        message: String,
    },
}

impl ActionError {
    /// Checks whether this error only signals that a peer process ended or
    /// that the run is being torn down.
    ///
    /// Such errors end the process that observes them but are not failures
    /// of the model.
    pub fn is_termination(&self) -> bool {
        matches!(
            self,
            Self::Receiver {
                error: ReceiverError::Terminated | ReceiverError::Aborted,
                ..
            }
        )
    }
}

impl fmt::Display for ActionError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTime {
                actor,
                requested,
                current,
            } => write!(
                fmt,
                "'{actor}' requested a firing at {} which precedes the current time {current}",
                SuperdenseTime::at(*requested)
            ),
            Self::Deadlock(blocked) => {
                write!(fmt, "deadlock:")?;
                for (i, info) in blocked.iter().enumerate() {
                    let op = match info.operation {
                        BlockedOperation::Get => "get",
                        BlockedOperation::Put => "put",
                    };
                    let sep = if i == 0 { " " } else { ", " };
                    write!(fmt, "{sep}'{}' blocked in {op} on '{}'", info.actor, info.channel)?;
                }
                Ok(())
            }
            Self::Receiver { actor, port, error } => {
                write!(fmt, "'{actor}' failed on port '{port}': {error}")
            }
            Self::NotReady { actor } => {
                write!(fmt, "scheduled actor '{actor}' is not ready to fire")
            }
            Self::TypeMismatch {
                actor,
                port,
                expected,
                found,
            } => write!(
                fmt,
                "'{actor}' sent a token of type {found} on port '{port}' of type {expected}"
            ),
            Self::QueueCapacityExceeded { channel, capacity } => write!(
                fmt,
                "queue '{channel}' would exceed its maximum capacity of {capacity}"
            ),
            Self::Panicked { actor, message } => write!(fmt, "'{actor}' panicked: {message}"),
            Self::Failed { actor, message } => write!(fmt, "'{actor}' failed: {message}"),
        }
    }
}

impl Error for ActionError {}

/// An error returned by a run.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum ExecutionError {
    /// The graph is malformed.
    Configuration(ConfigurationError),
    /// The graph cannot be scheduled.
    Scheduling(SchedulingError),
    /// The model failed during execution.
    Action(ActionError),
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(e) => write!(fmt, "configuration error: {e}"),
            Self::Scheduling(e) => write!(fmt, "scheduling error: {e}"),
            Self::Action(e) => write!(fmt, "action error: {e}"),
        }
    }
}

impl Error for ExecutionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Configuration(e) => Some(e),
            Self::Scheduling(e) => Some(e),
            Self::Action(e) => Some(e),
        }
    }
}

impl From<ConfigurationError> for ExecutionError {
    fn from(e: ConfigurationError) -> Self {
        Self::Configuration(e)
    }
}

impl From<SchedulingError> for ExecutionError {
    fn from(e: SchedulingError) -> Self {
        Self::Scheduling(e)
    }
}

impl From<ActionError> for ExecutionError {
    fn from(e: ActionError) -> Self {
        Self::Action(e)
    }
}
