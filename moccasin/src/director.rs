//! Models of computation.
//!
//! A [`Director`] decides when and in which order the actors of a composite
//! fire, and supplies them with model time. The set of directors is closed:
//!
//! * [`SdfDirector`]: synchronous dataflow, a static schedule computed from
//!   the declared port rates, optionally advancing time by a fixed period,
//! * [`DeDirector`]: discrete events in superdense time, fired in tag order
//!   and in causal order within a tag,
//! * [`ProcessDirector`]: process networks, one thread per actor,
//!   communicating through rendezvous channels or blocking queues,
//! * [`ContinuousDirector`]: fixed-step continuous-time stepping.
//!
//! The director is chosen when the composite is created:
//!
//! ```
//! use std::time::Duration;
//! use moccasin::composite::CompositeActor;
//! use moccasin::director::{DeDirector, SdfDirector};
//!
//! let timed = CompositeActor::new("timed", DeDirector::new());
//! let dataflow = CompositeActor::new(
//!     "dataflow",
//!     SdfDirector::new().with_period(Duration::from_millis(10)),
//! );
//! assert_eq!(timed.director().name(), "DE");
//! assert_eq!(dataflow.director().name(), "SDF");
//! ```

mod continuous;
mod de;
mod process;
mod sdf;

use std::fmt;

use crate::actor::{Context, Frame};
use crate::composite::Graph;
use crate::error::{ActionError, ExecutionError};
use crate::time::MonotonicTime;

pub use continuous::ContinuousDirector;
pub use de::DeDirector;
pub use process::ProcessDirector;
pub use sdf::SdfDirector;

/// What a composite should do after an iteration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Continuation {
    /// Keep iterating.
    Continue,
    /// Nothing is left to do: the event queue is exhausted or the stop time
    /// was reached.
    Idle,
    /// A contained actor requested termination.
    Terminate,
}

/// The director of a composite actor.
#[derive(Debug)]
pub enum Director {
    /// Synchronous dataflow.
    Sdf(SdfDirector),
    /// Discrete events.
    De(DeDirector),
    /// Process networks.
    Process(ProcessDirector),
    /// Continuous time.
    Continuous(ContinuousDirector),
}

macro_rules! dispatch {
    ($self:ident, $d:ident => $body:expr) => {
        match $self {
            Director::Sdf($d) => $body,
            Director::De($d) => $body,
            Director::Process($d) => $body,
            Director::Continuous($d) => $body,
        }
    };
}

impl Director {
    /// Returns the short name of the model of computation.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sdf(_) => "SDF",
            Self::De(_) => "DE",
            Self::Process(_) => "PN",
            Self::Continuous(_) => "CT",
        }
    }

    /// Checks whether boundary inputs are transferred exactly at their
    /// declared rate rather than all at once.
    pub(crate) fn transfers_exact_rate(&self) -> bool {
        matches!(self, Self::Sdf(_))
    }

    /// Returns the time of the next iteration, for real-time pacing.
    pub(crate) fn next_iteration_time(&self, frame: &Frame) -> MonotonicTime {
        match self {
            Self::De(d) => d.next_iteration_time(frame),
            _ => frame.tag.timestamp(),
        }
    }

    pub(crate) fn validate(&mut self, graph: &Graph) -> Result<(), ExecutionError> {
        dispatch!(self, d => d.validate(graph))
    }

    pub(crate) fn preinitialize(
        &mut self,
        graph: &mut Graph,
        frame: &mut Frame,
        outer: &mut Context<'_>,
    ) -> Result<(), ActionError> {
        dispatch!(self, d => d.preinitialize(graph, frame, outer))
    }

    pub(crate) fn initialize(
        &mut self,
        graph: &mut Graph,
        frame: &mut Frame,
        outer: &mut Context<'_>,
    ) -> Result<(), ActionError> {
        dispatch!(self, d => d.initialize(graph, frame, outer))
    }

    pub(crate) fn prefire(
        &mut self,
        graph: &mut Graph,
        frame: &mut Frame,
        outer: &mut Context<'_>,
    ) -> Result<bool, ActionError> {
        dispatch!(self, d => d.prefire(graph, frame, outer))
    }

    pub(crate) fn fire(
        &mut self,
        graph: &mut Graph,
        frame: &mut Frame,
        outer: &mut Context<'_>,
    ) -> Result<(), ActionError> {
        dispatch!(self, d => d.fire(graph, frame, outer))
    }

    pub(crate) fn postfire(
        &mut self,
        graph: &mut Graph,
        frame: &mut Frame,
        outer: &mut Context<'_>,
    ) -> Result<Continuation, ActionError> {
        dispatch!(self, d => d.postfire(graph, frame, outer))
    }

    pub(crate) fn wrapup(
        &mut self,
        graph: &mut Graph,
        frame: &mut Frame,
    ) -> Result<(), ActionError> {
        graph.wrapup_all(frame)
    }
}

impl From<SdfDirector> for Director {
    fn from(d: SdfDirector) -> Self {
        Self::Sdf(d)
    }
}

impl From<DeDirector> for Director {
    fn from(d: DeDirector) -> Self {
        Self::De(d)
    }
}

impl From<ProcessDirector> for Director {
    fn from(d: ProcessDirector) -> Self {
        Self::Process(d)
    }
}

impl From<ContinuousDirector> for Director {
    fn from(d: ContinuousDirector) -> Self {
        Self::Continuous(d)
    }
}

impl fmt::Display for Director {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reports a failure to set up the graph of a composite at run time.
fn setup_error(graph: &Graph, error: impl fmt::Display) -> ActionError {
    ActionError::Failed {
        actor: graph.name.clone(),
        message: error.to_string(),
    }
}
