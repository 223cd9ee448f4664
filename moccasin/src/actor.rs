//! Actor lifecycle contract.
//!
//! An [`Actor`] is a unit of computation that communicates exclusively
//! through its ports. Its director drives it through a fixed lifecycle:
//!
//! ```text
//! preinitialize → initialize → { prefire → fire → postfire }* → wrapup
//! ```
//!
//! * `preinitialize` is called once per run, before any token is exchanged,
//! * `initialize` resets the actor to the starting condition of the model,
//! * `prefire` tells whether the actor is ready to fire and must not change
//!   persistent state,
//! * `fire` consumes input tokens and produces output tokens,
//! * `postfire` commits state changes and returns `false` to request
//!   termination,
//! * `wrapup` is always called once at the end of a run that reached
//!   `preinitialize`, including runs that ended with an error.
//!
//! All methods except `fire` have a default implementation.
//!
//! # Examples
//!
//! A counter that emits 0, 1, 2, ... and commits its state in postfire:
//!
//! ```
//! use moccasin::actor::{Actor, Context, PortSpec};
//! use moccasin::error::ActionError;
//! use moccasin::token::TokenType;
//!
//! #[derive(Default)]
//! struct Counter {
//!     count: i64,
//! }
//!
//! impl Actor for Counter {
//!     fn ports(&self) -> Vec<PortSpec> {
//!         vec![PortSpec::output("out", TokenType::Int)]
//!     }
//!
//!     fn initialize(&mut self, _: &mut Context<'_>) -> Result<(), ActionError> {
//!         self.count = 0;
//!         Ok(())
//!     }
//!
//!     fn fire(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError> {
//!         ctx.send("out", self.count)
//!     }
//!
//!     fn postfire(&mut self, _: &mut Context<'_>) -> Result<bool, ActionError> {
//!         self.count += 1;
//!         Ok(true)
//!     }
//! }
//! ```

mod context;
mod port;
mod slot;

use crate::composite::CompositeActor;
use crate::error::ActionError;

pub use context::Context;
pub use port::{PortDirection, PortSpec};

pub(crate) use context::Frame;
pub(crate) use port::{InputPort, OutputPort};
pub(crate) use slot::ActorSlot;

/// A schedulable unit of computation.
pub trait Actor: Send {
    /// Declares the ports of the actor, inputs and outputs in any order.
    ///
    /// This is called once when the actor is added to a composite.
    fn ports(&self) -> Vec<PortSpec> {
        Vec::new()
    }

    /// Performs one-time setup at the beginning of a run.
    fn preinitialize(&mut self, _ctx: &mut Context<'_>) -> Result<(), ActionError> {
        Ok(())
    }

    /// Resets the actor to the starting condition of the model.
    fn initialize(&mut self, _ctx: &mut Context<'_>) -> Result<(), ActionError> {
        Ok(())
    }

    /// Checks whether the actor can fire.
    fn prefire(&mut self, _ctx: &mut Context<'_>) -> Result<bool, ActionError> {
        Ok(true)
    }

    /// Consumes inputs and produces outputs.
    fn fire(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError>;

    /// Commits the state of the iteration and tells whether the actor should
    /// keep being scheduled.
    fn postfire(&mut self, _ctx: &mut Context<'_>) -> Result<bool, ActionError> {
        Ok(true)
    }

    /// Releases resources at the end of a run.
    fn wrapup(&mut self, _ctx: &mut Context<'_>) -> Result<(), ActionError> {
        Ok(())
    }

    /// Returns the composite view of the actor, if it is a composite.
    #[doc(hidden)]
    fn as_composite(&self) -> Option<&CompositeActor> {
        None
    }

    /// Returns the mutable composite view of the actor, if it is a composite.
    #[doc(hidden)]
    fn as_composite_mut(&mut self) -> Option<&mut CompositeActor> {
        None
    }
}

/// Lifecycle state of an actor within a run.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ActorState {
    /// The actor has not taken part in a run yet.
    Constructed,
    /// `preinitialize` was called.
    Preinitialized,
    /// `initialize` returned successfully.
    Initialized,
    /// `prefire` returned.
    Prefired,
    /// `fire` returned.
    Fired,
    /// `postfire` returned.
    Postfired,
    /// `wrapup` was called.
    WrappedUp,
}
