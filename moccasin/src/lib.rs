//! An actor execution kernel with pluggable models of computation.
//!
//! Moccasin executes hierarchical graphs of actors. An actor is an isolated
//! unit of computation with a fixed set of typed input and output ports; it
//! communicates with other actors exclusively by sending immutable
//! [`Token`](token::Token)s through the connections of its ports.
//!
//! What an actor graph *means* is decided by the [`Director`] of the
//! composite that contains it. The same actors can be executed as:
//!
//! * synchronous dataflow, with a static schedule derived from the token
//!   rates declared on the ports,
//! * discrete events, where actors fire at tagged instants of superdense
//!   time,
//! * process networks, where each actor runs on its own thread and blocks on
//!   its channels,
//! * fixed-step continuous time.
//!
//! Composites are themselves actors, so a composite governed by one director
//! can be embedded in a composite governed by another.
//!
//! [`Director`]: director::Director
//!
//! # A practical overview
//!
//! Running a model involves three activities:
//!
//! 1. writing actors, by implementing the [`Actor`](actor::Actor) trait,
//! 2. assembling a [`CompositeActor`](composite::CompositeActor) from actors
//!    and connections, under a director,
//! 3. handing the top-level composite to a [`Manager`](manager::Manager),
//!    which validates it and drives it through the actor lifecycle.
//!
//! ## Writing actors
//!
//! An actor declares its ports once, through [`Actor::ports()`], and then
//! receives a [`Context`](actor::Context) at each lifecycle call to read its
//! inputs, write its outputs and request future firings:
//!
//! ```
//! use moccasin::actor::{Actor, Context, PortSpec};
//! use moccasin::error::ActionError;
//! use moccasin::token::TokenType;
//!
//! /// Adds the values received on its two inputs.
//! struct Adder;
//!
//! impl Actor for Adder {
//!     fn ports(&self) -> Vec<PortSpec> {
//!         vec![
//!             PortSpec::input("left", TokenType::Int),
//!             PortSpec::input("right", TokenType::Int),
//!             PortSpec::output("sum", TokenType::Int),
//!         ]
//!     }
//!
//!     fn fire(&mut self, ctx: &mut Context<'_>) -> Result<(), ActionError> {
//!         let left = ctx.get("left")?.as_int().unwrap_or_default();
//!         let right = ctx.get("right")?.as_int().unwrap_or_default();
//!
//!         ctx.send("sum", left + right)
//!     }
//! }
//! ```
//!
//! [`Actor::ports()`]: actor::Actor::ports
//!
//! ## Assembling and running a model
//!
//! Connections are made between port references obtained from actor
//! identifiers. Type compatibility and fan-in are checked when connecting:
//!
//! ```
//! use moccasin::composite::CompositeActor;
//! use moccasin::director::SdfDirector;
//! use moccasin::library::{Ramp, Recorder, Scale};
//! use moccasin::manager::{Manager, RunConfig, RunOutcome};
//! use moccasin::token::Token;
//!
//! let mut top = CompositeActor::new("top", SdfDirector::new());
//! let ramp = top.add_actor("ramp", Ramp::new(1))?;
//! let scale = top.add_actor("scale", Scale::new(0.5))?;
//! let recorder = Recorder::new();
//! let log = recorder.handle();
//! let sink = top.add_actor("sink", recorder)?;
//! top.connect(ramp.port("out"), scale.port("in"))?;
//! top.connect(scale.port("out"), sink.port("in"))?;
//!
//! let mut manager = Manager::new(top, RunConfig::new().with_iteration_limit(3));
//! assert_eq!(manager.run()?, RunOutcome::Completed);
//! assert_eq!(
//!     log.tokens(),
//!     vec![Token::Double(0.5), Token::Double(1.0), Token::Double(1.5)]
//! );
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Logging
//!
//! The kernel emits [`tracing`] events and spans; see the [`logging`] module
//! for a timer that stamps events with model time.
#![warn(missing_docs, missing_debug_implementations, unreachable_pub)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod actor;
pub mod composite;
pub mod director;
pub mod error;
pub mod event_queue;
pub mod library;
pub mod logging;
pub mod manager;
pub mod receiver;
pub mod sched;
pub mod time;
pub mod token;
pub(crate) mod util;
