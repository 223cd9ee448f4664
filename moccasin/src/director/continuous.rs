use std::sync::Arc;
use std::time::Duration;

use crate::actor::{Context, Frame};
use crate::composite::{ActorId, Graph};
use crate::director::{setup_error, Continuation};
use crate::error::{ActionError, ConfigurationError, ExecutionError};
use crate::receiver::Mailbox;
use crate::sched::CausalOrder;
use crate::time::SuperdenseTime;

/// Fixed-step continuous-time director.
///
/// Each iteration evaluates the model once at the current time and then
/// advances time by the step:
///
/// 1. state actors, i.e. actors whose outputs are all delayed, fire first in
///    declaration order and publish their current state,
/// 2. all other actors fire in causal order,
/// 3. every fired actor is postfired, which is where state actors integrate
///    the derivatives computed during the evaluation.
///
/// Receivers are mailboxes: a signal is the latest value written to it.
#[derive(Debug)]
pub struct ContinuousDirector {
    step: Duration,
    causality: Option<CausalOrder>,
    fired: Vec<ActorId>,
}

impl ContinuousDirector {
    /// Creates a director advancing time by `step` per iteration.
    pub fn new(step: Duration) -> Self {
        Self {
            step,
            causality: None,
            fired: Vec::new(),
        }
    }

    /// Returns the integration step.
    pub fn step(&self) -> Duration {
        self.step
    }

    pub(super) fn validate(&mut self, graph: &Graph) -> Result<(), ExecutionError> {
        if self.step.is_zero() {
            return Err(ConfigurationError::InvalidParameter {
                name: "step",
                reason: "the integration step must be positive".to_owned(),
            }
            .into());
        }
        let edges = graph.edges()?;
        self.causality = Some(CausalOrder::compute(graph, &edges)?);

        Ok(())
    }

    pub(super) fn preinitialize(
        &mut self,
        graph: &mut Graph,
        frame: &mut Frame,
        _outer: &mut Context<'_>,
    ) -> Result<(), ActionError> {
        let stale = self
            .causality
            .as_ref()
            .map_or(true, |c| c.version() != graph.version);
        if stale {
            let edges = graph.edges().map_err(|e| setup_error(graph, e))?;
            let order = CausalOrder::compute(graph, &edges).map_err(|e| setup_error(graph, e))?;
            self.causality = Some(order);
        }

        graph
            .create_receivers(|link| Arc::new(Mailbox::with_address(link.address.clone())))
            .map_err(|e| setup_error(graph, e))?;
        frame.step_size = Some(self.step);

        graph.preinitialize_all(frame)
    }

    pub(super) fn initialize(
        &mut self,
        graph: &mut Graph,
        frame: &mut Frame,
        outer: &mut Context<'_>,
    ) -> Result<(), ActionError> {
        frame.tag = outer.tag();
        frame.step_size = Some(self.step);
        self.fired.clear();
        graph.clear_receivers();

        for slot in graph.slots_in_order() {
            slot.initialize(frame)?;
            // Time is driven by the step only.
            frame.refires.clear();
        }
        for slot in graph.slots_in_order() {
            slot.emit_initial_tokens()?;
        }

        if !outer.is_top_level() {
            outer.fire_at(outer.time())?;
        }

        Ok(())
    }

    pub(super) fn prefire(
        &mut self,
        _graph: &mut Graph,
        frame: &mut Frame,
        outer: &mut Context<'_>,
    ) -> Result<bool, ActionError> {
        if !outer.is_top_level() {
            frame.tag = outer.tag();
        }

        Ok(true)
    }

    pub(super) fn fire(
        &mut self,
        graph: &mut Graph,
        frame: &mut Frame,
        _outer: &mut Context<'_>,
    ) -> Result<(), ActionError> {
        let Some(causality) = self.causality.as_ref() else {
            return Err(setup_error(graph, "no causal order"));
        };

        let states = graph.order.iter().copied().filter(|&id| {
            graph.slot(id).is_some_and(|s| {
                !s.outputs.is_empty() && s.outputs.iter().all(|p| p.spec.is_delayed())
            })
        });
        let mut sequence: Vec<ActorId> = states.collect();
        for &id in causality.order() {
            if !sequence.contains(&id) {
                sequence.push(id);
            }
        }

        self.fired.clear();
        for id in sequence {
            let Some(slot) = graph.slots.get_mut(id.0) else {
                continue;
            };
            if slot.prefire(frame)? {
                slot.fire(frame)?;
                self.fired.push(id);
            }
            frame.refires.clear();
        }

        Ok(())
    }

    pub(super) fn postfire(
        &mut self,
        graph: &mut Graph,
        frame: &mut Frame,
        outer: &mut Context<'_>,
    ) -> Result<Continuation, ActionError> {
        let mut terminate = false;
        for &id in &self.fired {
            if let Some(slot) = graph.slots.get_mut(id.0) {
                terminate |= !slot.postfire(frame)?;
                frame.refires.clear();
            }
        }
        if terminate {
            return Ok(Continuation::Terminate);
        }

        let next = frame.tag.timestamp() + self.step;
        if outer.is_top_level() {
            if frame.stop_time.is_some_and(|stop| next > stop) {
                return Ok(Continuation::Idle);
            }
            frame.tag = SuperdenseTime::at(next);
        } else {
            outer.fire_at(next)?;
        }

        Ok(Continuation::Continue)
    }
}
