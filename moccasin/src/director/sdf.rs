use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use crate::actor::{Context, Frame};
use crate::composite::{Graph, PortLoc};
use crate::director::{setup_error, Continuation};
use crate::error::{ActionError, ConfigurationError, ExecutionError};
use crate::receiver::Fifo;
use crate::sched::Schedule;
use crate::time::SuperdenseTime;

/// Synchronous dataflow director.
///
/// Each iteration runs one period of a static [`Schedule`] derived from the
/// port rates, after which every receiver holds as many tokens as before.
/// Receivers are bounded queues sized from the schedule.
///
/// Without a period the model is untimed. With a period, the current time
/// advances by that period after each iteration; when embedded in a timed
/// model, the director asks its container to be fired again one period
/// later.
#[derive(Debug, Default)]
pub struct SdfDirector {
    period: Option<Duration>,
    schedule: Option<Schedule>,
    terminate: bool,
}

impl SdfDirector {
    /// Creates an untimed dataflow director.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the amount of time by which each iteration advances time.
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = Some(period);
        self
    }

    /// Returns the iteration period, if any.
    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    /// Returns the schedule computed by the last validation, if any.
    pub fn schedule(&self) -> Option<&Schedule> {
        self.schedule.as_ref()
    }

    pub(super) fn validate(&mut self, graph: &Graph) -> Result<(), ExecutionError> {
        if self.period == Some(Duration::ZERO) {
            return Err(ConfigurationError::InvalidParameter {
                name: "period",
                reason: "the period of a dataflow director must be positive".to_owned(),
            }
            .into());
        }

        let edges = graph.edges()?;

        // A single input that consumes tokens but is fed by nothing can
        // never fire.
        for &id in &graph.order {
            let Some(slot) = graph.slot(id) else { continue };
            for (index, input) in slot.inputs.iter().enumerate() {
                let spec = &input.spec;
                if spec.rate() == 0 || spec.is_multiport() {
                    continue;
                }
                let loc = PortLoc::Actor(id, index);
                if !edges.iter().any(|e| e.sink == loc) {
                    return Err(ConfigurationError::DanglingPort {
                        port: graph.qualified(loc, spec),
                    }
                    .into());
                }
            }
        }

        self.schedule = Some(Schedule::compute(graph, &edges)?);

        Ok(())
    }

    /// Returns a schedule matching the current topology.
    fn current_schedule(&mut self, graph: &Graph) -> Result<&Schedule, ActionError> {
        let stale = self
            .schedule
            .as_ref()
            .map_or(true, |s| s.version() != graph.version);
        if stale {
            let edges = graph.edges().map_err(|e| setup_error(graph, e))?;
            let schedule = Schedule::compute(graph, &edges).map_err(|e| setup_error(graph, e))?;
            self.schedule = Some(schedule);
        }

        self.schedule
            .as_ref()
            .ok_or_else(|| setup_error(graph, "no dataflow schedule"))
    }

    pub(super) fn preinitialize(
        &mut self,
        graph: &mut Graph,
        frame: &mut Frame,
        _outer: &mut Context<'_>,
    ) -> Result<(), ActionError> {
        let schedule = self.current_schedule(graph)?.clone();
        graph
            .create_receivers(|link| {
                let capacity = schedule.buffer_size(link.edge.id).unwrap_or(1).max(1);
                Arc::new(Fifo::bounded(capacity).with_address(link.address.clone()))
            })
            .map_err(|e| setup_error(graph, e))?;

        graph.preinitialize_all(frame)
    }

    pub(super) fn initialize(
        &mut self,
        graph: &mut Graph,
        frame: &mut Frame,
        outer: &mut Context<'_>,
    ) -> Result<(), ActionError> {
        let embedded = !outer.is_top_level();
        frame.tag = outer.tag();
        self.terminate = false;
        graph.clear_receivers();

        for slot in graph.slots_in_order() {
            slot.initialize(frame)?;
            forward_refires(frame, outer, embedded)?;
        }
        for slot in graph.slots_in_order() {
            slot.emit_initial_tokens()?;
        }

        // A timed embedded model is driven by its container.
        if embedded && self.period.is_some() {
            outer.fire_at(outer.time())?;
        }

        Ok(())
    }

    pub(super) fn prefire(
        &mut self,
        graph: &mut Graph,
        frame: &mut Frame,
        outer: &mut Context<'_>,
    ) -> Result<bool, ActionError> {
        if outer.is_top_level() {
            return Ok(true);
        }

        // One iteration consumes exactly the declared rate of each boundary
        // input.
        for input in outer.inputs {
            let rate = input.spec.rate();
            if !input.channels.iter().all(|r| r.has_tokens(rate)) {
                trace!(
                    composite = %graph.name,
                    port = input.spec.name(),
                    "not enough input tokens"
                );
                return Ok(false);
            }
        }
        frame.tag = outer.tag();

        Ok(true)
    }

    pub(super) fn fire(
        &mut self,
        graph: &mut Graph,
        frame: &mut Frame,
        outer: &mut Context<'_>,
    ) -> Result<(), ActionError> {
        let embedded = !outer.is_top_level();
        let Some(schedule) = self.schedule.as_ref() else {
            return Err(setup_error(graph, "no dataflow schedule"));
        };

        for actor in schedule.iter() {
            let Some(slot) = graph.slots.get_mut(actor.0) else {
                continue;
            };
            match slot.iterate(frame)? {
                None => {
                    return Err(ActionError::NotReady {
                        actor: slot.name.clone(),
                    })
                }
                Some(false) => self.terminate = true,
                Some(true) => {}
            }
            forward_refires(frame, outer, embedded)?;
        }

        Ok(())
    }

    pub(super) fn postfire(
        &mut self,
        _graph: &mut Graph,
        frame: &mut Frame,
        outer: &mut Context<'_>,
    ) -> Result<Continuation, ActionError> {
        if self.terminate {
            return Ok(Continuation::Terminate);
        }

        if let Some(period) = self.period {
            let next = frame.tag.timestamp() + period;
            if outer.is_top_level() {
                if frame.stop_time.is_some_and(|stop| next > stop) {
                    return Ok(Continuation::Idle);
                }
                frame.tag = SuperdenseTime::at(next);
            } else {
                outer.fire_at(next)?;
            }
        }

        Ok(Continuation::Continue)
    }
}

/// Passes the firing requests of the last fired actor on to the container,
/// or drops them at the top level where time is driven by the period.
fn forward_refires(
    frame: &mut Frame,
    outer: &mut Context<'_>,
    embedded: bool,
) -> Result<(), ActionError> {
    for time in frame.refires.drain(..) {
        if embedded {
            outer.fire_at(time)?;
        }
    }

    Ok(())
}
