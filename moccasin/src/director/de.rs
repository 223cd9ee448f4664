use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::actor::{ActorSlot, Context, Frame};
use crate::composite::{ActorId, Graph, PortLoc};
use crate::director::{setup_error, Continuation};
use crate::error::{ActionError, ExecutionError};
use crate::event_queue::{EventQueue, EventQueueError};
use crate::receiver::{Fifo, PortAddress, Receiver, ReceiverError};
use crate::sched::CausalOrder;
use crate::time::{MonotonicTime, SuperdenseTime};
use crate::token::Token;
use crate::util::priority_queue::PriorityQueue;

/// Actors that received a token since the triggers were last collected.
type Triggers = Arc<Mutex<Vec<ActorId>>>;

/// Discrete-event director.
///
/// Firings are processed in superdense time order. All firings sharing a tag
/// form a batch, within which actors fire in causal order: an actor only
/// fires after every actor that can feed it a same-tag token, unless the
/// token travels through a delayed port. An actor receiving a token fires at
/// the current tag if it has not fired yet, and at the next microstep
/// otherwise.
///
/// At the top level, the run completes when the queue is exhausted (unless
/// configured otherwise) or when the next event lies beyond the stop time.
/// Events past the stop time are never processed, and model time ends at the
/// stop time when the run reaches it. When embedded, the director asks its container to be fired at the time
/// of its next event, and never processes events past the container's
/// current time.
#[derive(Debug)]
pub struct DeDirector {
    stop_when_queue_is_empty: bool,
    queue: EventQueue,
    causality: Option<CausalOrder>,
    triggers: Triggers,
    disabled: HashSet<ActorId>,
}

impl DeDirector {
    /// Creates a discrete-event director.
    pub fn new() -> Self {
        Self {
            stop_when_queue_is_empty: true,
            queue: EventQueue::new(MonotonicTime::EPOCH),
            causality: None,
            triggers: Arc::new(Mutex::new(Vec::new())),
            disabled: HashSet::new(),
        }
    }

    /// Specifies whether a top-level run completes once no event is left.
    ///
    /// This is `true` by default. Otherwise the run keeps iterating until it
    /// is stopped or reaches a limit.
    pub fn with_stop_when_queue_is_empty(mut self, stop: bool) -> Self {
        self.stop_when_queue_is_empty = stop;
        self
    }

    /// Returns the pending firing requests.
    pub fn event_queue(&self) -> &EventQueue {
        &self.queue
    }

    pub(super) fn validate(&mut self, graph: &Graph) -> Result<(), ExecutionError> {
        let edges = graph.edges()?;
        self.causality = Some(CausalOrder::compute(graph, &edges)?);

        Ok(())
    }

    /// Returns a causal order matching the current topology.
    fn refresh_causality(&mut self, graph: &Graph) -> Result<(), ActionError> {
        let stale = self
            .causality
            .as_ref()
            .map_or(true, |c| c.version() != graph.version);
        if stale {
            let edges = graph.edges().map_err(|e| setup_error(graph, e))?;
            let order = CausalOrder::compute(graph, &edges).map_err(|e| setup_error(graph, e))?;
            self.causality = Some(order);
        }

        Ok(())
    }

    fn depth(&self, actor: ActorId) -> usize {
        self.causality.as_ref().map_or(0, |c| c.depth(actor))
    }

    /// Queues a firing requested by an actor.
    fn request(
        &mut self,
        graph: &Graph,
        actor: ActorId,
        time: MonotonicTime,
    ) -> Result<(), ActionError> {
        let depth = self.depth(actor);
        let name = || graph.slot(actor).map_or_else(String::new, |s| s.name.clone());

        match self.queue.schedule_firing_at(actor, time, depth) {
            Ok(_) => Ok(()),
            Err(EventQueueError::InvalidTime { requested, current }) => {
                Err(ActionError::InvalidTime {
                    actor: name(),
                    requested,
                    current,
                })
            }
            Err(e) => Err(ActionError::Failed {
                actor: name(),
                message: e.to_string(),
            }),
        }
    }

    /// Checks whether the next event lies beyond the stop time.
    fn next_event_after_stop(&self, frame: &Frame) -> bool {
        match (self.queue.next_event_time(), frame.stop_time) {
            (Some(next), Some(stop)) => next.timestamp() > stop,
            _ => false,
        }
    }

    /// Returns the time of the next iteration at the top level, which is
    /// never later than the stop time.
    pub(super) fn next_iteration_time(&self, frame: &Frame) -> MonotonicTime {
        let next = self
            .queue
            .next_event_time()
            .map_or(frame.tag.timestamp(), |tag| tag.timestamp());

        frame.stop_time.map_or(next, |stop| next.min(stop))
    }

    /// Turns the pending triggers into firings at the current tag.
    fn flush_triggers(&mut self) {
        let triggered: Vec<ActorId> = self.triggers.lock().drain(..).collect();
        for actor in triggered {
            if !self.disabled.contains(&actor) {
                let depth = self.depth(actor);
                self.queue.schedule_trigger(actor, depth);
            }
        }
    }

    pub(super) fn preinitialize(
        &mut self,
        graph: &mut Graph,
        frame: &mut Frame,
        _outer: &mut Context<'_>,
    ) -> Result<(), ActionError> {
        self.refresh_causality(graph)?;

        let triggers = self.triggers.clone();
        graph
            .create_receivers(|link| match link.edge.sink {
                PortLoc::Actor(target, _) => Arc::new(DeReceiver {
                    queue: Fifo::unbounded().with_address(link.address.clone()),
                    target,
                    triggers: triggers.clone(),
                }),
                PortLoc::Boundary(_) => {
                    Arc::new(Fifo::unbounded().with_address(link.address.clone()))
                }
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
        frame.tag = outer.tag();
        self.queue.reset(frame.tag);
        self.triggers.lock().clear();
        self.disabled.clear();
        graph.clear_receivers();

        for id in graph.order.clone() {
            let Some(slot) = graph.slots.get_mut(id.0) else {
                continue;
            };
            slot.initialize(frame)?;
            for time in std::mem::take(&mut frame.refires) {
                self.request(graph, id, time)?;
            }
        }
        for slot in graph.slots_in_order() {
            slot.emit_initial_tokens()?;
        }
        self.flush_triggers();

        if !outer.is_top_level() {
            if let Some(next) = self.queue.next_event_time() {
                outer.fire_at(next.timestamp())?;
            }
        }

        Ok(())
    }

    pub(super) fn prefire(
        &mut self,
        _graph: &mut Graph,
        _frame: &mut Frame,
        outer: &mut Context<'_>,
    ) -> Result<bool, ActionError> {
        if !outer.is_top_level() {
            self.queue.advance_to(SuperdenseTime::at(outer.time()));
        }

        Ok(true)
    }

    pub(super) fn fire(
        &mut self,
        graph: &mut Graph,
        frame: &mut Frame,
        outer: &mut Context<'_>,
    ) -> Result<(), ActionError> {
        // Tokens transferred from the container trigger their consumers at
        // the current tag.
        self.flush_triggers();

        let Some(next) = self.queue.next_event_time() else {
            return Ok(());
        };
        if outer.is_top_level() && self.next_event_after_stop(frame) {
            return Ok(());
        }
        if !outer.is_top_level() && next.timestamp() > outer.time() {
            return Ok(());
        }
        let Some((tag, batch)) = self.queue.pop_next_batch() else {
            return Ok(());
        };
        frame.tag = tag;
        debug!(composite = %graph.name, %tag, firings = batch.len(), "processing events");

        let mut sweep: PriorityQueue<usize, ActorId> = PriorityQueue::new();
        let mut queued: HashSet<ActorId> = HashSet::new();
        let mut fired: HashSet<ActorId> = HashSet::new();
        let mut deferred: HashSet<ActorId> = HashSet::new();
        for (actor, depth) in batch {
            if !self.disabled.contains(&actor) && queued.insert(actor) {
                sweep.insert(depth, actor);
            }
        }

        while let Some((_, actor)) = sweep.pull() {
            let Some(slot) = graph.slots.get_mut(actor.0) else {
                continue;
            };
            fired.insert(actor);
            let before = held_tokens(slot);
            let outcome = slot.iterate(frame)?;
            let after = held_tokens(slot);
            if outcome == Some(false) {
                trace!(actor = %slot.name, "actor disabled");
                self.disabled.insert(actor);
            }

            for time in std::mem::take(&mut frame.refires) {
                self.request(graph, actor, time)?;
            }

            // An actor that consumed some but not all of its input tokens
            // fires again at the next microstep.
            let mut retrigger = Vec::new();
            if after > 0 && after < before {
                retrigger.push(actor);
            }
            retrigger.extend(self.triggers.lock().drain(..));

            for target in retrigger {
                if self.disabled.contains(&target) {
                    continue;
                }
                let depth = self.depth(target);
                if fired.contains(&target) {
                    if deferred.insert(target) {
                        self.queue
                            .schedule_firing_at(target, tag.timestamp(), depth)
                            .map_err(|e| setup_error(graph, e))?;
                    }
                } else if queued.insert(target) {
                    sweep.insert(depth, target);
                }
            }
        }

        Ok(())
    }

    pub(super) fn postfire(
        &mut self,
        _graph: &mut Graph,
        frame: &mut Frame,
        outer: &mut Context<'_>,
    ) -> Result<Continuation, ActionError> {
        let next = self.queue.next_event_time();

        if !outer.is_top_level() {
            if let Some(next) = next {
                outer.fire_at(next.timestamp())?;
            }

            return Ok(Continuation::Continue);
        }

        let stop_reached = match next {
            None => self.stop_when_queue_is_empty || frame.stop_time.is_some(),
            Some(_) => self.next_event_after_stop(frame),
        };
        if !stop_reached {
            return Ok(Continuation::Continue);
        }

        // Nothing can happen before the stop time, so model time ends there.
        if let Some(stop) = frame.stop_time {
            let end = SuperdenseTime::at(stop);
            if end > frame.tag && (next.is_some() || !self.stop_when_queue_is_empty) {
                frame.tag = end;
                self.queue.advance_to(end);
            }
        }

        Ok(Continuation::Idle)
    }
}

impl Default for DeDirector {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the number of tokens waiting on the inputs of an actor.
fn held_tokens(slot: &ActorSlot) -> usize {
    slot.inputs
        .iter()
        .flat_map(|p| &p.channels)
        .map(|r| r.len())
        .sum()
}

/// An unbounded queue that records its consumer as triggered on every put.
#[derive(Debug)]
struct DeReceiver {
    queue: Fifo,
    target: ActorId,
    triggers: Triggers,
}

impl Receiver for DeReceiver {
    fn put(&self, token: Token) -> Result<(), ReceiverError> {
        self.queue.put(token)?;
        self.triggers.lock().push(self.target);

        Ok(())
    }

    fn get(&self) -> Result<Token, ReceiverError> {
        self.queue.get()
    }

    fn has_tokens(&self, n: usize) -> bool {
        self.queue.has_tokens(n)
    }

    fn has_room_for(&self, n: usize) -> bool {
        self.queue.has_room_for(n)
    }

    fn len(&self) -> usize {
        self.queue.len()
    }

    fn capacity(&self) -> Option<usize> {
        None
    }

    fn clear(&self) {
        self.queue.clear();
    }

    fn address(&self) -> Option<&PortAddress> {
        self.queue.address()
    }
}
