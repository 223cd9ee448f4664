//! Pending firing requests of a timed director.
//!
//! Requests are ordered by tag, then by the topological depth of the target
//! actor, then by insertion order. Since the depth of an actor never exceeds
//! the depth of the actors it depends on, actors closer to the source of an
//! event fire first within a tag, and ties are resolved deterministically.

use std::collections::BTreeSet;
use std::error::Error;
use std::fmt;

use tracing::trace;

use crate::composite::ActorId;
use crate::time::{MonotonicTime, SuperdenseTime};
use crate::util::priority_queue::PriorityQueue;

/// A time-ordered queue of firing requests.
///
/// # Examples
///
/// Two requests for the same actor at the same timestamp are assigned
/// consecutive microsteps:
///
/// ```
/// use std::time::Duration;
/// use moccasin::event_queue::EventQueue;
/// use moccasin::time::{MonotonicTime, SuperdenseTime};
/// # use moccasin::composite::CompositeActor;
/// # use moccasin::director::DeDirector;
/// # use moccasin::library::Const;
/// # let mut top = CompositeActor::new("top", DeDirector::new());
/// # let source = top.add_actor("source", Const::new(1)).unwrap();
///
/// let t0 = MonotonicTime::EPOCH;
/// let mut queue = EventQueue::new(t0);
/// let five = t0 + Duration::from_secs(5);
/// queue.schedule_firing_at(source, five, 0).unwrap();
/// queue.schedule_firing_at(source, five, 0).unwrap();
///
/// let (tag, _) = queue.pop_next_batch().unwrap();
/// assert_eq!(tag, SuperdenseTime::new(five, 0));
/// let (tag, _) = queue.pop_next_batch().unwrap();
/// assert_eq!(tag, SuperdenseTime::new(five, 1));
/// ```
pub struct EventQueue {
    current: SuperdenseTime,
    queue: PriorityQueue<(SuperdenseTime, usize), ActorId>,
    pending: BTreeSet<(SuperdenseTime, ActorId)>,
    // Whether a batch was processed at the current tag.
    processed: bool,
}

impl EventQueue {
    /// Creates an empty queue whose current tag is `(start, 0)`.
    pub fn new(start: MonotonicTime) -> Self {
        Self {
            current: SuperdenseTime::at(start),
            queue: PriorityQueue::new(),
            pending: BTreeSet::new(),
            processed: false,
        }
    }

    /// Discards all requests and sets the current tag.
    pub fn reset(&mut self, current: SuperdenseTime) {
        self.current = current;
        self.queue.clear();
        self.pending.clear();
        self.processed = false;
    }

    /// Returns the current tag.
    pub fn current(&self) -> SuperdenseTime {
        self.current
    }

    /// Moves the current tag forward, if `tag` is later.
    ///
    /// Requests older than the new current tag stay in the queue and are
    /// processed next.
    pub fn advance_to(&mut self, tag: SuperdenseTime) {
        if tag > self.current {
            self.current = tag;
            self.processed = false;
        }
    }

    /// Requests a firing of `actor` at `time`.
    ///
    /// A request at the current timestamp is assigned the next microstep once
    /// a batch was processed at the current tag, and the current tag
    /// otherwise. A request at a later timestamp is assigned microstep 0. If
    /// the same actor already has a request at that tag, the next free
    /// microstep is used instead.
    ///
    /// Returns the assigned tag, or an error if `time` precedes the current
    /// timestamp or if no microstep is left at that timestamp.
    pub fn schedule_firing_at(
        &mut self,
        actor: ActorId,
        time: MonotonicTime,
        depth: usize,
    ) -> Result<SuperdenseTime, EventQueueError> {
        if time < self.current.timestamp() {
            return Err(EventQueueError::InvalidTime {
                requested: time,
                current: self.current,
            });
        }

        let next = |tag: SuperdenseTime| {
            tag.checked_next_microstep()
                .ok_or(EventQueueError::MicrostepOverflow { timestamp: time })
        };
        let mut tag = if time == self.current.timestamp() && self.processed {
            next(self.current)?
        } else if time == self.current.timestamp() {
            self.current
        } else {
            SuperdenseTime::at(time)
        };
        while self.pending.contains(&(tag, actor)) {
            tag = next(tag)?;
        }
        self.insert(tag, actor, depth);

        Ok(tag)
    }

    /// Requests a firing of `actor` at the current tag, unless one is
    /// already pending.
    pub fn schedule_trigger(&mut self, actor: ActorId, depth: usize) {
        let tag = self.current;
        if !self.pending.contains(&(tag, actor)) {
            self.insert(tag, actor, depth);
        }
    }

    fn insert(&mut self, tag: SuperdenseTime, actor: ActorId, depth: usize) {
        trace!(?actor, %tag, depth, "firing request");
        self.pending.insert((tag, actor));
        self.queue.insert((tag, depth), actor);
    }

    /// Returns the tag of the earliest request.
    pub fn next_event_time(&self) -> Option<SuperdenseTime> {
        self.queue.peek_key().map(|&(tag, _)| tag)
    }

    /// Removes all requests sharing the earliest tag and makes that tag
    /// current.
    ///
    /// The actors are returned with their depth, sorted by depth and then by
    /// insertion order.
    pub fn pop_next_batch(&mut self) -> Option<(SuperdenseTime, Vec<(ActorId, usize)>)> {
        let tag = self.next_event_time()?;
        let mut batch = Vec::new();
        while let Some(((_, depth), actor)) = self.queue.pull_if(|&(t, _)| t == tag) {
            self.pending.remove(&(tag, actor));
            batch.push((actor, depth));
        }
        self.current = self.current.max(tag);
        self.processed = true;

        Some((tag, batch))
    }

    /// Returns the number of pending requests.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Checks whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("current", &self.current)
            .field("next", &self.next_event_time())
            .field("len", &self.len())
            .finish()
    }
}

/// Error returned when a firing request cannot be queued.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EventQueueError {
    /// The firing was requested strictly before the current time.
    InvalidTime {
        /// Requested timestamp.
        requested: MonotonicTime,
        /// Current tag of the queue.
        current: SuperdenseTime,
    },
    /// All microsteps at the requested timestamp are exhausted.
    MicrostepOverflow {
        /// Requested timestamp.
        timestamp: MonotonicTime,
    },
}

impl fmt::Display for EventQueueError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTime { requested, current } => write!(
                fmt,
                "the requested time {} precedes the current time {}",
                SuperdenseTime::at(*requested),
                current
            ),
            Self::MicrostepOverflow { timestamp } => write!(
                fmt,
                "no microstep is left at time {}; a zero-delay loop never settles",
                SuperdenseTime::at(*timestamp)
            ),
        }
    }
}

impl Error for EventQueueError {}
