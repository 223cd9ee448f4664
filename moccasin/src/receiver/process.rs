//! Blocking receivers for process networks.
//!
//! All channels of a process network share a single [`ProcessMonitor`]: one
//! lock and one condition variable. Keeping the blocking state of every
//! channel under the same lock lets the monitor decide atomically whether
//! all live processes are blocked with no wait able to complete, which is
//! how deadlocks are detected.
//!
//! When every process is blocked and at least one of them is a writer
//! waiting for room in a bounded queue, the deadlock is artificial: the
//! monitor doubles the capacity of the smallest such queue and lets the
//! writer proceed. Otherwise the deadlock is real and all waits are
//! released with [`ReceiverError::Aborted`].

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};
use slab::Slab;
use tracing::debug;

use crate::error::{ActionError, BlockedOperation, DeadlockInfo};
use crate::manager::Interrupt;
use crate::receiver::{PortAddress, Receiver, ReceiverError};
use crate::token::Token;

/// Description of the two ends of a channel.
#[derive(Clone, Debug)]
pub(crate) struct ChannelEnds {
    /// Process index of the producer, if the producer is a process.
    pub(crate) producer: Option<usize>,
    /// Process index of the consumer, if the consumer is a process.
    pub(crate) consumer: Option<usize>,
    /// Name of the producing actor.
    pub(crate) producer_name: String,
    /// Name of the consuming actor.
    pub(crate) consumer_name: String,
    /// Display name of the channel.
    pub(crate) name: String,
}

enum Buffer {
    Slot(Option<Token>),
    Queue {
        tokens: VecDeque<Token>,
        capacity: usize,
    },
}

impl Buffer {
    fn len(&self) -> usize {
        match self {
            Self::Slot(slot) => usize::from(slot.is_some()),
            Self::Queue { tokens, .. } => tokens.len(),
        }
    }

    fn has_room(&self) -> bool {
        match self {
            Self::Slot(slot) => slot.is_none(),
            Self::Queue { tokens, capacity } => tokens.len() < *capacity,
        }
    }
}

struct Channel {
    ends: ChannelEnds,
    producer_done: bool,
    consumer_done: bool,
    buffer: Buffer,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum WaitKind {
    /// A reader waits for a token.
    Token,
    /// A writer waits for room in the buffer.
    Room,
    /// A rendezvous writer waits for its token to be taken.
    Taken,
}

#[derive(Copy, Clone, Debug)]
struct Wait {
    channel: usize,
    kind: WaitKind,
}

enum Readiness {
    Ready,
    Failed(ReceiverError),
    Pending,
}

#[derive(Default)]
struct MonitorState {
    channels: Slab<Channel>,
    waits: Slab<Wait>,
    /// Number of live processes, or `None` if detection is disabled.
    active: Option<usize>,
    aborted: bool,
    deadlock: Option<Vec<DeadlockInfo>>,
    failure: Option<ActionError>,
}

impl MonitorState {
    fn readiness(&self, channel: usize, kind: WaitKind) -> Readiness {
        let ch = &self.channels[channel];
        let ready = match kind {
            WaitKind::Token => ch.buffer.len() != 0,
            WaitKind::Room => ch.buffer.has_room(),
            WaitKind::Taken => ch.buffer.len() == 0,
        };
        if ready {
            return Readiness::Ready;
        }
        if self.aborted {
            return Readiness::Failed(ReceiverError::Aborted);
        }
        let peer_done = match kind {
            WaitKind::Token => ch.producer_done,
            WaitKind::Room | WaitKind::Taken => ch.consumer_done,
        };
        if peer_done {
            return Readiness::Failed(ReceiverError::Terminated);
        }

        Readiness::Pending
    }
}

/// Shared lock, condition variable and deadlock detector of a process
/// network.
pub(crate) struct ProcessMonitor {
    state: Mutex<MonitorState>,
    condvar: Condvar,
    max_capacity: usize,
}

impl ProcessMonitor {
    /// Creates a monitor. Queues never grow beyond `max_capacity`.
    pub(crate) fn new(max_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MonitorState::default()),
            condvar: Condvar::new(),
            max_capacity,
        })
    }

    /// Creates a rendezvous channel.
    pub(crate) fn rendezvous(
        self: &Arc<Self>,
        ends: ChannelEnds,
        address: Option<PortAddress>,
    ) -> Rendezvous {
        Rendezvous(self.add_channel(ends, Buffer::Slot(None), address))
    }

    /// Creates a blocking queue with the given initial capacity.
    pub(crate) fn blocking_fifo(
        self: &Arc<Self>,
        ends: ChannelEnds,
        capacity: usize,
        address: Option<PortAddress>,
    ) -> BlockingFifo {
        let buffer = Buffer::Queue {
            tokens: VecDeque::with_capacity(capacity),
            capacity,
        };

        BlockingFifo(self.add_channel(ends, buffer, address))
    }

    fn add_channel(
        self: &Arc<Self>,
        ends: ChannelEnds,
        buffer: Buffer,
        address: Option<PortAddress>,
    ) -> ChannelHandle {
        let key = self.state.lock().channels.insert(Channel {
            ends,
            producer_done: false,
            consumer_done: false,
            buffer,
        });

        ChannelHandle {
            monitor: self.clone(),
            key,
            address,
        }
    }

    /// Enables deadlock detection for `processes` live processes and clears
    /// the outcome of any previous execution.
    pub(crate) fn start(&self, processes: usize) {
        let mut state = self.state.lock();
        state.active = Some(processes);
        state.aborted = false;
        state.deadlock = None;
        state.failure = None;
        for (_, channel) in state.channels.iter_mut() {
            channel.producer_done = false;
            channel.consumer_done = false;
        }
    }

    /// Records the end of a process and releases its peers.
    pub(crate) fn process_finished(&self, process: usize) {
        let mut state = self.state.lock();
        for (_, channel) in state.channels.iter_mut() {
            if channel.ends.producer == Some(process) {
                channel.producer_done = true;
            }
            if channel.ends.consumer == Some(process) {
                channel.consumer_done = true;
            }
        }
        if let Some(active) = state.active.as_mut() {
            *active = active.saturating_sub(1);
        }
        self.condvar.notify_all();
        self.detect_deadlock(&mut state);
    }

    /// Releases all waits with [`ReceiverError::Aborted`].
    pub(crate) fn abort(&self) {
        let mut state = self.state.lock();
        state.aborted = true;
        self.condvar.notify_all();
    }

    /// Returns the error that ended the network, if any.
    pub(crate) fn take_outcome(&self) -> Result<(), ActionError> {
        let mut state = self.state.lock();
        if let Some(failure) = state.failure.take() {
            return Err(failure);
        }
        if let Some(blocked) = state.deadlock.take() {
            return Err(ActionError::Deadlock(blocked));
        }

        Ok(())
    }

    /// Discards the content of all channels.
    pub(crate) fn clear(&self) {
        let mut state = self.state.lock();
        for (_, channel) in state.channels.iter_mut() {
            match &mut channel.buffer {
                Buffer::Slot(slot) => *slot = None,
                Buffer::Queue { tokens, .. } => tokens.clear(),
            }
        }
    }

    /// Blocks until a wait of the given kind on `channel` can complete.
    fn block_on(
        &self,
        state: &mut MutexGuard<'_, MonitorState>,
        channel: usize,
        kind: WaitKind,
    ) -> Result<(), ReceiverError> {
        let mut wait_key = None;
        let result = loop {
            match state.readiness(channel, kind) {
                Readiness::Ready => break Ok(()),
                Readiness::Failed(e) => break Err(e),
                Readiness::Pending => {
                    if wait_key.is_none() {
                        wait_key = Some(state.waits.insert(Wait { channel, kind }));
                        // Resolving a deadlock may have made this wait ready.
                        self.detect_deadlock(state);
                        continue;
                    }
                    self.condvar.wait(state);
                }
            }
        };
        if let Some(key) = wait_key {
            state.waits.remove(key);
        }

        result
    }

    /// Resolves the deadlock, if all live processes are blocked and none of
    /// their waits can complete.
    fn detect_deadlock(&self, state: &mut MonitorState) {
        let Some(active) = state.active else {
            return;
        };
        if active == 0 || state.aborted || state.waits.len() < active {
            return;
        }
        let stuck = state.waits.iter().all(|(_, wait)| {
            matches!(state.readiness(wait.channel, wait.kind), Readiness::Pending)
        });
        if !stuck {
            return;
        }

        // Grow the smallest full queue with a blocked writer, if any.
        let smallest_full = state
            .waits
            .iter()
            .filter(|(_, wait)| wait.kind == WaitKind::Room)
            .filter_map(|(_, wait)| match &state.channels[wait.channel].buffer {
                Buffer::Queue { capacity, .. } => Some((*capacity, wait.channel)),
                Buffer::Slot(_) => None,
            })
            .min();

        if let Some((capacity, channel)) = smallest_full {
            let new_capacity = capacity.saturating_mul(2).max(1);
            let ch = &mut state.channels[channel];
            if new_capacity > self.max_capacity {
                state.failure = Some(ActionError::QueueCapacityExceeded {
                    channel: ch.ends.name.clone(),
                    capacity: self.max_capacity,
                });
                state.aborted = true;
            } else {
                debug!(
                    channel = %ch.ends.name,
                    capacity = new_capacity,
                    "growing queue to resolve an artificial deadlock"
                );
                if let Buffer::Queue { capacity, .. } = &mut ch.buffer {
                    *capacity = new_capacity;
                }
            }
            self.condvar.notify_all();

            return;
        }

        let mut blocked: Vec<DeadlockInfo> = state
            .waits
            .iter()
            .map(|(_, wait)| {
                let ends = &state.channels[wait.channel].ends;
                let (actor, operation) = match wait.kind {
                    WaitKind::Token => (&ends.consumer_name, BlockedOperation::Get),
                    WaitKind::Room | WaitKind::Taken => {
                        (&ends.producer_name, BlockedOperation::Put)
                    }
                };
                DeadlockInfo {
                    actor: actor.clone(),
                    channel: ends.name.clone(),
                    operation,
                }
            })
            .collect();
        blocked.sort_by(|a, b| a.actor.cmp(&b.actor));
        debug!(blocked = blocked.len(), "process network deadlocked");

        state.deadlock = Some(blocked);
        state.aborted = true;
        self.condvar.notify_all();
    }
}

impl Interrupt for ProcessMonitor {
    fn interrupt(&self) {
        self.abort();
    }
}

impl fmt::Debug for ProcessMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ProcessMonitor")
            .field("channels", &state.channels.len())
            .field("blocked", &state.waits.len())
            .field("active", &state.active)
            .field("aborted", &state.aborted)
            .finish_non_exhaustive()
    }
}

/// Handle to one channel of a monitor.
struct ChannelHandle {
    monitor: Arc<ProcessMonitor>,
    key: usize,
    address: Option<PortAddress>,
}

impl ChannelHandle {
    fn standalone(buffer: Buffer, max_capacity: usize) -> Self {
        let ends = ChannelEnds {
            producer: None,
            consumer: None,
            producer_name: String::from("producer"),
            consumer_name: String::from("consumer"),
            name: String::from("channel"),
        };

        ProcessMonitor::new(max_capacity).add_channel(ends, buffer, None)
    }

    fn put(&self, token: Token) -> Result<(), ReceiverError> {
        let monitor = &*self.monitor;
        let mut state = monitor.state.lock();
        monitor.block_on(&mut state, self.key, WaitKind::Room)?;

        let is_slot = match &mut state.channels[self.key].buffer {
            Buffer::Slot(slot) => {
                *slot = Some(token);
                true
            }
            Buffer::Queue { tokens, .. } => {
                tokens.push_back(token);
                false
            }
        };
        monitor.condvar.notify_all();
        if !is_slot {
            return Ok(());
        }

        let taken = monitor.block_on(&mut state, self.key, WaitKind::Taken);
        if taken.is_err() {
            // Withdraw the token so that it is never delivered.
            if let Buffer::Slot(slot) = &mut state.channels[self.key].buffer {
                *slot = None;
            }
        }

        taken
    }

    fn get(&self) -> Result<Token, ReceiverError> {
        let monitor = &*self.monitor;
        let mut state = monitor.state.lock();
        monitor.block_on(&mut state, self.key, WaitKind::Token)?;

        let token = match &mut state.channels[self.key].buffer {
            Buffer::Slot(slot) => slot.take(),
            Buffer::Queue { tokens, .. } => tokens.pop_front(),
        };
        monitor.condvar.notify_all();

        token.ok_or(ReceiverError::NoToken)
    }

    fn len(&self) -> usize {
        self.monitor.state.lock().channels[self.key].buffer.len()
    }

    fn has_room_for(&self, n: usize) -> bool {
        match &self.monitor.state.lock().channels[self.key].buffer {
            Buffer::Slot(slot) => n == 0 || (n == 1 && slot.is_none()),
            Buffer::Queue { tokens, capacity } => tokens.len() + n <= *capacity,
        }
    }

    fn capacity(&self) -> usize {
        match &self.monitor.state.lock().channels[self.key].buffer {
            Buffer::Slot(_) => 0,
            Buffer::Queue { capacity, .. } => *capacity,
        }
    }

    fn clear(&self) {
        match &mut self.monitor.state.lock().channels[self.key].buffer {
            Buffer::Slot(slot) => *slot = None,
            Buffer::Queue { tokens, .. } => tokens.clear(),
        }
    }
}

impl fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("key", &self.key)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// A zero-capacity channel synchronizing a producer with a consumer.
///
/// A `put` blocks until the token has been taken by a `get`, and a `get`
/// blocks until a token is offered. Both return
/// [`ReceiverError::Terminated`] once the peer process has ended, and
/// [`ReceiverError::Aborted`] when the network is stopped or deadlocked.
#[derive(Debug)]
pub struct Rendezvous(ChannelHandle);

impl Rendezvous {
    /// Creates a free-standing rendezvous channel.
    ///
    /// Such a channel does not take part in deadlock detection.
    pub fn new() -> Self {
        Self(ChannelHandle::standalone(Buffer::Slot(None), 0))
    }
}

impl Default for Rendezvous {
    fn default() -> Self {
        Self::new()
    }
}

/// A bounded FIFO queue that blocks instead of failing.
///
/// Inside a process network the capacity may grow to resolve artificial
/// deadlocks.
#[derive(Debug)]
pub struct BlockingFifo(ChannelHandle);

impl BlockingFifo {
    /// Creates a free-standing blocking queue with a fixed capacity.
    ///
    /// Such a queue does not take part in deadlock detection.
    ///
    /// # Panics
    ///
    /// This will panic if the capacity is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "a blocking queue needs a non-zero capacity");

        let buffer = Buffer::Queue {
            tokens: VecDeque::with_capacity(capacity),
            capacity,
        };

        Self(ChannelHandle::standalone(buffer, capacity))
    }
}

macro_rules! impl_receiver {
    ($ty:ty) => {
        impl Receiver for $ty {
            fn put(&self, token: Token) -> Result<(), ReceiverError> {
                self.0.put(token)
            }

            fn get(&self) -> Result<Token, ReceiverError> {
                self.0.get()
            }

            fn has_tokens(&self, n: usize) -> bool {
                self.0.len() >= n
            }

            fn has_room_for(&self, n: usize) -> bool {
                self.0.has_room_for(n)
            }

            fn len(&self) -> usize {
                self.0.len()
            }

            fn capacity(&self) -> Option<usize> {
                Some(self.0.capacity())
            }

            fn clear(&self) {
                self.0.clear()
            }

            fn address(&self) -> Option<&PortAddress> {
                self.0.address.as_ref()
            }
        }
    };
}

impl_receiver!(Rendezvous);
impl_receiver!(BlockingFifo);
