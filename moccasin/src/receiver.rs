//! Communication endpoints.
//!
//! Every channel of an input port is bound to exactly one [`Receiver`]. The
//! director of the composite that contains the port decides which discipline
//! is used:
//!
//! * [`Mailbox`]: a single-slot receiver whose content is overwritten by each
//!   new token,
//! * [`Fifo`]: a bounded or unbounded queue that fails fast with
//!   [`ReceiverError::NoRoom`] and [`ReceiverError::NoToken`],
//! * [`BlockingFifo`]: a bounded queue that suspends the calling thread
//!   instead of failing,
//! * [`Rendezvous`]: a zero-capacity channel where each `put` blocks until
//!   the token is taken by a matching `get`, and vice versa.
//!
//! Receivers are shared between the producing and the consuming actor
//! through `Arc<dyn Receiver>` handles, so all their operations take `&self`.

mod fifo;
mod mailbox;
mod process;

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::token::Token;

pub use fifo::Fifo;
pub use mailbox::Mailbox;
pub use process::{BlockingFifo, Rendezvous};

pub(crate) use process::{ChannelEnds, ProcessMonitor};

/// A communication endpoint bound to one channel of an input port.
pub trait Receiver: Send + Sync + fmt::Debug {
    /// Deposits a token.
    fn put(&self, token: Token) -> Result<(), ReceiverError>;

    /// Removes and returns the oldest token.
    fn get(&self) -> Result<Token, ReceiverError>;

    /// Checks whether at least `n` tokens are available.
    fn has_tokens(&self, n: usize) -> bool;

    /// Checks whether `n` more tokens can be deposited without failing or
    /// blocking.
    fn has_room_for(&self, n: usize) -> bool;

    /// Returns the number of tokens currently held.
    fn len(&self) -> usize;

    /// Returns the capacity of the receiver, or `None` if it is unbounded.
    fn capacity(&self) -> Option<usize>;

    /// Discards all held tokens.
    fn clear(&self);

    /// Returns the address of the port channel this receiver is bound to.
    fn address(&self) -> Option<&PortAddress>;

    /// Checks whether a token is available.
    fn has_token(&self) -> bool {
        self.has_tokens(1)
    }

    /// Checks whether a token can be deposited without failing or blocking.
    fn has_room(&self) -> bool {
        self.has_room_for(1)
    }

    /// Checks whether the receiver holds no token.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Weak reference from a receiver to the port channel it belongs to.
///
/// This is a lookup key only and does not keep the actor alive.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PortAddress {
    actor: Arc<str>,
    port: Arc<str>,
    channel: usize,
}

impl PortAddress {
    /// Creates an address.
    pub fn new(actor: impl Into<Arc<str>>, port: impl Into<Arc<str>>, channel: usize) -> Self {
        Self {
            actor: actor.into(),
            port: port.into(),
            channel,
        }
    }

    /// Returns the name of the owning actor.
    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// Returns the name of the port.
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Returns the channel index.
    pub fn channel(&self) -> usize {
        self.channel
    }
}

impl fmt::Display for PortAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}[{}]", self.actor, self.port, self.channel)
    }
}

/// Error returned by receiver operations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ReceiverError {
    /// The receiver is full and its discipline does not allow blocking.
    NoRoom,
    /// The receiver is empty and its discipline does not allow blocking.
    NoToken,
    /// The peer process has ended and the operation can never complete.
    Terminated,
    /// The operation was released by a stop request or a deadlock abort.
    Aborted,
}

impl fmt::Display for ReceiverError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRoom => write!(fmt, "no room left in the receiver"),
            Self::NoToken => write!(fmt, "no token available in the receiver"),
            Self::Terminated => write!(fmt, "the peer process has terminated"),
            Self::Aborted => write!(fmt, "the operation was aborted"),
        }
    }
}

impl Error for ReceiverError {}
