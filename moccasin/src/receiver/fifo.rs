use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::receiver::{PortAddress, Receiver, ReceiverError};
use crate::token::Token;

/// A non-blocking FIFO queue, either bounded or unbounded.
///
/// Operations fail fast: `put` on a full queue returns
/// [`ReceiverError::NoRoom`] and `get` on an empty queue returns
/// [`ReceiverError::NoToken`]. This is the receiver of the single-threaded
/// directors.
#[derive(Debug)]
pub struct Fifo {
    queue: Mutex<VecDeque<Token>>,
    capacity: Option<usize>,
    address: Option<PortAddress>,
}

impl Fifo {
    /// Creates a queue holding at most `capacity` tokens.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: Some(capacity),
            address: None,
        }
    }

    /// Creates a queue that grows as needed.
    pub fn unbounded() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            capacity: None,
            address: None,
        }
    }

    /// Binds the queue to a port channel.
    pub fn with_address(mut self, address: PortAddress) -> Self {
        self.address = Some(address);

        self
    }
}

impl Receiver for Fifo {
    fn put(&self, token: Token) -> Result<(), ReceiverError> {
        let mut queue = self.queue.lock();
        if let Some(capacity) = self.capacity {
            if queue.len() >= capacity {
                return Err(ReceiverError::NoRoom);
            }
        }
        queue.push_back(token);

        Ok(())
    }

    fn get(&self) -> Result<Token, ReceiverError> {
        self.queue.lock().pop_front().ok_or(ReceiverError::NoToken)
    }

    fn has_tokens(&self, n: usize) -> bool {
        self.queue.lock().len() >= n
    }

    fn has_room_for(&self, n: usize) -> bool {
        match self.capacity {
            Some(capacity) => self.queue.lock().len() + n <= capacity,
            None => true,
        }
    }

    fn len(&self) -> usize {
        self.queue.lock().len()
    }

    fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    fn clear(&self) {
        self.queue.lock().clear();
    }

    fn address(&self) -> Option<&PortAddress> {
        self.address.as_ref()
    }
}
