use parking_lot::Mutex;

use crate::receiver::{PortAddress, Receiver, ReceiverError};
use crate::token::Token;

/// A single-slot receiver that keeps only the most recent token.
///
/// A `put` always succeeds and overwrites any unread token.
#[derive(Debug, Default)]
pub struct Mailbox {
    slot: Mutex<Option<Token>>,
    address: Option<PortAddress>,
}

impl Mailbox {
    /// Creates an empty mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty mailbox bound to a port channel.
    pub fn with_address(address: PortAddress) -> Self {
        Self {
            slot: Mutex::new(None),
            address: Some(address),
        }
    }

    /// Returns a copy of the held token without consuming it.
    pub fn peek(&self) -> Option<Token> {
        self.slot.lock().clone()
    }
}

impl Receiver for Mailbox {
    fn put(&self, token: Token) -> Result<(), ReceiverError> {
        *self.slot.lock() = Some(token);

        Ok(())
    }

    fn get(&self) -> Result<Token, ReceiverError> {
        self.slot.lock().take().ok_or(ReceiverError::NoToken)
    }

    fn has_tokens(&self, n: usize) -> bool {
        n <= self.len()
    }

    fn has_room_for(&self, _: usize) -> bool {
        true
    }

    fn len(&self) -> usize {
        usize::from(self.slot.lock().is_some())
    }

    fn capacity(&self) -> Option<usize> {
        Some(1)
    }

    fn clear(&self) {
        *self.slot.lock() = None;
    }

    fn address(&self) -> Option<&PortAddress> {
        self.address.as_ref()
    }
}
