//! Send-state machine for one exchange.
//!
//! The state only moves forward along `Ready → HeadersSent → BodySent`, and
//! may skip straight from `Ready` to `BodySent`. Every move is a single
//! compare-and-exchange, so among concurrent senders exactly one observes a
//! successful transition out of `Ready`.

#[cfg(loom)]
use loom::sync::atomic::{AtomicU8, Ordering};
#[cfg(not(loom))]
use std::sync::atomic::{AtomicU8, Ordering};

/// Progress of an exchange's outbound message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum SendState {
    /// Nothing sent; headers may still change.
    Ready = 0,
    /// Headers emitted; body frames may follow.
    HeadersSent = 1,
    /// The message is complete; further writes are refused.
    BodySent = 2,
}

impl SendState {
    /// Returns `true` if moving from `self` to `next` goes forward.
    #[must_use]
    pub fn can_advance_to(self, next: SendState) -> bool { next > self }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Ready,
            1 => Self::HeadersSent,
            _ => Self::BodySent,
        }
    }
}

/// Atomic cell holding a [`SendState`].
#[derive(Debug)]
pub struct SendStateCell(AtomicU8);

impl SendStateCell {
    /// A cell in the `Ready` state.
    #[must_use]
    pub fn new() -> Self { Self(AtomicU8::new(SendState::Ready as u8)) }

    /// Current state.
    #[must_use]
    pub fn load(&self) -> SendState { SendState::from_u8(self.0.load(Ordering::Acquire)) }

    /// Move from `from` to `to` if the cell still holds `from`.
    ///
    /// Returns `true` only for the caller that performed the move. A move
    /// that would not go forward is refused without touching the cell.
    pub fn transition(&self, from: SendState, to: SendState) -> bool {
        if !from.can_advance_to(to) {
            return false;
        }
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for SendStateCell {
    fn default() -> Self { Self::new() }
}
