//! Command sequence counter.

use std::sync::atomic::{AtomicU8, Ordering};

/// 8-bit wrapping counter correlating commands with their replies.
///
/// The receiver task is the only writer; the dispatcher reads the value to
/// stamp outbound commands, so the advance must be visible to the next
/// read. A reply from a previous wrap cannot collide with the current one
/// because the 45 second exchange window is far shorter than 256 exchanges
/// worth of late delivery.
#[derive(Debug, Default)]
pub struct SequenceCounter(AtomicU8);

impl SequenceCounter {
    pub fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    /// Value stamped on the next outbound command and expected on its reply.
    pub fn current(&self) -> u8 {
        self.0.load(Ordering::Acquire)
    }

    /// Advance after a complete reply has been delivered, wrapping modulo 256.
    pub fn advance(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }
}
