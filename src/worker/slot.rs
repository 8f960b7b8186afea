//! Single-capacity test slot enforcing one pipeline per agent.

use std::sync::atomic::{AtomicU8, Ordering};

const IDLE: u8 = 0;
const BUSY: u8 = 1;

/// Two-state flag claimed with a non-blocking compare-and-swap. Probing or
/// claiming the slot never blocks a connection handler; releasing is a plain
/// store once the pipeline finishes.
#[derive(Debug, Default)]
pub struct TestSlot {
    state: AtomicU8,
}

impl TestSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to move Idle → Busy. False when the slot is already taken.
    pub fn try_claim(&self) -> bool {
        self.state
            .compare_exchange(IDLE, BUSY, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Return the slot to Idle.
    pub fn release(&self) {
        self.state.store(IDLE, Ordering::Release);
    }

    pub fn is_idle(&self) -> bool {
        self.state.load(Ordering::Acquire) == IDLE
    }
}
