//! One-shot flags shared between the event loop, handlers and the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A flag that can be raised once and never lowered.
#[derive(Debug, Clone, Default)]
pub struct Signal(Arc<AtomicBool>);

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Signals owned by one device handle.
#[derive(Debug, Clone, Default)]
pub struct Signals {
    /// The kernel driver finished its initialization dialog.
    pub handshake_done: Signal,
    /// Every captured report has been injected.
    pub replay_done: Signal,
    /// Stop after the current loop iteration.
    pub cancel: Signal,
}

impl Signals {
    pub fn new() -> Self {
        Self::default()
    }
}
