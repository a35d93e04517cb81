//! First-error-wins capture shared by concurrent producers
//!
//! Sub-window handlers record failures here; the orchestrator peeks at it
//! between ticks and once more after joining them. Only the first recorded
//! error is kept.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::OnceLock;

use tracing::trace;

/// Single-winner error cell
///
/// Recording never blocks and never panics, whatever the number of
/// producers and whether or not the slot has been closed.
#[derive(Debug)]
pub struct ErrorSlot<E> {
    first: OnceLock<E>,
    closed: AtomicBool,
    dropped: AtomicUsize,
}

impl<E> Default for ErrorSlot<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> ErrorSlot<E> {
    pub fn new() -> Self {
        Self {
            first: OnceLock::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicUsize::new(0),
        }
    }

    /// Record a failure. Ignored when an error is already held or the slot
    /// is closed.
    pub fn record(&self, err: E) {
        if self.closed.load(Ordering::Acquire) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!("error recorded after close, dropped");
            return;
        }
        if self.first.set(err).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Stop accepting errors. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Errors that were not kept, either because one was already held or
    /// because they arrived after close
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<E: Clone> ErrorSlot<E> {
    /// Non-blocking look at the recorded error, if any
    pub fn peek(&self) -> Option<E> {
        self.first.get().cloned()
    }
}
