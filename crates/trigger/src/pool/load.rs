//! Load tracking for the worker pool
//!
//! Counters are updated with relaxed atomics; readers get a best-effort
//! snapshot, which is all logging and tests need.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// Point-in-time view of pool activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Units accepted but not yet picked up by a worker
    pub queued: usize,
    /// Units currently running
    pub in_flight: usize,
    /// Units that ran to completion (including panicked ones)
    pub completed: u64,
    /// Units that panicked
    pub panicked: u64,
    /// Submissions refused because the pool was saturated or closed
    pub rejected: u64,
}

/// Live load counters shared between the pool handle and its workers
pub struct PoolLoad {
    capacity: usize,
    queued: AtomicUsize,
    in_flight: AtomicUsize,
    completed: AtomicU64,
    panicked: AtomicU64,
    rejected: AtomicU64,
}

impl PoolLoad {
    /// Create counters for a queue of the given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queued: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Record that a unit is about to be enqueued
    pub fn enqueued(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    /// Undo [`enqueued`](Self::enqueued) after a failed enqueue
    pub fn enqueue_failed(&self) {
        self.queued.fetch_sub(1, Ordering::Relaxed);
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a submission refused before reaching the queue
    pub fn rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record that a worker picked a unit off the queue
    pub fn started(&self) {
        self.queued.fetch_sub(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    /// Record that a unit finished
    pub fn finished(&self, panicked: bool) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        self.completed.fetch_add(1, Ordering::Relaxed);
        if panicked {
            self.panicked.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Queue capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free queue slots
    pub fn available_slots(&self) -> usize {
        self.capacity
            .saturating_sub(self.queued.load(Ordering::Relaxed))
    }

    /// Snapshot of all counters
    pub fn snapshot(&self) -> PoolStats {
        PoolStats {
            queued: self.queued.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
