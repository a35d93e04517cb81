//! Lock service used to deduplicate firings

use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Minimum time between two sweeps of expired locks
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Lock service errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    /// The lock backend failed
    #[error("lock backend error: {0}")]
    Backend(String),
}

/// Expiring mutual exclusion keyed by string
///
/// The acquire/release protocol of a real backend (e.g. set-if-absent with
/// an expiry) is up to the implementation.
#[async_trait]
pub trait LockService: Send + Sync {
    /// Take `key` for `owner` unless someone else holds an unexpired lock.
    /// Returns whether the lock was taken.
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, LockError>;

    /// Release `key` if `owner` still holds it
    async fn release(&self, key: &str, owner: &str) -> Result<(), LockError>;
}

struct Held {
    owner: String,
    expires_at: Instant,
}

/// In-process lock service
///
/// Expiry is measured with tokio's clock, so paused-time tests can move
/// past a TTL. Every firing takes a fresh key; expired entries are swept
/// from [`try_acquire`](LockService::try_acquire) at most once per minute.
pub struct InMemoryLockService {
    locks: DashMap<String, Held>,
    next_sweep: Mutex<Instant>,
}

impl Default for InMemoryLockService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLockService {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
            next_sweep: Mutex::new(Instant::now() + SWEEP_INTERVAL),
        }
    }

    /// Whether `key` is held and unexpired
    pub fn is_locked(&self, key: &str) -> bool {
        self.locks
            .get(key)
            .is_some_and(|held| held.expires_at > Instant::now())
    }

    /// Drop expired entries, returning how many went
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.locks.len();
        self.locks.retain(|_, held| held.expires_at > now);
        before - self.locks.len()
    }

    fn sweep_if_due(&self, now: Instant) {
        {
            let mut next = self.next_sweep.lock();
            if now < *next {
                return;
            }
            *next = now + SWEEP_INTERVAL;
        }

        let purged = self.purge_expired();
        if purged > 0 {
            debug!(purged, held = self.locks.len(), "expired locks swept");
        }
    }
}

#[async_trait]
impl LockService for InMemoryLockService {
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, LockError> {
        let now = Instant::now();
        // Must run before an entry guard is held: retain locks every shard
        self.sweep_if_due(now);

        let held = Held {
            owner: owner.to_string(),
            expires_at: now + ttl,
        };

        match self.locks.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().expires_at > now {
                    return Ok(false);
                }
                entry.insert(held);
                Ok(true)
            }
            Entry::Vacant(entry) => {
                entry.insert(held);
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str, owner: &str) -> Result<(), LockError> {
        self.locks.remove_if(key, |_, held| held.owner == owner);
        Ok(())
    }
}
