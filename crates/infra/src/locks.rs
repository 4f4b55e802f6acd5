//! Per-row exclusive locks.
//!
//! Optimistic stream versions catch lost updates; these locks stop them from
//! happening in the first place by serialising load-decide-commit cycles on the
//! same row. A caller names every row it will write up front and receives all
//! of them or none, so two multi-row operations can never deadlock.

use std::collections::BTreeSet;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;

use galley_core::{AggregateId, RestaurantId};

/// A lockable row: one aggregate stream of one restaurant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockKey {
    restaurant_id: RestaurantId,
    aggregate_id: AggregateId,
}

impl LockKey {
    pub fn new(restaurant_id: RestaurantId, aggregate_id: AggregateId) -> Self {
        Self {
            restaurant_id,
            aggregate_id,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("timed out after {0:?} waiting for row locks")]
    Timeout(Duration),

    #[error("lock registry poisoned")]
    Poisoned,
}

/// Registry of held row locks.
#[derive(Debug)]
pub struct RowLocks {
    held: Mutex<BTreeSet<LockKey>>,
    released: Condvar,
    timeout: Duration,
}

impl Default for RowLocks {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl RowLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            held: Mutex::new(BTreeSet::new()),
            released: Condvar::new(),
            timeout,
        }
    }

    /// Block until every key is free, then take them all.
    pub fn acquire(&self, keys: impl IntoIterator<Item = LockKey>) -> Result<RowLockGuard<'_>, LockError> {
        let keys: BTreeSet<LockKey> = keys.into_iter().collect();
        let deadline = Instant::now() + self.timeout;

        let mut held = self.held.lock().map_err(|_| LockError::Poisoned)?;
        while keys.iter().any(|k| held.contains(k)) {
            let now = Instant::now();
            if now >= deadline {
                return Err(LockError::Timeout(self.timeout));
            }
            let (guard, _) = self
                .released
                .wait_timeout(held, deadline - now)
                .map_err(|_| LockError::Poisoned)?;
            held = guard;
        }
        held.extend(keys.iter().copied());

        Ok(RowLockGuard { locks: self, keys })
    }

    pub fn is_held(&self, key: &LockKey) -> bool {
        self.held.lock().map(|held| held.contains(key)).unwrap_or(false)
    }
}

/// Releases its rows on drop.
#[derive(Debug)]
pub struct RowLockGuard<'a> {
    locks: &'a RowLocks,
    keys: BTreeSet<LockKey>,
}

impl RowLockGuard<'_> {
    pub fn keys(&self) -> impl Iterator<Item = &LockKey> {
        self.keys.iter()
    }
}

impl Drop for RowLockGuard<'_> {
    fn drop(&mut self) {
        // Release even if another holder panicked.
        let mut held = match self.locks.held.lock() {
            Ok(held) => held,
            Err(poisoned) => poisoned.into_inner(),
        };
        for key in &self.keys {
            held.remove(key);
        }
        drop(held);
        self.locks.released.notify_all();
    }
}
