//! Generation tokens for discarding stale completions.
//!
//! Every asynchronous attempt (a commit, a geocoding session) takes a token
//! from [`RaceGuard::begin_attempt`] before it suspends. When it resumes it
//! must ask [`RaceGuard::is_current`] before touching shared state: a newer
//! attempt for the same key makes every older token permanently stale, so a
//! slow response can never overwrite what a faster, newer one already wrote.
//! Outcomes therefore apply in generation order, not arrival order.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Proof of having started attempt number `generation` for some key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GenerationToken(u64);

impl GenerationToken {
    #[must_use]
    pub const fn generation(self) -> u64 {
        self.0
    }
}

impl fmt::Display for GenerationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

#[derive(Debug)]
struct GuardState<K> {
    current: HashMap<K, u64>,
    /// Highest generation ever held by a forgotten key.
    floor: u64,
}

/// Per-key monotonic generation counters.
#[derive(Debug)]
pub struct RaceGuard<K> {
    state: Mutex<GuardState<K>>,
}

impl<K> Default for RaceGuard<K> {
    fn default() -> Self {
        Self {
            state: Mutex::new(GuardState {
                current: HashMap::new(),
                floor: 0,
            }),
        }
    }
}

impl<K: Eq + Hash + Clone> RaceGuard<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new attempt for `key`, invalidating every earlier token.
    pub fn begin_attempt(&self, key: &K) -> GenerationToken {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let floor = state.floor;
        let slot = state.current.entry(key.clone()).or_insert(floor);
        *slot = slot.saturating_add(1);
        GenerationToken(*slot)
    }

    /// True only if `token` is the most recently issued token for `key`.
    #[must_use]
    pub fn is_current(&self, key: &K, token: GenerationToken) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.current.get(key).is_some_and(|g| *g == token.0)
    }

    /// Latest generation issued for `key`, if any attempt has begun.
    #[must_use]
    pub fn current(&self, key: &K) -> Option<u64> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.current.get(key).copied()
    }

    /// Drop bookkeeping for `key`. Outstanding tokens become stale and a
    /// later [`begin_attempt`](Self::begin_attempt) still issues a larger
    /// generation than any token this key ever had.
    pub fn forget(&self, key: &K) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(last) = state.current.remove(key) {
            state.floor = state.floor.max(last);
        }
    }

    /// Drop bookkeeping for every key.
    pub fn forget_all(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let highest = state.current.values().copied().max().unwrap_or(0);
        state.floor = state.floor.max(highest);
        state.current.clear();
    }

    /// Number of keys with at least one attempt on record.
    #[must_use]
    pub fn tracked_len(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.current.len()
    }
}
