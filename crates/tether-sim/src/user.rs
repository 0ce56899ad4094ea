//! Simulated operators and the intent bursts they produce.
//!
//! Each user owns a disjoint set of rows (one status field per row) and
//! edits them in bursts. Inside a burst consecutive intents are strictly
//! closer than the quiet window; between two bursts of one user there is
//! strictly more than the quiet window. Per key, a burst is therefore
//! exactly one debounce firing.

use serde::{Deserialize, Serialize};
use tether_core::SyncKey;

use crate::rng::DeterministicRng;

pub type UserId = usize;

/// Shape of the workload for one seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    pub users: usize,
    pub keys_per_user: usize,
    pub bursts_per_user: usize,
    /// Longest burst, in intents.
    pub max_burst_len: u64,
    /// Quiet window the committer under test uses.
    pub quiet_ms: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            users: 3,
            keys_per_user: 2,
            bursts_per_user: 6,
            max_burst_len: 5,
            quiet_ms: 600,
        }
    }
}

/// Row key edited by the simulated operators.
#[must_use]
pub fn row_key(row: usize) -> SyncKey {
    SyncKey::new("victim", row).with_field("status")
}

/// One intent, ready to be scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedIntent {
    pub at_ms: u64,
    pub user: UserId,
    pub key: SyncKey,
    /// Globally unique and increasing with `at_ms`.
    pub value: u64,
    pub burst: usize,
}

/// Intents of one burst on one key, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Burst {
    pub user: UserId,
    pub key: SyncKey,
    pub values: Vec<u64>,
}

impl Burst {
    /// The value a correct committer sends for this burst.
    #[must_use]
    pub fn last_value(&self) -> Option<u64> {
        self.values.last().copied()
    }
}

/// Every intent of one seed, sorted by time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentPlan {
    pub intents: Vec<PlannedIntent>,
    pub bursts: Vec<Burst>,
}

impl IntentPlan {
    /// Build the plan. Requires `quiet_ms >= 2` so that "closer than" and
    /// "further than" the window are both expressible in whole milliseconds.
    #[must_use]
    pub fn generate(config: &WorkloadConfig, rng: &mut DeterministicRng) -> Self {
        let quiet = config.quiet_ms.max(2);
        let keys_per_user = u64::try_from(config.keys_per_user.max(1)).unwrap_or(u64::MAX);
        let mut bursts = Vec::new();
        let mut intents = Vec::new();

        for user in 0..config.users {
            let mut cursor = rng.next_bounded(quiet);
            for _ in 0..config.bursts_per_user {
                let slot = usize::try_from(rng.next_bounded(keys_per_user)).unwrap_or(0);
                let key = row_key(user * config.keys_per_user.max(1) + slot);
                let burst = bursts.len();
                bursts.push(Burst {
                    user,
                    key: key.clone(),
                    values: Vec::new(),
                });

                let len = rng.next_inclusive(1, config.max_burst_len.max(1));
                for i in 0..len {
                    if i > 0 {
                        cursor += rng.next_inclusive(1, quiet - 1);
                    }
                    intents.push(PlannedIntent {
                        at_ms: cursor,
                        user,
                        key: key.clone(),
                        value: 0,
                        burst,
                    });
                }
                cursor += rng.next_inclusive(quiet + 1, quiet * 3);
            }
        }

        intents.sort_by_key(|intent| (intent.at_ms, intent.user));
        for (value, intent) in (1_u64..).zip(intents.iter_mut()) {
            intent.value = value;
            bursts[intent.burst].values.push(value);
        }

        Self { intents, bursts }
    }

    /// Time of the last intent, 0 for an empty plan.
    #[must_use]
    pub fn last_at_ms(&self) -> u64 {
        self.intents.last().map_or(0, |intent| intent.at_ms)
    }

    pub fn bursts_for<'a>(&'a self, key: &'a SyncKey) -> impl Iterator<Item = &'a Burst> + 'a {
        self.bursts.iter().filter(move |burst| &burst.key == key)
    }

    /// Last planned value for `key`.
    #[must_use]
    pub fn last_value_for(&self, key: &SyncKey) -> Option<u64> {
        self.intents
            .iter()
            .rev()
            .find(|intent| &intent.key == key)
            .map(|intent| intent.value)
    }

    /// Every key that appears in the plan, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<SyncKey> {
        let mut keys: Vec<SyncKey> = self.bursts.iter().map(|burst| burst.key.clone()).collect();
        keys.sort();
        keys.dedup();
        keys
    }
}
