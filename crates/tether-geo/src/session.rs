use std::hash::Hash;

use tether_core::{GenerationToken, RaceGuard};

use crate::address::AddressFields;
use crate::fence::Coordinate;
use crate::geocoder::Geocoder;
use crate::resolver::{CandidateResolver, Resolution};
use crate::strategy::Strategy;

/// One resolution attempt for one owner (a location form).
///
/// Beginning a session bumps the owner's lookup generation, so any older
/// session for the same owner becomes stale. Its generation counter is
/// independent from the save pipeline's.
#[derive(Debug)]
pub struct LookupSession<K> {
    owner: K,
    token: GenerationToken,
    strategies: &'static [Strategy],
    accepted: Option<Coordinate>,
}

impl<K: Eq + Hash + Clone> LookupSession<K> {
    #[must_use]
    pub fn begin(guard: &RaceGuard<K>, owner: K) -> Self {
        let token = guard.begin_attempt(&owner);
        Self {
            owner,
            token,
            strategies: &Strategy::CASCADE,
            accepted: None,
        }
    }

    #[must_use]
    pub const fn owner(&self) -> &K {
        &self.owner
    }

    #[must_use]
    pub const fn token(&self) -> GenerationToken {
        self.token
    }

    #[must_use]
    pub const fn strategies(&self) -> &'static [Strategy] {
        self.strategies
    }

    #[must_use]
    pub const fn accepted(&self) -> Option<Coordinate> {
        self.accepted
    }

    /// Still the latest session for its owner.
    #[must_use]
    pub fn is_current(&self, guard: &RaceGuard<K>) -> bool {
        guard.is_current(&self.owner, self.token)
    }

    /// Run the cascade and remember the accepted coordinate, if any.
    pub async fn run<G>(&mut self, resolver: &CandidateResolver<G>, fields: &AddressFields) -> Resolution
    where
        G: Geocoder + ?Sized,
    {
        let resolution = resolver.resolve_with(self.strategies, fields).await;
        self.accepted = resolution.coordinate();
        resolution
    }
}
