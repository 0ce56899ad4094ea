//! Debounced coordinate autofill for location forms.
//!
//! Address edits for one owner are coalesced for the quiet window (700 ms by
//! default). Every edit bumps the owner's lookup generation and aborts any
//! lookup still running, so a cascade for an address the user has since
//! replaced never lands. When the window elapses a [`LookupSession`] begins
//! and the cascade runs in its own task; its result is applied only if the
//! session is still the owner's latest. Manual marker placement is a newer
//! attempt too, so a lookup that finishes after the user dragged the marker
//! is discarded.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tether_core::config::GeocodeConfig;
use tether_core::{DebounceCoalescer, GenerationToken, RaceGuard};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::address::AddressFields;
use crate::advisory::Advisory;
use crate::fence::Coordinate;
use crate::geocoder::Geocoder;
use crate::resolver::{CandidateResolver, Resolution};
use crate::session::LookupSession;

const EVENT_CAPACITY: usize = 64;

/// Identity of a location form (one address block).
pub trait OwnerKey: Eq + Hash + Clone + fmt::Display + fmt::Debug + Send + Sync + 'static {}

impl<T: Eq + Hash + Clone + fmt::Display + fmt::Debug + Send + Sync + 'static> OwnerKey for T {}

/// Published whenever an owner's coordinate or advisory changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoEvent<K> {
    pub owner: K,
    pub generation: u64,
    pub coordinate: Option<Coordinate>,
    pub advisory: Option<Advisory>,
}

#[derive(Debug, Default)]
struct OwnerState {
    coordinate: Option<Coordinate>,
    advisory: Option<Advisory>,
    task: Option<tokio::task::AbortHandle>,
}

impl OwnerState {
    fn abort_lookup(&mut self) -> bool {
        self.task.take().is_some_and(|task| {
            task.abort();
            true
        })
    }
}

#[derive(Debug)]
struct Shared<K, G: ?Sized> {
    owners: Mutex<HashMap<K, OwnerState>>,
    guard: RaceGuard<K>,
    events: broadcast::Sender<GeoEvent<K>>,
    resolver: CandidateResolver<G>,
}

impl<K: OwnerKey, G: Geocoder + ?Sized + 'static> Shared<K, G> {
    fn lock(&self) -> MutexGuard<'_, HashMap<K, OwnerState>> {
        self.owners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, owner: &K, state: &OwnerState) {
        let _ = self.events.send(GeoEvent {
            owner: owner.clone(),
            generation: self.guard.current(owner).unwrap_or(0),
            coordinate: state.coordinate,
            advisory: state.advisory,
        });
    }

    /// A newer edit arrived: the running lookup, if any, answers for an
    /// address that no longer exists.
    fn invalidate(&self, owner: &K) {
        let mut owners = self.lock();
        let _ = self.guard.begin_attempt(owner);
        let Some(state) = owners.get_mut(owner) else {
            return;
        };
        if state.abort_lookup() {
            debug!(owner = %owner, "address edited, running lookup aborted");
            if state.advisory == Some(Advisory::Finding) {
                state.advisory = None;
            }
            self.publish(owner, state);
        }
    }

    fn start_lookup(self: &Arc<Self>, owner: K, fields: AddressFields) {
        let mut session = LookupSession::begin(&self.guard, owner.clone());
        let token = session.token();
        {
            let mut owners = self.lock();
            let state = owners.entry(owner.clone()).or_default();
            if state.abort_lookup() {
                debug!(owner = %owner, "superseded lookup aborted");
            }
            state.advisory = Some(Advisory::Finding);
            self.publish(&owner, state);
        }

        let shared = Arc::clone(self);
        let task = tokio::spawn(async move {
            let resolution = session.run(&shared.resolver, &fields).await;
            shared.finish(&session, &resolution);
        });
        self.attach(&owner, token, task.abort_handle());
    }

    fn attach(&self, owner: &K, token: GenerationToken, task: tokio::task::AbortHandle) {
        let mut owners = self.lock();
        if !self.guard.is_current(owner, token) {
            task.abort();
            return;
        }
        if let Some(state) = owners.get_mut(owner) {
            state.task = Some(task);
        }
    }

    fn finish(&self, session: &LookupSession<K>, resolution: &Resolution) {
        let owner = session.owner();
        let mut owners = self.lock();
        if !session.is_current(&self.guard) {
            debug!(owner = %owner, token = %session.token(), "discarding superseded lookup");
            return;
        }
        let Some(state) = owners.get_mut(owner) else {
            return;
        };
        state.task = None;
        if let Some(coordinate) = session.accepted() {
            info!(owner = %owner, %coordinate, "coordinates set");
            state.coordinate = Some(coordinate);
        }
        let advisory = resolution.advisory();
        if advisory.needs_attention() {
            debug!(owner = %owner, advisory = %advisory, "lookup left coordinates untouched");
        }
        state.advisory = Some(advisory);
        self.publish(owner, state);
    }
}

/// Address-change driven coordinate lookup, one state per owner.
#[derive(Debug)]
pub struct CoordinateAutofill<K: OwnerKey, G: Geocoder + ?Sized + 'static> {
    shared: Arc<Shared<K, G>>,
    coalescer: DebounceCoalescer<K>,
}

impl<K: OwnerKey, G: Geocoder + ?Sized + 'static> CoordinateAutofill<K, G> {
    #[must_use]
    pub fn new(resolver: CandidateResolver<G>, quiet: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                owners: Mutex::new(HashMap::new()),
                guard: RaceGuard::new(),
                events,
                resolver,
            }),
            coalescer: DebounceCoalescer::new(quiet),
        }
    }

    /// Quiet window taken from `[geocode] quiet_ms`.
    #[must_use]
    pub fn from_config(resolver: CandidateResolver<G>, config: &GeocodeConfig) -> Self {
        Self::new(resolver, Duration::from_millis(config.quiet_ms))
    }

    #[must_use]
    pub const fn quiet(&self) -> Duration {
        self.coalescer.quiet()
    }

    /// The address block of `owner` changed.
    ///
    /// Any running lookup for `owner` is aborted. Returns false (and drops
    /// any pending lookup) when every field is blank.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn address_changed(&self, owner: K, fields: AddressFields) -> bool {
        self.shared.invalidate(&owner);
        if !fields.has_any() {
            if self.coalescer.cancel(&owner) {
                debug!(owner = %owner, "address cleared, pending lookup dropped");
            }
            return false;
        }
        let shared = Arc::clone(&self.shared);
        let fire_owner = owner.clone();
        self.coalescer.submit(owner, fields, move |fields| async move {
            shared.start_lookup(fire_owner, fields);
        });
        true
    }

    /// Manual marker placement. Accepted only inside the fence; supersedes
    /// any pending or running lookup for `owner`.
    pub fn place_marker(&self, owner: K, coordinate: Coordinate) -> bool {
        if !self.shared.resolver.fence().contains(coordinate) {
            debug!(owner = %owner, %coordinate, "marker outside fence ignored");
            return false;
        }
        self.coalescer.cancel(&owner);

        let mut owners = self.shared.lock();
        let _ = self.shared.guard.begin_attempt(&owner);
        let state = owners.entry(owner.clone()).or_default();
        if state.abort_lookup() {
            debug!(owner = %owner, "marker placement aborted running lookup");
        }
        state.coordinate = Some(coordinate);
        state.advisory = None;
        self.shared.publish(&owner, state);
        true
    }

    /// Record coordinates loaded with the record.
    pub fn seed(&self, owner: &K, coordinate: Coordinate) {
        let mut owners = self.shared.lock();
        owners.entry(owner.clone()).or_default().coordinate = Some(coordinate);
    }

    #[must_use]
    pub fn coordinate(&self, owner: &K) -> Option<Coordinate> {
        self.shared.lock().get(owner).and_then(|state| state.coordinate)
    }

    #[must_use]
    pub fn advisory(&self, owner: &K) -> Option<Advisory> {
        self.shared.lock().get(owner).and_then(|state| state.advisory)
    }

    /// Latest lookup generation for `owner` (0 before the first).
    #[must_use]
    pub fn generation(&self, owner: &K) -> u64 {
        self.shared.guard.current(owner).unwrap_or(0)
    }

    #[must_use]
    pub fn is_scheduled(&self, owner: &K) -> bool {
        self.coalescer.is_pending(owner)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GeoEvent<K>> {
        self.shared.events.subscribe()
    }

    /// Drop every pending and running lookup and forget all owners.
    pub fn shutdown(&self) {
        self.coalescer.cancel_all();
        let drained: Vec<(K, OwnerState)> = self.shared.lock().drain().collect();
        for (owner, mut state) in drained {
            if state.abort_lookup() {
                debug!(owner = %owner, "lookup aborted on shutdown");
            }
        }
        self.shared.guard.forget_all();
    }
}

impl<K: OwnerKey, G: Geocoder + ?Sized + 'static> Drop for CoordinateAutofill<K, G> {
    fn drop(&mut self) {
        let mut owners = self.shared.lock();
        for state in owners.values_mut() {
            state.abort_lookup();
        }
    }
}
