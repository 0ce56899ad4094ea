//! Per-key sync bookkeeping.
//!
//! [`SyncKeyRegistry`] owns one [`SyncState`] per live [`SyncKey`]. It is an
//! explicit object created with the owning view and torn down with it
//! ([`SyncKeyRegistry::shutdown`] or drop); nothing here is process-global.
//!
//! Writes that originate from an asynchronous completion go through the
//! `apply_*` methods, which take a [`GenerationToken`] and refuse to mutate
//! anything unless that token is still current. That check is the only
//! writer discipline: a superseded attempt simply finds its token stale.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::cancel::{AbortHandle, AbortSignal, Cancellable};
use crate::error::CommitError;
use crate::guard::{GenerationToken, RaceGuard};
use crate::key::SyncKey;

const EVENT_CAPACITY: usize = 256;

/// Values the engine can hold for a field.
pub trait FieldValue: Clone + fmt::Debug + Send + Sync + 'static {}

impl<T: Clone + fmt::Debug + Send + Sync + 'static> FieldValue for T {}

/// Save status rendered next to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Idle,
    Scheduled,
    Inflight,
    Saved,
    Error,
}

impl SyncStatus {
    /// Inline status text for the row.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "",
            Self::Scheduled | Self::Inflight => "Saving…",
            Self::Saved => "Saved",
            Self::Error => "Error",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scheduled => "scheduled",
            Self::Inflight => "inflight",
            Self::Saved => "saved",
            Self::Error => "error",
        }
    }

    /// True while a commit for the field has not settled yet.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Scheduled | Self::Inflight)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable state of one field.
#[derive(Debug)]
struct SyncState<V> {
    committed: Option<V>,
    displayed: Option<V>,
    status: SyncStatus,
    last_error: Option<String>,
    abort: Option<AbortHandle>,
}

impl<V> Default for SyncState<V> {
    fn default() -> Self {
        Self {
            committed: None,
            displayed: None,
            status: SyncStatus::Idle,
            last_error: None,
            abort: None,
        }
    }
}

impl<V> SyncState<V> {
    fn cancel_inflight(&mut self) -> bool {
        self.abort.take().is_some_and(|handle| {
            handle.cancel();
            true
        })
    }
}

/// Read model of one field for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSnapshot<V> {
    pub key: SyncKey,
    pub committed: Option<V>,
    pub displayed: Option<V>,
    pub generation: u64,
    pub status: SyncStatus,
    pub last_error: Option<String>,
}

/// Published on every status transition of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEvent<V> {
    pub key: SyncKey,
    pub generation: u64,
    pub status: SyncStatus,
    pub displayed: Option<V>,
    /// Operator-facing message, set for [`SyncStatus::Error`].
    pub message: Option<String>,
}

/// Owner of every [`SyncState`] for one view.
#[derive(Debug)]
pub struct SyncKeyRegistry<V> {
    states: Mutex<HashMap<SyncKey, SyncState<V>>>,
    guard: RaceGuard<SyncKey>,
    events: broadcast::Sender<SyncEvent<V>>,
}

impl<V: FieldValue> Default for SyncKeyRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: FieldValue> SyncKeyRegistry<V> {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            states: Mutex::new(HashMap::new()),
            guard: RaceGuard::new(),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SyncKey, SyncState<V>>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn generation_of(&self, key: &SyncKey) -> u64 {
        self.guard.current(key).unwrap_or(0)
    }

    fn publish(&self, key: &SyncKey, state: &SyncState<V>) {
        // No subscribers is fine; the snapshot API still reflects the change.
        let _ = self.events.send(SyncEvent {
            key: key.clone(),
            generation: self.generation_of(key),
            status: state.status,
            displayed: state.displayed.clone(),
            message: state.last_error.clone(),
        });
    }

    /// Subscribe to status transitions for every key.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent<V>> {
        self.events.subscribe()
    }

    /// Record the server value loaded with the row.
    ///
    /// The displayed value follows only when nothing is pending for the key.
    pub fn seed(&self, key: &SyncKey, committed: V) {
        let mut states = self.lock();
        let state = states.entry(key.clone()).or_default();
        if !state.status.is_pending() {
            state.displayed = Some(committed.clone());
        }
        state.committed = Some(committed);
    }

    #[must_use]
    pub fn snapshot(&self, key: &SyncKey) -> Option<SyncSnapshot<V>> {
        let states = self.lock();
        states.get(key).map(|state| SyncSnapshot {
            key: key.clone(),
            committed: state.committed.clone(),
            displayed: state.displayed.clone(),
            generation: self.generation_of(key),
            status: state.status,
            last_error: state.last_error.clone(),
        })
    }

    /// Snapshots of every live key, ordered by key.
    #[must_use]
    pub fn snapshots(&self) -> Vec<SyncSnapshot<V>> {
        let mut keys: Vec<SyncKey> = self.lock().keys().cloned().collect();
        keys.sort();
        keys.iter().filter_map(|key| self.snapshot(key)).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Latest generation issued for `key` (0 before the first attempt).
    #[must_use]
    pub fn generation(&self, key: &SyncKey) -> u64 {
        self.generation_of(key)
    }

    /// A newer intent arrived: echo it, invalidate the current attempt and
    /// abort its request.
    pub(crate) fn record_intent(&self, key: &SyncKey, value: V) -> GenerationToken {
        let mut states = self.lock();
        let state = states.entry(key.clone()).or_default();
        if state.cancel_inflight() {
            debug!(key = %key, "newer intent aborted in-flight commit");
        }
        let intent = self.guard.begin_attempt(key);
        state.displayed = Some(value);
        state.status = SyncStatus::Scheduled;
        state.last_error = None;
        self.publish(key, state);
        intent
    }

    /// The quiet window for `intent` elapsed: apply `value` optimistically and
    /// open a new abortable attempt.
    ///
    /// Returns `None` when a newer intent was recorded after `intent`; a
    /// timer that lost that race on a multi-threaded runtime starts nothing.
    pub(crate) fn begin_commit(
        &self,
        key: &SyncKey,
        intent: GenerationToken,
        value: V,
    ) -> Option<(GenerationToken, AbortSignal)> {
        let mut states = self.lock();
        if !self.guard.is_current(key, intent) {
            debug!(key = %key, %intent, "debounce fired for superseded intent");
            return None;
        }
        let state = states.entry(key.clone()).or_default();
        if state.cancel_inflight() {
            debug!(key = %key, "superseded in-flight commit aborted");
        }
        let token = self.guard.begin_attempt(key);
        let (handle, signal) = AbortHandle::new();
        state.abort = Some(handle);
        state.displayed = Some(value);
        state.status = SyncStatus::Inflight;
        state.last_error = None;
        self.publish(key, state);
        Some((token, signal))
    }

    /// Tie the task executing attempt `token` to the key's abort handle.
    /// A task whose attempt is already stale is aborted on the spot; one that
    /// already settled is left alone.
    pub(crate) fn attach_task(
        &self,
        key: &SyncKey,
        token: GenerationToken,
        task: tokio::task::AbortHandle,
    ) {
        let states = self.lock();
        if !self.guard.is_current(key, token) {
            task.abort();
            return;
        }
        if let Some(handle) = states.get(key).and_then(|state| state.abort.as_ref()) {
            handle.attach(task);
        }
    }

    /// Reconcile a successful commit. Returns false when the attempt was
    /// superseded and nothing changed.
    pub(crate) fn apply_success(&self, key: &SyncKey, token: GenerationToken, server: V) -> bool {
        let mut states = self.lock();
        let Some(state) = states.get_mut(key) else {
            return false;
        };
        if !self.guard.is_current(key, token) {
            debug!(key = %key, %token, "discarding superseded commit success");
            return false;
        }
        info!(key = %key, %token, value = ?server, "commit applied");
        state.abort = None;
        state.committed = Some(server.clone());
        state.displayed = Some(server);
        state.status = SyncStatus::Saved;
        state.last_error = None;
        self.publish(key, state);
        true
    }

    /// Reconcile a failed commit by rolling back to the last known-good
    /// value. Aborts and stale attempts change nothing.
    pub(crate) fn apply_failure(
        &self,
        key: &SyncKey,
        token: GenerationToken,
        error: &CommitError,
    ) -> bool {
        if error.is_abort() {
            debug!(key = %key, %token, "commit aborted");
            return false;
        }
        let mut states = self.lock();
        let Some(state) = states.get_mut(key) else {
            return false;
        };
        if !self.guard.is_current(key, token) {
            debug!(key = %key, %token, error = %error, "discarding superseded commit failure");
            return false;
        }
        warn!(key = %key, %token, code = %error.code(), error = %error, "commit failed, rolling back");
        state.abort = None;
        state.displayed.clone_from(&state.committed);
        state.status = SyncStatus::Error;
        state.last_error = Some(error.operator_message());
        self.publish(key, state);
        true
    }

    /// End the saved display window.
    pub(crate) fn settle_saved(&self, key: &SyncKey, token: GenerationToken) -> bool {
        let mut states = self.lock();
        let Some(state) = states.get_mut(key) else {
            return false;
        };
        if state.status != SyncStatus::Saved || !self.guard.is_current(key, token) {
            return false;
        }
        state.status = SyncStatus::Idle;
        self.publish(key, state);
        true
    }

    /// Drop one key: abort its request and forget its generation.
    pub fn remove(&self, key: &SyncKey) -> bool {
        let removed = self.lock().remove(key);
        self.guard.forget(key);
        removed.is_some_and(|mut state| {
            state.cancel_inflight();
            true
        })
    }

    /// Tear down: abort every in-flight request and forget every key.
    pub fn shutdown(&self) {
        let drained: Vec<(SyncKey, SyncState<V>)> = self.lock().drain().collect();
        for (key, mut state) in drained {
            if state.cancel_inflight() {
                debug!(key = %key, "in-flight commit aborted on shutdown");
            }
        }
        self.guard.forget_all();
    }
}

impl<V> Drop for SyncKeyRegistry<V> {
    fn drop(&mut self) {
        let states = self.states.get_mut().unwrap_or_else(PoisonError::into_inner);
        for state in states.values_mut() {
            state.cancel_inflight();
        }
    }
}
