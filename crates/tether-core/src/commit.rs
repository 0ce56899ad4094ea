//! Optimistic, debounced, abortable commits.
//!
//! # Lifecycle of one field
//!
//! 1. [`OptimisticCommitter::schedule`] echoes the value (`scheduled`),
//!    supersedes whatever attempt was running and (re)arms the debounce timer.
//! 2. When the quiet window elapses, and no newer intent was recorded since
//!    the timer was armed, the value is applied optimistically
//!    (`inflight`), a fresh generation token is taken and the commit function
//!    runs in its own abortable task.
//! 3. On settlement the registry checks the token. Current success →
//!    `saved`, then `idle` after the display window. Current failure →
//!    rollback to the last committed value and `error`. Stale outcomes and
//!    aborts change nothing.
//!
//! There is no automatic retry; a failed field waits for the next intent.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::cancel::AbortSignal;
use crate::config::AutosaveConfig;
use crate::debounce::DebounceCoalescer;
use crate::error::CommitError;
use crate::guard::GenerationToken;
use crate::key::SyncKey;
use crate::registry::{FieldValue, SyncEvent, SyncKeyRegistry, SyncSnapshot};

/// Persistence collaborator: a partial-update endpoint for one field.
///
/// Returns the value the backend accepted, which becomes the committed
/// value. Implementations should return [`CommitError::Aborted`] (or simply
/// stop) when `abort` fires.
#[async_trait]
pub trait CommitBackend<V>: Send + Sync {
    async fn commit(&self, key: &SyncKey, value: V, abort: AbortSignal) -> Result<V, CommitError>;
}

/// Timing knobs for [`OptimisticCommitter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitterConfig {
    /// Quiet window before a burst of intents is committed.
    pub quiet: Duration,
    /// How long `saved` stays visible before returning to `idle`.
    pub saved_display: Duration,
}

impl Default for CommitterConfig {
    fn default() -> Self {
        Self {
            quiet: Duration::from_millis(600),
            saved_display: Duration::from_millis(1000),
        }
    }
}

impl From<&AutosaveConfig> for CommitterConfig {
    fn from(config: &AutosaveConfig) -> Self {
        Self {
            quiet: Duration::from_millis(config.quiet_ms),
            saved_display: Duration::from_millis(config.saved_display_ms),
        }
    }
}

/// Coordinates optimistic autosave for every field of one view.
#[derive(Debug)]
pub struct OptimisticCommitter<V> {
    registry: Arc<SyncKeyRegistry<V>>,
    coalescer: DebounceCoalescer<SyncKey>,
    saved_display: Duration,
}

impl<V: FieldValue> OptimisticCommitter<V> {
    #[must_use]
    pub fn new(config: CommitterConfig) -> Self {
        Self::with_registry(Arc::new(SyncKeyRegistry::new()), config)
    }

    /// Build a committer around an injected registry.
    #[must_use]
    pub fn with_registry(registry: Arc<SyncKeyRegistry<V>>, config: CommitterConfig) -> Self {
        Self {
            registry,
            coalescer: DebounceCoalescer::new(config.quiet),
            saved_display: config.saved_display,
        }
    }

    #[must_use]
    pub const fn registry(&self) -> &Arc<SyncKeyRegistry<V>> {
        &self.registry
    }

    /// Record the server value loaded with the row.
    pub fn seed(&self, key: &SyncKey, committed: V) {
        self.registry.seed(key, committed);
    }

    #[must_use]
    pub fn snapshot(&self, key: &SyncKey) -> Option<SyncSnapshot<V>> {
        self.registry.snapshot(key)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent<V>> {
        self.registry.subscribe()
    }

    /// True while an intent for `key` waits for its quiet window.
    #[must_use]
    pub fn is_scheduled(&self, key: &SyncKey) -> bool {
        self.coalescer.is_pending(key)
    }

    /// Submit a user intent for `key`.
    ///
    /// `commit` runs at most once, after the quiet window, and only if no
    /// newer intent for `key` arrives first.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn schedule<F, Fut>(&self, key: SyncKey, value: V, commit: F)
    where
        F: FnOnce(V, AbortSignal) -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, CommitError>> + Send + 'static,
    {
        let intent = self.registry.record_intent(&key, value.clone());

        let registry = Arc::clone(&self.registry);
        let saved_display = self.saved_display;
        let fire_key = key.clone();
        self.coalescer.submit(key, value, move |value| async move {
            start_attempt(&registry, fire_key, intent, value, commit, saved_display);
        });
    }

    /// [`schedule`](Self::schedule) against a [`CommitBackend`].
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn schedule_with<B>(&self, key: SyncKey, value: V, backend: Arc<B>)
    where
        B: CommitBackend<V> + ?Sized + 'static,
    {
        let commit_key = key.clone();
        self.schedule(key, value, move |value, abort| async move {
            backend.commit(&commit_key, value, abort).await
        });
    }

    /// Cancel every pending timer and in-flight commit and forget all keys.
    pub fn shutdown(&self) {
        self.coalescer.cancel_all();
        self.registry.shutdown();
    }
}

fn start_attempt<V, F, Fut>(
    registry: &Arc<SyncKeyRegistry<V>>,
    key: SyncKey,
    intent: GenerationToken,
    value: V,
    commit: F,
    saved_display: Duration,
) where
    V: FieldValue,
    F: FnOnce(V, AbortSignal) -> Fut + Send + 'static,
    Fut: Future<Output = Result<V, CommitError>> + Send + 'static,
{
    let Some((token, signal)) = registry.begin_commit(&key, intent, value.clone()) else {
        return;
    };

    let task_registry = Arc::clone(registry);
    let task_key = key.clone();
    let task = tokio::spawn(async move {
        match commit(value, signal).await {
            Ok(server) => {
                if task_registry.apply_success(&task_key, token, server) {
                    tokio::time::sleep(saved_display).await;
                    task_registry.settle_saved(&task_key, token);
                }
            }
            Err(error) => {
                task_registry.apply_failure(&task_key, token, &error);
            }
        }
    });
    registry.attach_task(&key, token, task.abort_handle());
}
