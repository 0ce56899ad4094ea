//! Per-key debounce timers.
//!
//! A burst of submits for one key collapses into a single firing carrying the
//! last submitted value, `quiet` after the last submit. Replacing a timer
//! aborts its task, and every timer also carries a ticket so that one which
//! already woke up cannot fire after being replaced.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

#[derive(Debug)]
struct PendingTimer {
    ticket: u64,
    task: JoinHandle<()>,
}

type PendingMap<K> = Arc<Mutex<HashMap<K, PendingTimer>>>;

fn lock<K>(pending: &PendingMap<K>) -> MutexGuard<'_, HashMap<K, PendingTimer>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Collapses bursts of intents per key into one delayed firing.
#[derive(Debug)]
pub struct DebounceCoalescer<K> {
    quiet: Duration,
    pending: PendingMap<K>,
    next_ticket: AtomicU64,
}

impl<K> DebounceCoalescer<K>
where
    K: Eq + Hash + Clone + std::fmt::Display + Send + 'static,
{
    #[must_use]
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_ticket: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub const fn quiet(&self) -> Duration {
        self.quiet
    }

    /// Schedule `fire(value)` for `key` after the quiet window, replacing any
    /// timer already pending for `key`. Nothing runs before the window
    /// elapses; replaced values are never passed to their `fire`.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn submit<V, F, Fut>(&self, key: K, value: V, fire: F)
    where
        V: Send + 'static,
        F: FnOnce(V) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let quiet = self.quiet;
        let pending = Arc::clone(&self.pending);
        let task_key = key.clone();

        let mut map = lock(&self.pending);
        if let Some(replaced) = map.remove(&key) {
            trace!(key = %key, ticket = replaced.ticket, "debounce timer replaced");
            replaced.task.abort();
        }

        // Spawned while the map is locked: the task cannot observe the map
        // before its own entry is in it.
        let task = tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            {
                let mut map = lock(&pending);
                match map.get(&task_key) {
                    Some(timer) if timer.ticket == ticket => {
                        map.remove(&task_key);
                    }
                    _ => return,
                }
            }
            trace!(key = %task_key, ticket, "debounce timer fired");
            fire(value).await;
        });
        map.insert(key, PendingTimer { ticket, task });
    }

    /// Drop the pending timer for `key` without firing it.
    pub fn cancel(&self, key: &K) -> bool {
        lock(&self.pending).remove(key).is_some_and(|timer| {
            timer.task.abort();
            true
        })
    }

    /// Drop every pending timer.
    pub fn cancel_all(&self) {
        for (_, timer) in lock(&self.pending).drain() {
            timer.task.abort();
        }
    }

    #[must_use]
    pub fn is_pending(&self, key: &K) -> bool {
        lock(&self.pending).contains_key(key)
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }
}

impl<K> Drop for DebounceCoalescer<K> {
    fn drop(&mut self) {
        let map = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        for timer in map.values() {
            timer.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    const QUIET: Duration = Duration::from_millis(600);

    fn recorder() -> (
        mpsc::UnboundedSender<(&'static str, u32)>,
        mpsc::UnboundedReceiver<(&'static str, u32)>,
    ) {
        mpsc::unbounded_channel()
    }

    fn submit(
        coalescer: &DebounceCoalescer<&'static str>,
        tx: &mpsc::UnboundedSender<(&'static str, u32)>,
        key: &'static str,
        value: u32,
    ) {
        let tx = tx.clone();
        coalescer.submit(key, value, move |v| async move {
            let _ = tx.send((key, v));
        });
    }

    #[tokio::test(start_paused = true)]
    async fn burst_fires_once_with_last_value() {
        let coalescer = DebounceCoalescer::new(QUIET);
        let (tx, mut rx) = recorder();

        for value in 1..=5 {
            submit(&coalescer, &tx, "victim-1", value);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(rx.try_recv().is_err(), "nothing fires inside the window");

        tokio::time::sleep(QUIET).await;
        assert_eq!(rx.try_recv().ok(), Some(("victim-1", 5)));
        assert!(rx.try_recv().is_err(), "exactly one firing");
        assert_eq!(coalescer.pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn spaced_submits_fire_separately() {
        let coalescer = DebounceCoalescer::new(QUIET);
        let (tx, mut rx) = recorder();

        submit(&coalescer, &tx, "victim-1", 1);
        tokio::time::sleep(QUIET + Duration::from_millis(1)).await;
        submit(&coalescer, &tx, "victim-1", 2);
        tokio::time::sleep(QUIET + Duration::from_millis(1)).await;

        assert_eq!(rx.try_recv().ok(), Some(("victim-1", 1)));
        assert_eq!(rx.try_recv().ok(), Some(("victim-1", 2)));
    }

    #[tokio::test(start_paused = true)]
    async fn keys_debounce_independently() {
        let coalescer = DebounceCoalescer::new(QUIET);
        let (tx, mut rx) = recorder();

        submit(&coalescer, &tx, "victim-1", 1);
        submit(&coalescer, &tx, "victim-2", 10);
        submit(&coalescer, &tx, "victim-1", 2);
        assert_eq!(coalescer.pending_len(), 2);

        tokio::time::sleep(QUIET + Duration::from_millis(1)).await;
        let mut fired: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        fired.sort_unstable();
        assert_eq!(fired, vec![("victim-1", 2), ("victim-2", 10)]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let coalescer = DebounceCoalescer::new(QUIET);
        let (tx, mut rx) = recorder();

        submit(&coalescer, &tx, "victim-1", 1);
        assert!(coalescer.is_pending(&"victim-1"));
        assert!(coalescer.cancel(&"victim-1"));
        assert!(!coalescer.cancel(&"victim-1"));

        tokio::time::sleep(QUIET * 2).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_clears_every_key() {
        let coalescer = DebounceCoalescer::new(QUIET);
        let (tx, mut rx) = recorder();

        submit(&coalescer, &tx, "a", 1);
        submit(&coalescer, &tx, "b", 2);
        coalescer.cancel_all();
        assert_eq!(coalescer.pending_len(), 0);

        tokio::time::sleep(QUIET * 2).await;
        assert!(rx.try_recv().is_err());
    }
}
