//! Per-key cancellable timers.
//!
//! [`KeyedTimers`] owns at most one pending timer per key. Scheduling for a
//! key that already has a pending timer aborts the old one first, which is
//! exactly the debounce primitive both the validation scheduler and the
//! warning throttle are built on.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::util::lock;

struct Pending {
    id: u64,
    handle: JoinHandle<()>,
}

pub struct KeyedTimers<K> {
    pending: Arc<Mutex<HashMap<K, Pending>>>,
    next_id: AtomicU64,
}

impl<K> Default for KeyedTimers<K> {
    fn default() -> Self {
        KeyedTimers {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<K> KeyedTimers<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay`, replacing any timer pending for `key`.
    ///
    /// The key is released before `task` starts, so a later `schedule` or
    /// `cancel` for the same key never aborts a task that is already running.
    pub fn schedule<F>(&self, key: K, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let pending = Arc::clone(&self.pending);
        let fired_key = key.clone();

        let mut timers = lock(&self.pending);
        if let Some(previous) = timers.remove(&key) {
            previous.handle.abort();
        }

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut timers = lock(&pending);
                if timers.get(&fired_key).is_some_and(|timer| timer.id == id) {
                    timers.remove(&fired_key);
                }
            }
            task.await;
        });
        timers.insert(key, Pending { id, handle });
    }

    /// Cancel the pending timer for `key`. Returns whether one was pending.
    pub fn cancel(&self, key: &K) -> bool {
        match lock(&self.pending).remove(key) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for (_, timer) in lock(&self.pending).drain() {
            timer.handle.abort();
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        lock(&self.pending).contains_key(key)
    }

    pub fn len(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K> Drop for KeyedTimers<K> {
    fn drop(&mut self) {
        for (_, timer) in lock(&self.pending).drain() {
            timer.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = Arc::clone(&count);
        (count, move || Arc::clone(&handle))
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let timers = KeyedTimers::new();
        let (count, clone) = counter();

        let fired = clone();
        timers.schedule("a", Duration::from_millis(100), async move {
            fired.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timers.is_pending(&"a"));

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!timers.is_pending(&"a"), "Fired timer should release its key");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_pending_timer() {
        let timers = KeyedTimers::new();
        let (count, clone) = counter();

        for _ in 0..3 {
            let fired = clone();
            timers.schedule("a", Duration::from_millis(100), async move {
                fired.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let timers = KeyedTimers::new();
        let (count, clone) = counter();

        let fired = clone();
        timers.schedule("a", Duration::from_millis(100), async move {
            fired.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timers.cancel(&"a"));
        assert!(!timers.cancel(&"a"));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let timers = KeyedTimers::new();
        let (count, clone) = counter();

        for key in ["a", "b"] {
            let fired = clone();
            timers.schedule(key, Duration::from_millis(100), async move {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }
        timers.cancel(&"a");
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(timers.is_empty());
    }
}
