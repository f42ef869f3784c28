//! Per-key serialized work queue.
//!
//! At most one in-flight reconcile per key: a key being worked on is never
//! handed out again until `done`, and re-adds of a queued key coalesce.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

pub struct KeyedQueue<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for KeyedQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<K> {
    state: Mutex<QueueState<K>>,
    notify: Notify,
}

struct QueueState<K> {
    queue: VecDeque<K>,
    queued: HashSet<K>,
    active: HashSet<K>,
}

impl<K> Default for KeyedQueue<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> KeyedQueue<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    queue: VecDeque::new(),
                    queued: HashSet::new(),
                    active: HashSet::new(),
                }),
                notify: Notify::new(),
            }),
        }
    }

    /// Enqueue a key. Coalesces with an already-queued copy; a key that is
    /// currently active is queued again so it reconciles once more after
    /// the in-flight run completes.
    pub fn add(&self, key: K) {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.queued.contains(&key) {
                return;
            }
            state.queued.insert(key.clone());
            state.queue.push_back(key);
        }
        self.inner.notify.notify_waiters();
    }

    /// Enqueue after a delay; used for backoff requeues.
    pub fn add_after(&self, key: K, delay: Duration) {
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Wait for the next key whose reconcile may start.
    pub async fn next(&self) -> K {
        loop {
            let notified = self.inner.notify.notified();
            {
                let mut state = self.inner.state.lock().unwrap();
                let eligible = state
                    .queue
                    .iter()
                    .position(|k| !state.active.contains(k));
                if let Some(index) = eligible {
                    let key = state.queue.remove(index).unwrap();
                    state.queued.remove(&key);
                    state.active.insert(key.clone());
                    return key;
                }
            }
            notified.await;
        }
    }

    /// Mark a key's reconcile finished, unblocking queued duplicates.
    pub fn done(&self, key: &K) {
        {
            let mut state = self.inner.state.lock().unwrap();
            state.active.remove(key);
        }
        self.inner.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
