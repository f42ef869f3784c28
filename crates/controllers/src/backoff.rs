//! Per-key exponential backoff for failing reconciles.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Interval between garbage-collection sweeps of stale entries.
pub const BACKOFF_GC_INTERVAL: Duration = Duration::from_secs(60);

pub struct Backoff {
    base: Duration,
    max: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

struct Entry {
    delay: Duration,
    last_update: Instant,
}

impl Backoff {
    /// Floor 1s, ceiling 15min: the reconcilers' failure policy.
    pub fn for_reconciler() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(15 * 60))
    }

    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The next delay for a key: the base on first failure, doubling up to
    /// the ceiling on repeats.
    pub fn next(&self, key: &str) -> Duration {
        let mut entries = self.entries.lock().unwrap();
        let now = Instant::now();
        let entry = entries.entry(key.to_string()).or_insert(Entry {
            delay: Duration::ZERO,
            last_update: now,
        });
        entry.delay = if entry.delay.is_zero() {
            self.base
        } else {
            (entry.delay * 2).min(self.max)
        };
        entry.last_update = now;
        entry.delay
    }

    pub fn reset(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }

    /// Drop entries that have not failed recently.
    pub fn gc(&self) {
        let horizon = self.max * 2;
        let now = Instant::now();
        self.entries
            .lock()
            .unwrap()
            .retain(|_, entry| now.duration_since(entry.last_update) < horizon);
    }

    /// Single shared GC loop, started once per reconciler.
    pub async fn run_gc(&self, token: CancellationToken) {
        let mut tick = tokio::time::interval(BACKOFF_GC_INTERVAL);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("backoff gc shutting down");
                    return;
                }
                _ = tick.tick() => self.gc(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_up_to_the_ceiling() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(4));
        assert_eq!(backoff.next("k"), Duration::from_secs(1));
        assert_eq!(backoff.next("k"), Duration::from_secs(2));
        assert_eq!(backoff.next("k"), Duration::from_secs(4));
        assert_eq!(backoff.next("k"), Duration::from_secs(4));
    }

    #[test]
    fn keys_are_independent() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60));
        assert_eq!(backoff.next("a"), Duration::from_secs(1));
        assert_eq!(backoff.next("a"), Duration::from_secs(2));
        assert_eq!(backoff.next("b"), Duration::from_secs(1));
    }

    #[test]
    fn reset_returns_to_base() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60));
        backoff.next("k");
        backoff.next("k");
        backoff.reset("k");
        assert_eq!(backoff.next("k"), Duration::from_secs(1));
    }

    #[test]
    fn reconciler_policy_bounds() {
        let backoff = Backoff::for_reconciler();
        assert_eq!(backoff.next("k"), Duration::from_secs(1));
        let mut last = Duration::ZERO;
        for _ in 0..20 {
            last = backoff.next("k");
        }
        assert_eq!(last, Duration::from_secs(900));
    }
}
