//! Bounded, time-windowed deduplication cache.
//!
//! Slack delivers events at-least-once, so the same `event_id` (and, for
//! mentions, the same message `ts` under two event types) can arrive more
//! than once. Entries expire after a TTL and the cache never grows past a
//! fixed capacity; at capacity the oldest entry is evicted first.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

pub struct DedupCache {
    capacity: usize,
    ttl: Duration,
    inner: Mutex<Inner>,
}

struct Inner {
    entries: HashMap<String, Instant>,
    /// Insertion order, used for both TTL purging and capacity eviction.
    /// Entries whose timestamp no longer matches the map are stale (released
    /// or re-inserted) and are skipped.
    order: VecDeque<(String, Instant)>,
}

impl DedupCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Atomically check-and-record a key. Returns `true` if the key was newly
    /// recorded, `false` when it is a duplicate within the TTL window.
    pub fn insert(&self, key: &str) -> bool {
        self.insert_at(key, Instant::now())
    }

    /// Forget a key so a later redelivery is admitted again. Used when an
    /// admitted event is subsequently rejected by the saturated work queue.
    pub fn release(&self, key: &str) {
        self.inner.lock().entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert_at(&self, key: &str, now: Instant) -> bool {
        let mut inner = self.inner.lock();
        inner.purge(now, self.ttl);

        if let Some(&seen) = inner.entries.get(key) {
            if now.duration_since(seen) < self.ttl {
                return false;
            }
        }

        while inner.entries.len() >= self.capacity {
            match inner.order.pop_front() {
                Some((old_key, old_at)) => {
                    if inner.entries.get(&old_key) == Some(&old_at) {
                        inner.entries.remove(&old_key);
                    }
                }
                None => break,
            }
        }

        inner.entries.insert(key.to_string(), now);
        inner.order.push_back((key.to_string(), now));
        true
    }
}

impl Inner {
    /// Drop expired and stale entries from the front of the order queue.
    fn purge(&mut self, now: Instant, ttl: Duration) {
        loop {
            let drop_front = match self.order.front() {
                Some((key, at)) => match self.entries.get(key) {
                    Some(live) if live == at => now.duration_since(*at) >= ttl,
                    _ => true,
                },
                None => break,
            };
            if !drop_front {
                break;
            }
            if let Some((key, at)) = self.order.pop_front() {
                if self.entries.get(&key) == Some(&at) {
                    self.entries.remove(&key);
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
