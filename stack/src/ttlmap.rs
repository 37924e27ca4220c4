//! Keyed map with lazy TTL expiry.
//!
//! Backs the ARP resolution cache and the pending-send queue.  Entries carry
//! the timestamp of their last insertion; an entry older than the map's TTL
//! is a miss.  Expiry is lazy - entries are re-evaluated against the caller's
//! clock at lookup, and [`purge`](TtlMap::purge) sweeps them out wholesale.

use alloc::collections::BTreeMap;

struct TtlEntry<V> {
    value: V,
    /// Seconds timestamp of the last insert for this key.
    stamp: u64,
}

/// A `BTreeMap` wrapper whose entries expire `ttl_secs` after insertion.
///
/// `ttl_secs = 0` disables expiry; `capacity = 0` leaves the map unbounded.
/// When a bounded map is full, inserting a new key evicts the stalest entry,
/// so insertion always succeeds.
pub struct TtlMap<K, V> {
    entries: BTreeMap<K, TtlEntry<V>>,
    ttl_secs: u64,
    capacity: usize,
}

impl<K: Ord + Copy, V> TtlMap<K, V> {
    /// Create an empty map with the given TTL and capacity bound.
    pub const fn new(ttl_secs: u64, capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            ttl_secs,
            capacity,
        }
    }

    #[inline]
    fn is_fresh(&self, entry: &TtlEntry<V>, now: u64) -> bool {
        self.ttl_secs == 0 || now.saturating_sub(entry.stamp) < self.ttl_secs
    }

    /// Insert or refresh an entry, stamping it with `now`.
    ///
    /// At capacity, expired entries are swept first; if the map is still full
    /// the stalest entry is evicted to make room.
    pub fn insert(&mut self, key: K, value: V, now: u64) {
        if self.capacity != 0
            && self.entries.len() >= self.capacity
            && !self.entries.contains_key(&key)
        {
            self.purge(now);
            if self.entries.len() >= self.capacity {
                self.evict_stalest();
            }
        }
        self.entries.insert(key, TtlEntry { value, stamp: now });
    }

    /// Look up a fresh entry.  Expired or absent keys are misses.
    pub fn get(&self, key: &K, now: u64) -> Option<&V> {
        self.entries
            .get(key)
            .filter(|e| self.is_fresh(e, now))
            .map(|e| &e.value)
    }

    /// `true` if a fresh entry exists for `key`.
    pub fn contains(&self, key: &K, now: u64) -> bool {
        self.get(key, now).is_some()
    }

    /// Remove an entry, returning its value if it was still fresh.
    ///
    /// An expired entry is removed but its value is dropped, matching the
    /// lookup semantics: a stale entry no longer exists as far as callers
    /// are concerned.
    pub fn remove(&mut self, key: &K, now: u64) -> Option<V> {
        let entry = self.entries.remove(key)?;
        if self.ttl_secs == 0 || now.saturating_sub(entry.stamp) < self.ttl_secs {
            Some(entry.value)
        } else {
            None
        }
    }

    /// Sweep out every expired entry.
    pub fn purge(&mut self, now: u64) {
        if self.ttl_secs == 0 {
            return;
        }
        let ttl = self.ttl_secs;
        self.entries
            .retain(|_, e| now.saturating_sub(e.stamp) < ttl);
    }

    /// Number of fresh entries.
    pub fn len(&self, now: u64) -> usize {
        self.entries
            .values()
            .filter(|e| self.is_fresh(e, now))
            .count()
    }

    /// `true` if the map holds no fresh entries.
    pub fn is_empty(&self, now: u64) -> bool {
        self.len(now) == 0
    }

    /// Iterate over fresh entries in key order.
    pub fn iter(&self, now: u64) -> impl Iterator<Item = (&K, &V)> {
        self.entries
            .iter()
            .filter(move |(_, e)| self.is_fresh(e, now))
            .map(|(k, e)| (k, &e.value))
    }

    fn evict_stalest(&mut self) {
        let stalest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.stamp)
            .map(|(k, _)| *k);
        if let Some(key) = stalest {
            self.entries.remove(&key);
        }
    }
}
