//! Time-bounded cache: a bounded key-to-value mapping with
//! age-based eviction only (no LRU-of-access), used for pending acks,
//! pending reassemblies, and pending responses.
//!
//! A small number of generational "sectors", each a plain mapping.
//! Insertions always target sector 0; a rotation shifts every sector down by
//! one and discards the oldest, so an entry survives at most `forget_timeout`
//! wall time. The sector count is deliberately not part of any public
//! contract; this engine uses four, so an entry's actual lifetime is between
//! `3/4 * forget_timeout` and `forget_timeout` depending on rotation phase.

#[cfg(test)]
mod cache_test;

use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_SECTORS: usize = 4;

/// A generational, age-bounded cache. `get` scans from newest to oldest
/// sector; `set` always (re-)inserts into sector 0; `delete` removes from
/// whichever sector currently holds the key.
pub struct TimeBoundedCache<V> {
    // sectors[0] is newest, sectors[last] is about to be evicted on the
    // next rotation.
    sectors: Vec<HashMap<String, V>>,
    rotate_interval: Duration,
}

impl<V> TimeBoundedCache<V> {
    pub fn new(forget_timeout: Duration) -> Self {
        Self::with_sectors(forget_timeout, DEFAULT_SECTORS)
    }

    pub fn with_sectors(forget_timeout: Duration, num_sectors: usize) -> Self {
        let num_sectors = num_sectors.max(1);
        TimeBoundedCache {
            sectors: (0..num_sectors).map(|_| HashMap::new()).collect(),
            rotate_interval: forget_timeout / num_sectors as u32,
        }
    }

    /// How often [`Self::rotate`] should be called to honor the configured
    /// `forget_timeout`. The engine task schedules its sweep timer off this.
    pub fn rotate_interval(&self) -> Duration {
        self.rotate_interval
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.sectors.iter().find_map(|sector| sector.get(key))
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.sectors.iter_mut().find_map(|sector| sector.get_mut(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Inserts or re-inserts `key` into sector 0, removing any stale copy
    /// from an older sector so a single key never appears twice.
    pub fn set(&mut self, key: String, value: V) {
        for sector in self.sectors.iter_mut().skip(1) {
            sector.remove(&key);
        }
        self.sectors[0].insert(key, value);
    }

    pub fn delete(&mut self, key: &str) -> Option<V> {
        for sector in self.sectors.iter_mut() {
            if let Some(v) = sector.remove(key) {
                return Some(v);
            }
        }
        None
    }

    /// Which sector currently holds `key`, `0` being newest. Exposed so
    /// callers can build their own age-dependent policy (e.g. re-querying a
    /// provider only once it has aged past the freshest sector) without the
    /// cache owning that policy itself.
    pub fn sector_of(&self, key: &str) -> Option<usize> {
        self.sectors.iter().position(|sector| sector.contains_key(key))
    }

    /// Shifts every sector down by one, discarding the oldest. Call this on
    /// a `rotate_interval()` cadence so no entry older than `forget_timeout`
    /// stays visible. Returns the entries that fell out of the cache (the
    /// evicted sector), for callers that need to reject/clean up on expiry.
    pub fn rotate(&mut self) -> Vec<(String, V)> {
        let evicted = self.sectors.pop().unwrap_or_default();
        self.sectors.insert(0, HashMap::new());
        evicted.into_iter().collect()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.sectors.iter().flat_map(|sector| sector.values())
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.sectors.iter_mut().flat_map(|sector| sector.values_mut())
    }

    /// Removes and returns every entry matching `pred`, scanning all
    /// sectors. Used where a table needs an exact per-entry deadline rather
    /// than the coarser generational `rotate`, e.g. the reliability engine's
    /// overall ack/response timeouts.
    pub fn take_matching<F: FnMut(&V) -> bool>(&mut self, mut pred: F) -> Vec<(String, V)> {
        let mut out = Vec::new();
        for sector in self.sectors.iter_mut() {
            let keys: Vec<String> = sector
                .iter()
                .filter(|(_, v)| pred(v))
                .map(|(k, _)| k.clone())
                .collect();
            for key in keys {
                if let Some(v) = sector.remove(&key) {
                    out.push((key, v));
                }
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.sectors.iter().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
