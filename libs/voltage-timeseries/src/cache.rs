//! Timestep sequence cache
//!
//! Generated timestep sequences are shared by every request asking for the
//! same options in the same named zone. Zones are told apart by name, not
//! by their current UTC offset, since two zones sharing an offset today may
//! switch daylight saving on different dates. Entries are immutable `Arc` slices, so a
//! reader never sees a partially built sequence; two requests racing on the
//! same key may both generate it and the last insert wins.

use crate::error::Result;
use crate::generator::{generate_timesteps, TimeSeriesGeneratorOptions};
use chrono::{DateTime, FixedOffset, TimeZone};
use parking_lot::RwLock;
use rustc_hash::FxHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared, immutable timestep sequence
pub type Timesteps = Arc<[DateTime<FixedOffset>]>;

/// Combined hash of generation options and zone name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(u64);

impl CacheKey {
    pub fn new(opts: &TimeSeriesGeneratorOptions, zone_name: &str) -> Self {
        let mut hasher = FxHasher::default();
        opts.hash(&mut hasher);
        zone_name.hash(&mut hasher);
        CacheKey(hasher.finish())
    }
}

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<CacheKey, Timesteps>,
    /// Insertion order for eviction
    order: VecDeque<CacheKey>,
}

impl Entries {
    fn evict_to(&mut self, capacity: usize) -> usize {
        let mut evicted = 0;
        while self.map.len() > capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if self.map.remove(&oldest).is_some() {
                evicted += 1;
            }
        }
        evicted
    }
}

/// Bounded first-in-first-out cache of generated timesteps
#[derive(Debug)]
pub struct TimestepCache {
    entries: RwLock<Entries>,
    capacity: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TimestepCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            capacity: AtomicU64::new(capacity as u64),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cached timesteps of `opts` in `zone`, generated on a miss
    ///
    /// `zone_name` must identify `zone`; it is the cache key's zone part.
    pub fn generate<Tz: TimeZone>(
        &self,
        opts: &TimeSeriesGeneratorOptions,
        zone: &Tz,
        zone_name: &str,
    ) -> Result<Timesteps> {
        let key = CacheKey::new(opts, zone_name);

        let cached = self.entries.read().map.get(&key).cloned();
        if let Some(found) = cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = key.0, zone = zone_name, "Timestep cache hit");
            return Ok(found);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let timesteps: Timesteps = generate_timesteps(opts, zone)?.into();

        // Capacity is read under the lock so a concurrent resize is never undone
        let mut entries = self.entries.write();
        let capacity = self.capacity();
        if capacity == 0 {
            return Ok(timesteps);
        }
        if entries.map.insert(key, Arc::clone(&timesteps)).is_none() {
            entries.order.push_back(key);
        }
        let evicted = entries.evict_to(capacity);
        tracing::debug!(
            key = key.0,
            zone = zone_name,
            len = timesteps.len(),
            evicted,
            "Timestep cache miss"
        );
        Ok(timesteps)
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed) as usize
    }

    /// Change the capacity, evicting the oldest entries when shrinking
    pub fn resize(&self, capacity: usize) {
        self.capacity.store(capacity as u64, Ordering::Relaxed);
        let evicted = self.entries.write().evict_to(capacity);
        tracing::debug!(capacity, evicted, "Resized timestep cache");
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.map.clear();
        entries.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

impl Default for TimestepCache {
    fn default() -> Self {
        Self::new(1000)
    }
}
