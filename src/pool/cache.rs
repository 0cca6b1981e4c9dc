//! Keyed Idle Cache
//!
//! Shared objects looked up by key, each stamped with its last access.
//! [`IdleCache::sweep`] runs at the frame boundary and
//!
//! - force-clears the whole cache if it holds more than `ceiling` entries
//!   (runaway key growth is a caller bug, logged with `warn!`), otherwise
//! - destroys entries untouched for longer than the idle timeout, if one is set.

use std::collections::hash_map::Entry;
use std::hash::Hash;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use crate::context::RenderThread;
use crate::errors::Result;
use crate::pool::ledger::PoolStats;

/// A value an [`IdleCache`] can hold.
pub trait CacheValue {
    /// Releases the underlying resource when the entry is evicted.
    fn destroy(self)
    where
        Self: Sized,
    {
    }
}

impl CacheValue for wgpu::Sampler {}

struct CacheEntry<V> {
    value: V,
    last_access: Instant,
}

pub struct IdleCache<K, V: CacheValue> {
    label: &'static str,
    thread: RenderThread,
    idle_timeout: Option<Duration>,
    ceiling: usize,
    entries: FxHashMap<K, CacheEntry<V>>,
    stats: PoolStats,
}

impl<K: Eq + Hash, V: CacheValue> IdleCache<K, V> {
    #[must_use]
    pub fn new(
        label: &'static str,
        thread: RenderThread,
        idle_timeout: Option<Duration>,
        ceiling: usize,
    ) -> Self {
        Self {
            label,
            thread,
            idle_timeout,
            ceiling,
            entries: FxHashMap::default(),
            stats: PoolStats::default(),
        }
    }

    /// Returns the entry for `key`, creating it with `create` on a miss, and
    /// stamps it with `now`.
    pub fn get_or_try_insert_with(
        &mut self,
        key: K,
        now: Instant,
        create: impl FnOnce() -> Result<V>,
    ) -> Result<&mut V> {
        self.thread.assert_current();

        let entry = match self.entries.entry(key) {
            Entry::Occupied(occupied) => {
                self.stats.hits += 1;
                let entry = occupied.into_mut();
                entry.last_access = now;
                entry
            }
            Entry::Vacant(vacant) => {
                let value = create()?;
                self.stats.misses += 1;
                vacant.insert(CacheEntry {
                    value,
                    last_access: now,
                })
            }
        };
        Ok(&mut entry.value)
    }

    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|e| &e.value)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.entries.values_mut().map(|e| &mut e.value)
    }

    /// Frame-boundary sweep.
    pub fn sweep(&mut self, now: Instant) {
        self.thread.assert_current();

        if self.entries.len() > self.ceiling {
            log::warn!(
                "{}: {} entries exceed the ceiling of {}, clearing cache",
                self.label,
                self.entries.len(),
                self.ceiling
            );
            self.stats.forced_reclaims += self.entries.len() as u64;
            self.clear();
            return;
        }

        let Some(idle_timeout) = self.idle_timeout else {
            return;
        };
        let before = self.entries.len();
        let expired: Vec<_> = self
            .entries
            .extract_if(|_, e| now.saturating_duration_since(e.last_access) > idle_timeout)
            .collect();
        for (_, entry) in expired {
            entry.value.destroy();
        }
        let evicted = before - self.entries.len();
        if evicted > 0 {
            self.stats.evictions += evicted as u64;
            log::debug!("{}: evicted {evicted} idle entries", self.label);
        }
    }

    /// Destroys every entry.
    pub fn clear(&mut self) {
        for (_, entry) in self.entries.drain() {
            entry.value.destroy();
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn take_stats(&mut self) -> PoolStats {
        std::mem::take(&mut self.stats)
    }
}
