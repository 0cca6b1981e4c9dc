//! Free / In-Use Ledger
//!
//! The bookkeeping shared by every pool: which entries are free, which are lent
//! out, and when each was last touched.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                  ResourcePool<T>                       │
//! │                                                        │
//! │  free: [FreeEntry<T>]       (last_access per entry)    │
//! │  lent: Lease -> LentEntry   (optional shadow handle)   │
//! │                                                        │
//! │  acquire() -> (Lease, T)    reuse or create            │
//! │  release(Lease, T)          reset and back to free     │
//! │  sweep(now)                 frame boundary only        │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! # Sweep Policy
//!
//! - Entries still lent out at a sweep are a caller bug. They are reclaimed with
//!   a warning so a leak can never starve the pool. Entries with a shadow
//!   handle (GPU buffers) go straight back to the free list; CPU entries are
//!   written off.
//! - Either way the lease is remembered for [`WRITE_OFF_GRACE_SWEEPS`] sweeps,
//!   and a late return within that window is accepted. A late GPU entry is
//!   dropped rather than pushed, since its shadow is already on the free list.
//!   Past the window the record is forgotten, and anything still returned
//!   under it is dropped with a warning.
//! - Free entries idle for longer than the timeout are destroyed.

use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use crate::context::RenderThread;

/// Sweeps a reclaimed lease is remembered for before it is forgotten.
pub const WRITE_OFF_GRACE_SWEEPS: u64 = 8;

/// Something a [`ResourcePool`] can lend out.
pub trait PoolItem: Sized {
    /// Usable size in bytes, used for best-fit selection.
    fn capacity(&self) -> u64;

    /// Clears caller state before the entry goes back to the free list.
    fn reset(&mut self) {}

    /// A second handle to the same underlying resource, kept by the pool while
    /// the entry is lent out so it can be reclaimed without the borrower.
    fn shadow(&self) -> Option<Self> {
        None
    }

    /// Releases the underlying resource for good.
    fn destroy(self) {}
}

/// Proof of a borrow; must be handed back with the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Lease(u64);

struct FreeEntry<T> {
    item: T,
    last_access: Instant,
}

struct LentEntry<T> {
    shadow: Option<T>,
}

struct WrittenOff {
    /// The shadow went back on the free list when the lease was reclaimed.
    shadowed: bool,
    sweep: u64,
}

/// Counters accumulated since the last [`ResourcePool::take_stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub hits: u64,
    pub misses: u64,
    pub forced_reclaims: u64,
    pub evictions: u64,
}

impl PoolStats {
    pub fn accumulate(&mut self, other: PoolStats) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.forced_reclaims += other.forced_reclaims;
        self.evictions += other.evictions;
    }
}

/// Generic free/in-use ledger with idle eviction.
pub struct ResourcePool<T: PoolItem> {
    label: &'static str,
    thread: RenderThread,
    idle_timeout: Duration,
    free: Vec<FreeEntry<T>>,
    lent: FxHashMap<Lease, LentEntry<T>>,
    written_off: FxHashMap<Lease, WrittenOff>,
    /// Every lease up to and including this one has been forgotten or returned.
    forgotten_through: Option<u64>,
    sweeps: u64,
    next_lease: u64,
    stats: PoolStats,
}

impl<T: PoolItem> ResourcePool<T> {
    #[must_use]
    pub fn new(label: &'static str, thread: RenderThread, idle_timeout: Duration) -> Self {
        Self {
            label,
            thread,
            idle_timeout,
            free: Vec::new(),
            lent: FxHashMap::default(),
            written_off: FxHashMap::default(),
            forgotten_through: None,
            sweeps: 0,
            next_lease: 0,
            stats: PoolStats::default(),
        }
    }

    /// Lends out an entry of at least `min_capacity` bytes if one is free.
    ///
    /// Selection order: the smallest free entry that fits, then the largest
    /// free entry (which `fit` must grow), then a new entry from `create`.
    /// `fit` runs before the pool records its shadow handle.
    pub fn acquire(
        &mut self,
        min_capacity: u64,
        create: impl FnOnce(u64) -> T,
        fit: impl FnOnce(&mut T),
    ) -> (Lease, T) {
        self.thread.assert_current();

        let best_fit = self
            .free
            .iter()
            .enumerate()
            .filter(|(_, e)| e.item.capacity() >= min_capacity)
            .min_by_key(|(_, e)| e.item.capacity())
            .map(|(i, _)| i);
        let chosen = best_fit.or_else(|| {
            self.free
                .iter()
                .enumerate()
                .max_by_key(|(_, e)| e.item.capacity())
                .map(|(i, _)| i)
        });

        let mut item = if let Some(index) = chosen {
            self.stats.hits += 1;
            self.free.swap_remove(index).item
        } else {
            self.stats.misses += 1;
            create(min_capacity)
        };
        fit(&mut item);

        let lease = Lease(self.next_lease);
        self.next_lease += 1;
        self.lent.insert(
            lease,
            LentEntry {
                shadow: item.shadow(),
            },
        );
        (lease, item)
    }

    /// Takes back a lent entry.
    ///
    /// # Panics
    ///
    /// Panics if the lease was never issued by this pool or was already
    /// returned. Leases older than the write-off window are not checked.
    pub fn release(&mut self, lease: Lease, mut item: T, now: Instant) {
        self.thread.assert_current();

        if self.lent.remove(&lease).is_none() {
            match self.written_off.remove(&lease) {
                Some(WrittenOff { shadowed: true, .. }) => {
                    log::debug!("{}: late return of reclaimed lease {lease:?}, dropped", self.label);
                    return;
                }
                Some(WrittenOff { shadowed: false, .. }) => {
                    log::debug!("{}: late return of reclaimed lease {lease:?}", self.label);
                }
                None if self.forgotten_through.is_some_and(|last| lease.0 <= last) => {
                    log::warn!("{}: return of forgotten lease {lease:?}, dropped", self.label);
                    return;
                }
                None => panic!("{}: release of untracked lease {lease:?}", self.label),
            }
        }

        item.reset();
        self.free.push(FreeEntry {
            item,
            last_access: now,
        });
    }

    /// Frame-boundary sweep: reclaims leaked entries and evicts idle ones.
    pub fn sweep(&mut self, now: Instant) {
        self.thread.assert_current();
        self.sweeps += 1;

        if !self.lent.is_empty() {
            log::warn!(
                "{}: reclaiming {} entries still in use at frame boundary",
                self.label,
                self.lent.len()
            );
            for (lease, entry) in self.lent.drain() {
                self.stats.forced_reclaims += 1;
                let shadowed = entry.shadow.is_some();
                if let Some(mut item) = entry.shadow {
                    item.reset();
                    self.free.push(FreeEntry {
                        item,
                        last_access: now,
                    });
                }
                self.written_off.insert(
                    lease,
                    WrittenOff {
                        shadowed,
                        sweep: self.sweeps,
                    },
                );
            }
        }
        self.forget_stale_write_offs();

        let idle_timeout = self.idle_timeout;
        let before = self.free.len();
        let mut kept = Vec::with_capacity(before);
        for entry in self.free.drain(..) {
            if now.saturating_duration_since(entry.last_access) > idle_timeout {
                entry.item.destroy();
            } else {
                kept.push(entry);
            }
        }
        self.free = kept;

        let evicted = before - self.free.len();
        if evicted > 0 {
            self.stats.evictions += evicted as u64;
            log::debug!("{}: evicted {evicted} idle entries", self.label);
        }
    }

    fn forget_stale_write_offs(&mut self) {
        let sweeps = self.sweeps;
        let mut newest_forgotten = self.forgotten_through;
        self.written_off.retain(|lease, record| {
            let keep = sweeps - record.sweep < WRITE_OFF_GRACE_SWEEPS;
            if !keep {
                newest_forgotten = newest_forgotten.max(Some(lease.0));
            }
            keep
        });
        if newest_forgotten != self.forgotten_through {
            log::warn!(
                "{}: forgot leases reclaimed {WRITE_OFF_GRACE_SWEEPS} sweeps ago that never came back",
                self.label
            );
            self.forgotten_through = newest_forgotten;
        }
    }

    /// Destroys every free entry and forgets all outstanding leases.
    pub fn clear(&mut self) {
        for entry in self.free.drain(..) {
            entry.item.destroy();
        }
        for (_, entry) in self.lent.drain() {
            if let Some(item) = entry.shadow {
                item.destroy();
            }
        }
        self.written_off.clear();
    }

    #[inline]
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    #[inline]
    #[must_use]
    pub fn in_use_count(&self) -> usize {
        self.lent.len()
    }

    /// Reclaimed leases still accepted as late returns.
    #[inline]
    #[must_use]
    pub fn written_off_count(&self) -> usize {
        self.written_off.len()
    }

    #[inline]
    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Returns and resets the counters.
    pub fn take_stats(&mut self) -> PoolStats {
        std::mem::take(&mut self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Block(u64);

    impl PoolItem for Block {
        fn capacity(&self) -> u64 {
            self.0
        }
    }

    /// Two handles to one resource, like a cloned `wgpu::Buffer`.
    #[derive(Debug, Clone)]
    struct Shared(u64);

    impl PoolItem for Shared {
        fn capacity(&self) -> u64 {
            self.0
        }

        fn shadow(&self) -> Option<Self> {
            Some(self.clone())
        }
    }

    fn pool() -> ResourcePool<Block> {
        ResourcePool::new("test", RenderThread::current(), Duration::from_secs(60))
    }

    #[test]
    fn prefers_smallest_fitting_entry() {
        let mut pool = pool();
        let now = Instant::now();
        let (a, block_a) = pool.acquire(64, Block, |_| {});
        let (b, block_b) = pool.acquire(256, Block, |_| {});
        pool.release(a, block_a, now);
        pool.release(b, block_b, now);

        let (_, block) = pool.acquire(32, Block, |_| {});
        assert_eq!(block.0, 64);
    }

    #[test]
    fn falls_back_to_largest_entry_for_growth() {
        let mut pool = pool();
        let now = Instant::now();
        let (a, block_a) = pool.acquire(64, Block, |_| {});
        pool.release(a, block_a, now);

        let (_, block) = pool.acquire(1024, Block, |b| b.0 = b.0.max(1024));
        assert_eq!(block.0, 1024);
        assert_eq!(pool.take_stats().hits, 1);
    }

    #[test]
    #[should_panic(expected = "untracked lease")]
    fn double_release_panics() {
        let mut pool = pool();
        let now = Instant::now();
        let (lease, block) = pool.acquire(8, Block, |_| {});
        pool.release(lease, block, now);
        pool.release(lease, Block(8), now);
    }

    #[test]
    fn leaked_cpu_entry_is_written_off_then_accepted() {
        let mut pool = pool();
        let now = Instant::now();
        let (lease, block) = pool.acquire(8, Block, |_| {});
        pool.sweep(now);
        assert_eq!(pool.in_use_count(), 0);
        assert_eq!(pool.take_stats().forced_reclaims, 1);

        pool.release(lease, block, now);
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn leaked_shadowed_entry_is_reused_once() {
        let mut pool = ResourcePool::new("test", RenderThread::current(), Duration::from_secs(60));
        let now = Instant::now();
        let (lease, item) = pool.acquire(8, Shared, |_| {});
        pool.sweep(now);
        assert_eq!(pool.in_use_count(), 0);
        assert_eq!(pool.free_count(), 1);

        // The shadow is already free; the late handle must not be listed twice.
        pool.release(lease, item, now);
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.written_off_count(), 0);
    }

    #[test]
    fn write_offs_are_forgotten_after_grace_period() {
        let mut pool = pool();
        let now = Instant::now();
        let (lease, block) = pool.acquire(8, Block, |_| {});
        for _ in 0..WRITE_OFF_GRACE_SWEEPS {
            pool.sweep(now);
        }
        assert_eq!(pool.written_off_count(), 1);
        pool.sweep(now);
        assert_eq!(pool.written_off_count(), 0);

        pool.release(lease, block, now);
        assert_eq!(pool.free_count(), 0);
    }
}
