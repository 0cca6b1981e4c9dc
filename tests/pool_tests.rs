//! Pool and Cache Tests
//!
//! Tests for:
//! - ResourcePool: best-fit reuse, idle eviction window, forced reclaim, misuse panics
//! - ScratchPool: buffers return on drop, written-off leases
//! - IdleCache: idle eviction, ceiling force-clear
//! - RenderThread: wrong-thread access panics

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use drawpack::pool::{CacheValue, IdleCache, PoolItem, ResourcePool, ScratchPool};
use drawpack::RenderThread;

const IDLE: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Block {
    size: u64,
    destroyed: Rc<Cell<u32>>,
}

impl PoolItem for Block {
    fn capacity(&self) -> u64 {
        self.size
    }

    fn destroy(self) {
        self.destroyed.set(self.destroyed.get() + 1);
    }
}

fn block_pool() -> (ResourcePool<Block>, Rc<Cell<u32>>) {
    (
        ResourcePool::new("TestPool", RenderThread::current(), IDLE),
        Rc::new(Cell::new(0)),
    )
}

fn make(destroyed: &Rc<Cell<u32>>) -> impl FnOnce(u64) -> Block + '_ {
    move |size| Block {
        size,
        destroyed: Rc::clone(destroyed),
    }
}

// ============================================================================
// ResourcePool
// ============================================================================

#[test]
fn released_entry_is_reused() {
    let (mut pool, destroyed) = block_pool();
    let now = Instant::now();

    let (lease, block) = pool.acquire(100, make(&destroyed), |_| {});
    pool.release(lease, block, now);
    let (_lease, block) = pool.acquire(50, make(&destroyed), |_| {});

    assert_eq!(block.size, 100);
    let stats = pool.take_stats();
    assert_eq!((stats.hits, stats.misses), (1, 1));
}

#[test]
fn smallest_fitting_entry_wins() {
    let (mut pool, destroyed) = block_pool();
    let now = Instant::now();
    let (a, block_a) = pool.acquire(400, make(&destroyed), |_| {});
    let (b, block_b) = pool.acquire(120, make(&destroyed), |_| {});
    let (c, block_c) = pool.acquire(800, make(&destroyed), |_| {});
    pool.release(a, block_a, now);
    pool.release(b, block_b, now);
    pool.release(c, block_c, now);

    let (_, chosen) = pool.acquire(100, make(&destroyed), |_| {});
    assert_eq!(chosen.size, 120);
}

#[test]
fn entry_idle_past_timeout_is_evicted() {
    let (mut pool, destroyed) = block_pool();
    let released_at = Instant::now();
    let (lease, block) = pool.acquire(64, make(&destroyed), |_| {});
    pool.release(lease, block, released_at);

    pool.sweep(released_at + IDLE + Duration::from_secs(1));
    assert_eq!(pool.free_count(), 0);
    assert_eq!(destroyed.get(), 1);
    assert_eq!(pool.take_stats().evictions, 1);
}

#[test]
fn entry_touched_within_window_survives() {
    let (mut pool, destroyed) = block_pool();
    let released_at = Instant::now();
    let (lease, block) = pool.acquire(64, make(&destroyed), |_| {});
    pool.release(lease, block, released_at);

    pool.sweep(released_at + IDLE / 2);
    pool.sweep(released_at + IDLE);
    assert_eq!(pool.free_count(), 1);
    assert_eq!(destroyed.get(), 0);
}

#[test]
fn in_use_entry_is_reclaimed_at_sweep() {
    let (mut pool, destroyed) = block_pool();
    let (lease, block) = pool.acquire(64, make(&destroyed), |_| {});
    assert_eq!(pool.in_use_count(), 1);

    pool.sweep(Instant::now());
    assert_eq!(pool.in_use_count(), 0);
    assert_eq!(pool.take_stats().forced_reclaims, 1);

    // The entry has no shadow, so it was written off; a late return is accepted.
    pool.release(lease, block, Instant::now());
    assert_eq!(pool.free_count(), 1);
}

#[test]
#[should_panic(expected = "untracked lease")]
fn double_release_panics() {
    let (mut pool, destroyed) = block_pool();
    let now = Instant::now();
    let (lease, block) = pool.acquire(64, make(&destroyed), |_| {});
    pool.release(lease, block, now);
    let second = Block {
        size: 64,
        destroyed: Rc::clone(&destroyed),
    };
    pool.release(lease, second, now);
}

#[test]
fn render_thread_token_rejects_other_threads() {
    let thread = RenderThread::current();
    let panicked = std::thread::spawn(move || std::panic::catch_unwind(|| thread.assert_current()).is_err())
        .join()
        .unwrap();
    assert!(panicked, "asserting from another thread must panic");
    assert!(thread.is_current());
}

// ============================================================================
// ScratchPool
// ============================================================================

#[test]
fn scratch_buffers_return_on_drop() {
    let pool = ScratchPool::new(RenderThread::current(), IDLE);
    {
        let mut a = pool.acquire(128);
        let _b = pool.acquire(128);
        a.extend_from_slice(&[1, 2, 3]);
        assert_eq!(pool.in_use_count(), 2);
    }
    assert_eq!(pool.in_use_count(), 0);
    assert_eq!(pool.free_count(), 2);

    let reused = pool.acquire(16);
    assert!(reused.is_empty());
}

#[test]
fn idle_scratch_buffers_are_freed() {
    let pool = ScratchPool::new(RenderThread::current(), IDLE);
    drop(pool.acquire(64));
    let after_release = Instant::now();

    pool.sweep(after_release + Duration::from_secs(1));
    assert_eq!(pool.free_count(), 1);
    pool.sweep(after_release + IDLE + Duration::from_secs(1));
    assert_eq!(pool.free_count(), 0);
}

#[test]
fn leaked_scratch_buffer_is_written_off() {
    let pool = ScratchPool::new(RenderThread::current(), IDLE);
    let held = pool.acquire(64);
    pool.sweep(Instant::now());
    assert_eq!(pool.in_use_count(), 0);
    assert_eq!(pool.take_stats().forced_reclaims, 1);

    drop(held);
    assert_eq!(pool.free_count(), 1);
}

// ============================================================================
// IdleCache
// ============================================================================

struct Entry(Rc<Cell<u32>>);

impl CacheValue for Entry {
    fn destroy(self) {
        self.0.set(self.0.get() + 1);
    }
}

fn cache(idle: Option<Duration>, ceiling: usize) -> IdleCache<u32, Entry> {
    IdleCache::new("TestCache", RenderThread::current(), idle, ceiling)
}

#[test]
fn idle_cache_evicts_only_stale_entries() {
    let destroyed = Rc::new(Cell::new(0));
    let mut cache = cache(Some(IDLE), 64);
    let start = Instant::now();

    cache.get_or_try_insert_with(1, start, || Ok(Entry(Rc::clone(&destroyed)))).unwrap();
    cache.get_or_try_insert_with(2, start, || Ok(Entry(Rc::clone(&destroyed)))).unwrap();
    // Touch key 2 half-way through the window.
    let touched = start + IDLE / 2;
    cache.get_or_try_insert_with(2, touched, || unreachable!()).unwrap();

    cache.sweep(start + IDLE + Duration::from_secs(1));
    assert!(cache.get(&1).is_none());
    assert!(cache.get(&2).is_some());
    assert_eq!(destroyed.get(), 1);
}

#[test]
fn ceiling_forces_full_clear() {
    let destroyed = Rc::new(Cell::new(0));
    let mut cache = cache(None, 3);
    let now = Instant::now();
    for key in 0..4 {
        cache.get_or_try_insert_with(key, now, || Ok(Entry(Rc::clone(&destroyed)))).unwrap();
    }

    cache.sweep(now);
    assert!(cache.is_empty());
    assert_eq!(destroyed.get(), 4);
    assert_eq!(cache.take_stats().forced_reclaims, 4);
}

#[test]
fn cache_without_timeout_keeps_idle_entries() {
    let destroyed = Rc::new(Cell::new(0));
    let mut cache = cache(None, 8);
    let now = Instant::now();
    cache.get_or_try_insert_with(7, now, || Ok(Entry(Rc::clone(&destroyed)))).unwrap();

    cache.sweep(now + Duration::from_secs(3600));
    assert_eq!(cache.len(), 1);
}

#[test]
fn failed_creation_leaves_no_entry() {
    let mut cache = cache(None, 8);
    let result = cache.get_or_try_insert_with(1, Instant::now(), || Err(drawpack::Error::Cancelled));
    assert!(result.is_err());
    assert!(cache.is_empty());
}
