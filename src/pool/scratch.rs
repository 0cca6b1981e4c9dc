//! CPU Scratch Buffers
//!
//! Byte vectors that the writers append into. They are lent from a
//! [`ScratchPool`] and go back to it when dropped, so a holder that is simply
//! dropped never leaks its streams.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use crate::context::RenderThread;
use crate::pool::ledger::{Lease, PoolItem, PoolStats, ResourcePool};

impl PoolItem for Vec<u8> {
    fn capacity(&self) -> u64 {
        Vec::capacity(self) as u64
    }

    fn reset(&mut self) {
        self.clear();
    }
}

/// Shared handle to the render thread's scratch-buffer pool.
///
/// Not `Send`: scratch buffers may only live on the render thread.
#[derive(Clone)]
pub struct ScratchPool(Rc<RefCell<ResourcePool<Vec<u8>>>>);

impl ScratchPool {
    #[must_use]
    pub fn new(thread: RenderThread, idle_timeout: Duration) -> Self {
        Self(Rc::new(RefCell::new(ResourcePool::new(
            "ScratchPool",
            thread,
            idle_timeout,
        ))))
    }

    /// Borrows a cleared buffer with at least `min_capacity` bytes reserved.
    #[must_use]
    pub fn acquire(&self, min_capacity: usize) -> ScratchBuffer {
        let (lease, bytes) = self.0.borrow_mut().acquire(
            min_capacity as u64,
            |cap| Vec::with_capacity(cap as usize),
            |v| v.reserve(min_capacity),
        );
        ScratchBuffer {
            bytes,
            origin: Some((lease, Rc::downgrade(&self.0))),
        }
    }

    pub fn sweep(&self, now: Instant) {
        self.0.borrow_mut().sweep(now);
    }

    pub fn take_stats(&self) -> PoolStats {
        self.0.borrow_mut().take_stats()
    }

    #[must_use]
    pub fn free_count(&self) -> usize {
        self.0.borrow().free_count()
    }

    #[must_use]
    pub fn in_use_count(&self) -> usize {
        self.0.borrow().in_use_count()
    }
}

/// An append-only byte stream, usually on loan from a [`ScratchPool`].
#[derive(Default)]
pub struct ScratchBuffer {
    bytes: Vec<u8>,
    origin: Option<(Lease, Weak<RefCell<ResourcePool<Vec<u8>>>>)>,
}

impl ScratchBuffer {
    /// A buffer that belongs to no pool.
    #[must_use]
    pub fn detached(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            origin: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    pub fn extend_from_slice(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    /// Appends zero bytes until the length is a multiple of `align`.
    #[inline]
    pub fn pad_to(&mut self, align: usize) {
        let target = self.bytes.len().next_multiple_of(align.max(1));
        self.bytes.resize(target, 0);
    }

    #[inline]
    pub fn pad(&mut self, count: usize) {
        self.bytes.resize(self.bytes.len() + count, 0);
    }

    /// Replaces the whole contents, keeping the allocation when possible.
    pub fn replace(&mut self, data: &[u8]) {
        self.bytes.clear();
        self.bytes.extend_from_slice(data);
    }
}

impl std::fmt::Debug for ScratchBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchBuffer")
            .field("len", &self.bytes.len())
            .field("pooled", &self.origin.is_some())
            .finish()
    }
}

impl Drop for ScratchBuffer {
    fn drop(&mut self) {
        if let Some((lease, pool)) = self.origin.take()
            && let Some(pool) = pool.upgrade()
        {
            let bytes = std::mem::take(&mut self.bytes);
            pool.borrow_mut().release(lease, bytes, Instant::now());
        }
    }
}
