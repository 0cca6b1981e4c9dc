//! GPU Buffer Pools
//!
//! One [`ResourcePool`] of [`GpuBuffer`]s per usage class. Temporary uploads
//! borrow from here and hand the buffers back once the frame that draws them
//! has been submitted.
//!
//! Sizes are rounded up to a power of two (at least 256 bytes) so entries
//! are interchangeable across batches of similar size.

use std::time::{Duration, Instant};

use crate::context::{RenderThread, Teardown};
use crate::gpu::buffer::GpuBuffer;
use crate::pool::ledger::{Lease, PoolStats, ResourcePool};

const MIN_POOLED_SIZE: u64 = 256;

/// What a pooled buffer is used for; each class has its own pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferClass {
    Vertex,
    Index,
    Uniform,
    Storage,
    Indirect,
}

impl BufferClass {
    pub const ALL: [BufferClass; 5] = [
        Self::Vertex,
        Self::Index,
        Self::Uniform,
        Self::Storage,
        Self::Indirect,
    ];

    #[must_use]
    pub fn usage(self) -> wgpu::BufferUsages {
        use wgpu::BufferUsages as U;
        let base = U::COPY_DST;
        match self {
            Self::Vertex => base | U::VERTEX | U::COPY_SRC,
            Self::Index => base | U::INDEX | U::COPY_SRC,
            Self::Uniform => base | U::UNIFORM,
            Self::Storage => base | U::STORAGE,
            Self::Indirect => base | U::INDIRECT,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Vertex => "Pooled Vertex Buffer",
            Self::Index => "Pooled Index Buffer",
            Self::Uniform => "Pooled Uniform Buffer",
            Self::Storage => "Pooled Storage Buffer",
            Self::Indirect => "Pooled Indirect Buffer",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// A buffer on loan from [`GpuBufferPools`].
#[derive(Debug)]
pub struct PooledBuffer {
    pub class: BufferClass,
    pub lease: Lease,
    pub buffer: GpuBuffer,
}

pub struct GpuBufferPools {
    device: wgpu::Device,
    pools: [ResourcePool<GpuBuffer>; 5],
}

impl GpuBufferPools {
    #[must_use]
    pub fn new(device: wgpu::Device, thread: RenderThread, idle_timeout: Duration) -> Self {
        let pools = BufferClass::ALL
            .map(|class| ResourcePool::new(class.label(), thread, idle_timeout));
        Self { device, pools }
    }

    /// Borrows a buffer of at least `min_size` bytes, growing a reused entry
    /// if none fits.
    pub fn acquire(&mut self, class: BufferClass, min_size: u64) -> PooledBuffer {
        let device = &self.device;
        let rounded = min_size.max(MIN_POOLED_SIZE).next_power_of_two();
        let (lease, buffer) = self.pools[class.index()].acquire(
            rounded,
            |size| GpuBuffer::new(device, size, class.usage(), class.label()),
            |buffer| {
                buffer.ensure_capacity(device, rounded);
            },
        );
        PooledBuffer {
            class,
            lease,
            buffer,
        }
    }

    pub fn release(&mut self, pooled: PooledBuffer, now: Instant) {
        self.pools[pooled.class.index()].release(pooled.lease, pooled.buffer, now);
    }

    pub fn sweep(&mut self, now: Instant) {
        for pool in &mut self.pools {
            pool.sweep(now);
        }
    }

    #[must_use]
    pub fn free_count(&self, class: BufferClass) -> usize {
        self.pools[class.index()].free_count()
    }

    #[must_use]
    pub fn in_use_count(&self, class: BufferClass) -> usize {
        self.pools[class.index()].in_use_count()
    }

    pub fn take_stats(&mut self) -> PoolStats {
        let mut stats = PoolStats::default();
        for pool in &mut self.pools {
            stats.accumulate(pool.take_stats());
        }
        stats
    }
}

impl Teardown for GpuBufferPools {
    fn teardown(&mut self) {
        for pool in &mut self.pools {
            pool.clear();
        }
    }
}
