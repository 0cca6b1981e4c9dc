//! Shared Vertex-Array Cache
//!
//! One entry per [`VertexLayout`]: a growable vertex buffer that temporary
//! uploads with that layout append into during a frame.
//!
//! ```text
//!  frame N:  [batch A | batch B | batch C | ........ ]   cursor ─┐
//!                                                                 ▼
//!  end_frame: cursor = 0     (the GPU has the frame's writes queued already)
//! ```
//!
//! When a frame outgrows the buffer it is replaced by one at least twice the
//! size and the cursor restarts at zero. Batches written earlier in the frame
//! keep their handle to the previous buffer.

use std::time::Instant;

use crate::batch::descriptor::VertexLayout;
use crate::context::{RenderThread, Teardown};
use crate::errors::Result;
use crate::gpu::buffer::GpuBuffer;
use crate::gpu::vertex_array::VertexBinding;
use crate::pool::cache::{CacheValue, IdleCache};
use crate::pool::ledger::PoolStats;
use crate::settings::PoolSettings;

const INITIAL_SHARED_BYTES: u64 = 64 * 1024;

pub struct SharedVertexBuffer {
    buffer: GpuBuffer,
    cursor: u64,
}

impl SharedVertexBuffer {
    fn new(device: &wgpu::Device, layout: &VertexLayout) -> Self {
        let stride = u64::from(layout.stride()).max(1);
        let size = INITIAL_SHARED_BYTES.next_multiple_of(stride);
        Self {
            buffer: GpuBuffer::new(
                device,
                size,
                wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
                "Shared Vertex Buffer",
            ),
            cursor: 0,
        }
    }

    /// Writes `bytes` at the next 4-byte-aligned offset and returns the range.
    pub fn append(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, bytes: &[u8]) -> VertexBinding {
        let len = bytes.len() as u64;
        let mut offset = self.cursor.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let padded_len = len.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);

        if offset + padded_len > self.buffer.size {
            let new_size = padded_len.max(self.buffer.size * 2);
            log::info!(
                "Shared vertex buffer grown: {} -> {} bytes",
                self.buffer.size,
                new_size
            );
            self.buffer.ensure_capacity(device, new_size);
            offset = 0;
        }

        self.buffer.write(queue, offset, bytes);
        self.cursor = offset + padded_len;
        VertexBinding::new(self.buffer.buffer.clone(), offset, len)
    }

    #[inline]
    #[must_use]
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.buffer.size
    }

    fn reset_cursor(&mut self) {
        self.cursor = 0;
    }
}

impl CacheValue for SharedVertexBuffer {
    fn destroy(self) {
        self.buffer.destroy();
    }
}

pub struct VertexArrayCache {
    device: wgpu::Device,
    cache: IdleCache<VertexLayout, SharedVertexBuffer>,
}

impl VertexArrayCache {
    #[must_use]
    pub fn new(device: wgpu::Device, thread: RenderThread, settings: &PoolSettings) -> Self {
        Self {
            device,
            cache: IdleCache::new(
                "VertexArrayCache",
                thread,
                Some(settings.idle_timeout()),
                settings.vertex_array_ceiling,
            ),
        }
    }

    /// The shared buffer for `layout`, created on first use.
    pub fn get_or_create(&mut self, layout: &VertexLayout, now: Instant) -> Result<&mut SharedVertexBuffer> {
        let device = &self.device;
        self.cache
            .get_or_try_insert_with(layout.clone(), now, || Ok(SharedVertexBuffer::new(device, layout)))
    }

    /// Appends `bytes` to the shared buffer of `layout`.
    pub fn append(
        &mut self,
        queue: &wgpu::Queue,
        layout: &VertexLayout,
        bytes: &[u8],
        now: Instant,
    ) -> Result<VertexBinding> {
        let device = self.device.clone();
        let shared = self.get_or_create(layout, now)?;
        Ok(shared.append(&device, queue, bytes))
    }

    pub fn reset_cursors(&mut self) {
        for shared in self.cache.values_mut() {
            shared.reset_cursor();
        }
    }

    pub fn sweep(&mut self, now: Instant) {
        self.cache.sweep(now);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn take_stats(&mut self) -> PoolStats {
        self.cache.take_stats()
    }
}

impl Teardown for VertexArrayCache {
    fn teardown(&mut self) {
        self.cache.clear();
    }
}
