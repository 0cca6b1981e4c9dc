//! Render Context
//!
//! [`RenderContext`] owns everything the pipeline mutates: the wgpu device and
//! queue, every pool and cache, the shared quad index buffer and the deferred
//! action queue. It is bound to the thread that created it (it is `!Send`),
//! and every pool carries the same [`RenderThread`] token and checks it.
//!
//! # Frame Lifecycle
//!
//! ```text
//!  begin_batch ─► write streams ─► prepare ─► (optimize) ─► upload_* ─► draw
//!                                                                   │
//!  queue.submit(...) ◄──────────────────────────────────────────────┘
//!  release(temporary uploads)
//!  end_frame():  1. run deferred actions
//!                2. sweep pools and caches
//!                3. reset shared vertex cursors
//!                4. frame_index += 1, log FrameStats
//! ```

use std::thread::ThreadId;
use std::time::Instant;

use crate::batch::descriptor::DrawBatch;
use crate::batch::holder::DrawBatchDataHolder;
use crate::batch::optimize::{OptimizeReport, optimize};
use crate::batch::prepare::{PreparedDrawBatchData, prepare};
use crate::deferred::{DeferredQueue, RenderThreadHandle};
use crate::errors::Result;
use crate::gpu::quad::QuadIndexBuffer;
use crate::pool::gpu_buffer::{BufferClass, GpuBufferPools, PooledBuffer};
use crate::pool::ledger::PoolStats;
use crate::pool::sampler::{SamplerCache, SamplerKey};
use crate::pool::scratch::ScratchPool;
use crate::pool::vertex_array::VertexArrayCache;
use crate::settings::PipelineSettings;

// ============================================================================
// Render thread
// ============================================================================

/// Identity of the thread allowed to mutate GPU state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderThread(ThreadId);

impl RenderThread {
    /// The calling thread.
    #[must_use]
    pub fn current() -> Self {
        Self(std::thread::current().id())
    }

    #[inline]
    #[must_use]
    pub fn is_current(&self) -> bool {
        std::thread::current().id() == self.0
    }

    /// # Panics
    ///
    /// Panics when called from any other thread.
    #[inline]
    #[track_caller]
    pub fn assert_current(&self) {
        assert!(
            self.is_current(),
            "render-thread resource accessed from {:?} (owner {:?})",
            std::thread::current().id(),
            self.0
        );
    }
}

/// A registry of owned GPU resources released when the context is dropped.
pub trait Teardown {
    fn teardown(&mut self);
}

// ============================================================================
// Frame statistics
// ============================================================================

/// Per-frame counters, returned and reset by [`RenderContext::end_frame`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame_index: u64,
    pub temporary_uploads: u32,
    pub persistent_uploads: u32,
    pub uploaded_bytes: u64,
    pub deferred_actions: u32,
    pub pools: PoolStats,
}

// ============================================================================
// RenderContext
// ============================================================================

pub struct RenderContext {
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    thread: RenderThread,
    settings: PipelineSettings,
    frame_index: u64,
    pub(crate) stats: FrameStats,

    scratch: ScratchPool,
    pub(crate) buffers: GpuBufferPools,
    pub(crate) vertex_arrays: VertexArrayCache,
    samplers: SamplerCache,
    pub(crate) quads: QuadIndexBuffer,

    deferred: DeferredQueue<RenderContext>,
}

impl RenderContext {
    /// Creates a context bound to the calling thread.
    #[must_use]
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, settings: PipelineSettings) -> Self {
        let thread = RenderThread::current();
        let idle = settings.pools.idle_timeout();
        log::info!(
            "RenderContext created: arena max {} bytes, idle timeout {:?}",
            settings.arena.max_capacity,
            idle
        );
        Self {
            scratch: ScratchPool::new(thread, idle),
            buffers: GpuBufferPools::new(device.clone(), thread, idle),
            vertex_arrays: VertexArrayCache::new(device.clone(), thread, &settings.pools),
            samplers: SamplerCache::new(device.clone(), thread, settings.pools.sampler_ceiling),
            quads: QuadIndexBuffer::new(settings.pools.initial_quad_capacity),
            deferred: DeferredQueue::new(),
            device,
            queue,
            thread,
            settings,
            frame_index: 0,
            stats: FrameStats::default(),
        }
    }

    // ─── Accessors ────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[inline]
    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    #[inline]
    #[must_use]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    #[inline]
    #[must_use]
    pub fn render_thread(&self) -> RenderThread {
        self.thread
    }

    #[inline]
    #[track_caller]
    pub fn assert_render_thread(&self) {
        self.thread.assert_current();
    }

    #[must_use]
    pub fn scratch_pool(&self) -> &ScratchPool {
        &self.scratch
    }

    #[must_use]
    pub fn buffer_pools(&self) -> &GpuBufferPools {
        &self.buffers
    }

    #[must_use]
    pub fn vertex_array_cache(&self) -> &VertexArrayCache {
        &self.vertex_arrays
    }

    #[must_use]
    pub fn quad_index_buffer(&self) -> &QuadIndexBuffer {
        &self.quads
    }

    /// A handle other threads use to queue work for the next frame boundary.
    #[must_use]
    pub fn handle(&self) -> RenderThreadHandle<RenderContext> {
        self.deferred.handle()
    }

    // ─── Batch pipeline ───────────────────────────────────────────────────

    /// Starts accumulating data for one draw of `batch`.
    #[must_use]
    pub fn begin_batch(&self, batch: &DrawBatch) -> DrawBatchDataHolder {
        self.assert_render_thread();
        DrawBatchDataHolder::new(&self.scratch, batch.clone())
    }

    /// Validates `holder` and synthesizes its draw commands.
    pub fn prepare(&mut self, holder: DrawBatchDataHolder) -> Result<PreparedDrawBatchData> {
        self.assert_render_thread();
        prepare(holder, &mut self.quads)
    }

    /// Runs the mesh optimizer over a prepared triangle batch.
    pub fn optimize(&self, prepared: &mut PreparedDrawBatchData) -> Result<OptimizeReport> {
        self.assert_render_thread();
        optimize(prepared)
    }

    /// A shared sampler for `key`.
    pub fn sampler(&mut self, key: SamplerKey) -> Result<wgpu::Sampler> {
        self.assert_render_thread();
        self.samplers.get(key, Instant::now())
    }

    pub(crate) fn lend_buffer(&mut self, class: BufferClass, bytes: &[u8]) -> PooledBuffer {
        let pooled = self.buffers.acquire(class, bytes.len() as u64);
        pooled.buffer.write(&self.queue, 0, bytes);
        pooled
    }

    // ─── Frame boundary ───────────────────────────────────────────────────

    /// Ends the frame. Call once per frame, after submitting its command
    /// buffers and releasing its temporary uploads.
    pub fn end_frame(&mut self) -> FrameStats {
        self.assert_render_thread();

        let actions = self.deferred.take_pending();
        let deferred_actions = actions.len() as u32;
        for action in actions {
            action(self);
        }

        let now = Instant::now();
        self.scratch.sweep(now);
        self.buffers.sweep(now);
        self.vertex_arrays.sweep(now);
        self.samplers.sweep(now);

        self.vertex_arrays.reset_cursors();

        let mut stats = std::mem::take(&mut self.stats);
        stats.frame_index = self.frame_index;
        stats.deferred_actions = deferred_actions;
        stats.pools.accumulate(self.scratch.take_stats());
        stats.pools.accumulate(self.buffers.take_stats());
        stats.pools.accumulate(self.vertex_arrays.take_stats());
        stats.pools.accumulate(self.samplers.take_stats());

        log::debug!(
            "Frame {}: {} temporary / {} persistent uploads, {} bytes, {} deferred, pools {:?}",
            stats.frame_index,
            stats.temporary_uploads,
            stats.persistent_uploads,
            stats.uploaded_bytes,
            stats.deferred_actions,
            stats.pools
        );

        self.frame_index += 1;
        stats
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        self.deferred.shutdown();
        let registries: [&mut dyn Teardown; 4] = [
            &mut self.buffers,
            &mut self.vertex_arrays,
            &mut self.samplers,
            &mut self.quads,
        ];
        for registry in registries {
            registry.teardown();
        }
        log::debug!("RenderContext torn down after {} frames", self.frame_index);
    }
}
