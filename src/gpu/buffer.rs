//! GPU Buffer Wrapper
//!
//! wgpu buffers cannot be resized. Growing a [`GpuBuffer`] replaces the
//! underlying `wgpu::Buffer`; holders of the old handle keep a valid (old)
//! buffer until they drop it.

use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};

use wgpu::util::DeviceExt;

use crate::pool::ledger::PoolItem;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

#[inline]
fn generate_buffer_id() -> u64 {
    NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed)
}

/// Rounds `size` up to wgpu's copy alignment (4 bytes), minimum 4.
#[inline]
#[must_use]
pub fn align_copy_size(size: u64) -> u64 {
    size.max(1).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT)
}

/// `bytes` zero-padded to a multiple of `align`, borrowed when already aligned.
#[must_use]
pub fn padded(bytes: &[u8], align: usize) -> Cow<'_, [u8]> {
    let target = bytes.len().max(1).next_multiple_of(align);
    if target == bytes.len() {
        Cow::Borrowed(bytes)
    } else {
        let mut owned = Vec::with_capacity(target);
        owned.extend_from_slice(bytes);
        owned.resize(target, 0);
        Cow::Owned(owned)
    }
}

#[derive(Debug, Clone)]
pub struct GpuBuffer {
    pub id: u64,
    pub buffer: wgpu::Buffer,
    pub size: u64,
    pub usage: wgpu::BufferUsages,
    pub label: String,
}

impl GpuBuffer {
    /// An uninitialized buffer of at least `size` bytes.
    pub fn new(device: &wgpu::Device, size: u64, usage: wgpu::BufferUsages, label: &str) -> Self {
        let size = align_copy_size(size);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        });
        Self {
            id: generate_buffer_id(),
            buffer,
            size,
            usage,
            label: label.to_string(),
        }
    }

    /// An exactly-sized buffer holding `data` (padded to the copy alignment).
    pub fn new_init(
        device: &wgpu::Device,
        data: &[u8],
        usage: wgpu::BufferUsages,
        label: &str,
    ) -> Self {
        let contents = padded(data, wgpu::COPY_BUFFER_ALIGNMENT as usize);
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: &contents,
            usage,
        });
        Self {
            id: generate_buffer_id(),
            buffer,
            size: contents.len() as u64,
            usage,
            label: label.to_string(),
        }
    }

    /// Queues a write of `data` at `offset`, zero-padding the tail to 4 bytes.
    pub fn write(&self, queue: &wgpu::Queue, offset: u64, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let data = padded(data, wgpu::COPY_BUFFER_ALIGNMENT as usize);
        debug_assert!(offset + data.len() as u64 <= self.size);
        queue.write_buffer(&self.buffer, offset, &data);
    }

    /// Replaces the buffer with a larger one if it holds fewer than
    /// `min_size` bytes. Contents are not preserved. Returns `true` if it grew.
    pub fn ensure_capacity(&mut self, device: &wgpu::Device, min_size: u64) -> bool {
        if min_size <= self.size {
            return false;
        }
        log::debug!("Resizing buffer {:?} from {} to {}", self.label, self.size, min_size);
        self.replace(device, min_size);
        true
    }

    /// Replaces the buffer with one of `new_size` bytes and records a GPU copy
    /// of the old contents into it. Needs `COPY_SRC | COPY_DST` usage.
    pub fn grow_preserving(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        new_size: u64,
    ) {
        let old = self.buffer.clone();
        let old_size = self.size;
        self.replace(device, new_size);
        encoder.copy_buffer_to_buffer(&old, 0, &self.buffer, 0, old_size);
    }

    #[inline]
    #[must_use]
    pub fn slice(&self, offset: u64, size: u64) -> wgpu::BufferSlice<'_> {
        self.buffer.slice(offset..offset + size)
    }

    pub fn destroy(&self) {
        self.buffer.destroy();
    }

    fn replace(&mut self, device: &wgpu::Device, new_size: u64) {
        let size = align_copy_size(new_size);
        self.buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&self.label),
            size,
            usage: self.usage,
            mapped_at_creation: false,
        });
        self.size = size;
        self.id = generate_buffer_id();
    }
}

impl PoolItem for GpuBuffer {
    fn capacity(&self) -> u64 {
        self.size
    }

    fn shadow(&self) -> Option<Self> {
        Some(self.clone())
    }

    fn destroy(self) {
        self.buffer.destroy();
    }
}
