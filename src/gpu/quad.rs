//! Shared Quad Index Buffer
//!
//! One growable `u32` index list of the form `{0,1,2,2,3,0, 4,5,6,6,7,4, ...}`
//! reused by every quad batch that writes no indices of its own. The CPU copy
//! grows during preparation; the GPU mirror is rebuilt lazily on the next
//! upload that needs it.
//!
//! A superseded GPU buffer is never destroyed here. Batches uploaded before
//! the growth still hold a clone of it and keep drawing from it; it is freed
//! when the last clone drops. Every generation starts with the same indices,
//! so a newer buffer can stand in for an older one.

use wgpu::util::DeviceExt;

use crate::context::Teardown;
use crate::writer::QUAD_INDICES;

pub struct QuadIndexBuffer {
    indices: Vec<u32>,
    gpu: Option<wgpu::Buffer>,
    gpu_quads: u32,
}

impl QuadIndexBuffer {
    #[must_use]
    pub fn new(initial_quads: u32) -> Self {
        let mut buffer = Self {
            indices: Vec::new(),
            gpu: None,
            gpu_quads: 0,
        };
        buffer.fill_to(initial_quads.max(1));
        buffer
    }

    /// Number of quads the index list covers.
    #[inline]
    #[must_use]
    pub fn quad_capacity(&self) -> u32 {
        (self.indices.len() / 6) as u32
    }

    #[inline]
    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Grows the list (at least doubling) until it covers `quads` quads.
    /// Returns `true` if it grew.
    pub fn ensure_quads(&mut self, quads: u32) -> bool {
        let capacity = self.quad_capacity();
        if quads <= capacity {
            return false;
        }
        let target = quads.max(capacity.saturating_mul(2));
        log::info!("Quad index buffer grown: {capacity} -> {target} quads");
        self.fill_to(target);
        true
    }

    /// The GPU copy, recreated if the CPU list has grown since it was built.
    /// The previous copy is released, not destroyed.
    pub fn gpu_buffer(&mut self, device: &wgpu::Device) -> wgpu::Buffer {
        let quads = self.quad_capacity();
        match &self.gpu {
            Some(buffer) if self.gpu_quads == quads => buffer.clone(),
            _ => {
                let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Shared Quad Indices"),
                    contents: bytemuck::cast_slice(&self.indices),
                    usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_SRC,
                });
                self.gpu = Some(buffer.clone());
                self.gpu_quads = quads;
                buffer
            }
        }
    }

    fn fill_to(&mut self, quads: u32) {
        let start = self.quad_capacity();
        self.indices.reserve((quads - start) as usize * 6);
        for quad in start..quads {
            let base = quad * 4;
            self.indices.extend(QUAD_INDICES.iter().map(|i| base + i));
        }
    }
}

impl Teardown for QuadIndexBuffer {
    fn teardown(&mut self) {
        if let Some(buffer) = self.gpu.take() {
            buffer.destroy();
        }
        self.gpu_quads = 0;
    }
}
