//! Vertex Arrays
//!
//! The wgpu counterpart of a vertex-array object: the vertex buffer layouts a
//! batch is drawn with, plus the buffer ranges currently bound to each slot
//! and the index buffer range. Binding happens on a render pass.

use smallvec::SmallVec;

use crate::batch::descriptor::OwnedVertexBufferLayout;

/// A byte range of a vertex buffer bound to one slot.
#[derive(Debug, Clone)]
pub struct VertexBinding {
    pub buffer: wgpu::Buffer,
    pub offset: u64,
    pub size: u64,
}

impl VertexBinding {
    #[must_use]
    pub fn new(buffer: wgpu::Buffer, offset: u64, size: u64) -> Self {
        Self {
            buffer,
            offset,
            size,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexBinding {
    pub buffer: wgpu::Buffer,
    pub offset: u64,
    pub size: u64,
    pub format: wgpu::IndexFormat,
}

#[derive(Debug, Clone)]
pub struct VertexArray {
    layouts: Vec<OwnedVertexBufferLayout>,
    slots: SmallVec<[Option<VertexBinding>; 2]>,
    index: Option<IndexBinding>,
}

impl VertexArray {
    #[must_use]
    pub fn new(layouts: Vec<OwnedVertexBufferLayout>) -> Self {
        let slots = layouts.iter().map(|_| None).collect();
        Self {
            layouts,
            slots,
            index: None,
        }
    }

    /// Layouts for pipeline creation, one per slot.
    #[must_use]
    pub fn buffer_layouts(&self) -> Vec<wgpu::VertexBufferLayout<'_>> {
        self.layouts.iter().map(OwnedVertexBufferLayout::as_wgpu).collect()
    }

    #[inline]
    #[must_use]
    pub fn layouts(&self) -> &[OwnedVertexBufferLayout] {
        &self.layouts
    }

    /// # Panics
    ///
    /// Panics if `slot` has no layout.
    pub fn bind_vertex_buffer(&mut self, slot: usize, binding: VertexBinding) {
        assert!(
            slot < self.slots.len(),
            "vertex slot {slot} out of range ({} layouts)",
            self.slots.len()
        );
        self.slots[slot] = Some(binding);
    }

    pub fn bind_index_buffer(&mut self, binding: IndexBinding) {
        self.index = Some(binding);
    }

    #[must_use]
    pub fn vertex_binding(&self, slot: usize) -> Option<&VertexBinding> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    #[must_use]
    pub fn index_binding(&self) -> Option<&IndexBinding> {
        self.index.as_ref()
    }

    /// Number of slots with a buffer bound.
    #[must_use]
    pub fn bound_vertex_buffers(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Sets every bound range on `pass`.
    pub fn bind(&self, pass: &mut wgpu::RenderPass<'_>) {
        for (slot, binding) in self.slots.iter().enumerate() {
            if let Some(b) = binding {
                pass.set_vertex_buffer(slot as u32, b.buffer.slice(b.offset..b.offset + b.size));
            }
        }
        if let Some(index) = &self.index {
            pass.set_index_buffer(
                index.buffer.slice(index.offset..index.offset + index.size),
                index.format,
            );
        }
    }
}
