//! Multi-Draw Builder
//!
//! Packs many sub-meshes that share one [`DrawBatch`] into a single vertex
//! buffer and a single index buffer so that every visible sub-mesh is drawn
//! with one indirect multi-draw call.
//!
//! ```text
//!  vertex arena:  [ A verts | B verts | ..free.. | C verts | ........ ]
//!  index arena:   [ A idx | B idx | C idx | ...... ]
//!
//!  render list:   [ C, A ]  ──rebuild_command_buffer()──►  [ C cmds | A cmds ]
//! ```
//!
//! Byte ranges come from two [`ArenaAllocator`]s over a virtual range of
//! `max_capacity` bytes; the GPU buffers behind them grow lazily and never
//! shrink. The command buffer is not rebuilt automatically: call
//! [`MultiDrawBuilder::rebuild_command_buffer`] after any change to the render
//! list or to uploaded data, before the next [`MultiDrawBuilder::draw`].

use rustc_hash::FxHashSet;
use slotmap::{SlotMap, new_key_type};

use super::command::{DrawCommand, encode_indirect};
use super::descriptor::{DrawBatch, IndexFormat};
use super::prepare::IndexSource;
use super::upload::UploadedDrawBatchData;
use crate::context::{RenderContext, RenderThread};
use crate::errors::{ContractViolation, Error, Result};
use crate::gpu::buffer::GpuBuffer;
use crate::gpu::vertex_array::{IndexBinding, VertexArray, VertexBinding};
use crate::memory::arena::{ArenaAllocator, ArenaExtent};
use crate::settings::ArenaSettings;

new_key_type! {
    /// Handle of a sub-mesh uploaded into a [`MultiDrawBuilder`].
    pub struct SubMeshId;
}

/// How the packed sub-meshes are indexed. Fixed by the first upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    None,
    Stream(IndexFormat),
    SharedQuads,
}

impl IndexMode {
    fn of(source: IndexSource) -> Self {
        match source {
            IndexSource::None => Self::None,
            IndexSource::Stream(format) => Self::Stream(format),
            IndexSource::SharedQuads { .. } => Self::SharedQuads,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_indexed(self) -> bool {
        !matches!(self, Self::None)
    }
}

// ============================================================================
// Command table
// ============================================================================

/// Arena placement and rebased commands of one sub-mesh.
#[derive(Debug, Clone)]
pub struct SubMeshRecord {
    pub vertex: ArenaExtent,
    pub index: Option<ArenaExtent>,
    pub commands: Vec<DrawCommand>,
}

/// Uploaded sub-meshes plus the ordered set of those currently drawn.
///
/// Pure bookkeeping; it never touches the GPU.
#[derive(Debug, Default)]
pub struct CommandTable {
    records: SlotMap<SubMeshId, SubMeshRecord>,
    render_list: Vec<SubMeshId>,
    in_render_list: FxHashSet<SubMeshId>,
}

impl CommandTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: SubMeshRecord) -> SubMeshId {
        self.records.insert(record)
    }

    /// Drops `id` from the render list and the table.
    pub fn remove(&mut self, id: SubMeshId) -> Option<SubMeshRecord> {
        self.remove_from_render_list(id);
        self.records.remove(id)
    }

    #[must_use]
    pub fn get(&self, id: SubMeshId) -> Option<&SubMeshRecord> {
        self.records.get(id)
    }

    /// Appends `id` to the render list. Returns `false` if it is already
    /// listed or was never inserted.
    pub fn add_to_render_list(&mut self, id: SubMeshId) -> bool {
        if !self.records.contains_key(id) || !self.in_render_list.insert(id) {
            return false;
        }
        self.render_list.push(id);
        true
    }

    /// Returns `false` if `id` was not listed.
    pub fn remove_from_render_list(&mut self, id: SubMeshId) -> bool {
        if !self.in_render_list.remove(&id) {
            return false;
        }
        self.render_list.retain(|&listed| listed != id);
        true
    }

    pub fn clear_render_list(&mut self) {
        self.render_list.clear();
        self.in_render_list.clear();
    }

    /// Commands of every listed sub-mesh, in render-list order.
    #[must_use]
    pub fn render_commands(&self) -> Vec<DrawCommand> {
        self.render_list
            .iter()
            .filter_map(|&id| self.records.get(id))
            .flat_map(|record| record.commands.iter().copied())
            .collect()
    }

    #[must_use]
    pub fn render_list(&self) -> &[SubMeshId] {
        &self.render_list
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, id: SubMeshId) -> bool {
        self.records.contains_key(id)
    }

    #[inline]
    #[must_use]
    pub fn is_in_render_list(&self, id: SubMeshId) -> bool {
        self.in_render_list.contains(&id)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn render_list_len(&self) -> usize {
        self.render_list.len()
    }
}

// ============================================================================
// Builder
// ============================================================================

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Least common multiple of `stride` and the copy alignment.
fn vertex_alignment(stride: u64) -> u64 {
    let stride = stride.max(1);
    let align = wgpu::COPY_BUFFER_ALIGNMENT;
    stride / gcd(stride, align) * align
}

pub struct MultiDrawBuilder {
    device: wgpu::Device,
    queue: wgpu::Queue,
    thread: RenderThread,
    settings: ArenaSettings,
    batch: DrawBatch,

    vertex_arena: ArenaAllocator,
    index_arena: ArenaAllocator,
    vertex_buffer: Option<GpuBuffer>,
    index_buffer: Option<GpuBuffer>,
    vertex_array: VertexArray,
    index_mode: Option<IndexMode>,

    table: CommandTable,
    command_buffer: Option<GpuBuffer>,
    command_count: u32,
    indexed_commands: bool,
}

impl MultiDrawBuilder {
    /// A builder for sub-meshes of `batch`. Batches with per-instance data
    /// cannot be packed.
    pub fn new(ctx: &RenderContext, batch: DrawBatch) -> Result<Self> {
        ctx.assert_render_thread();
        if batch.instance_layout().is_some() {
            return Err(ContractViolation::NotPackable("batch declares per-instance attributes").into());
        }
        let settings = ctx.settings().arena;
        let mut layouts = batch.buffer_layouts()?;
        layouts.truncate(1);

        Ok(Self {
            device: ctx.device().clone(),
            queue: ctx.queue().clone(),
            thread: ctx.render_thread(),
            vertex_arena: ArenaAllocator::new(settings.max_capacity),
            index_arena: ArenaAllocator::new(settings.max_capacity),
            settings,
            batch,
            vertex_buffer: None,
            index_buffer: None,
            vertex_array: VertexArray::new(layouts),
            index_mode: None,
            table: CommandTable::new(),
            command_buffer: None,
            command_count: 0,
            indexed_commands: false,
        })
    }

    // ─── Upload / remove ──────────────────────────────────────────────────

    /// Copies the sub-mesh in `data` into the packed buffers and stores its
    /// rebased commands. The sub-mesh is not drawn until it is added to the
    /// render list.
    ///
    /// `data` stays owned by the caller and may be released once this
    /// returns.
    pub fn upload_buffer(&mut self, data: &UploadedDrawBatchData) -> Result<SubMeshId> {
        self.thread.assert_current();
        self.check_admissible(data)?;

        let mode = IndexMode::of(data.index_source());
        if self.index_mode.is_some_and(|current| current != mode) {
            return Err(ContractViolation::IndexModeMismatch.into());
        }
        let Some(source_vertices) = data.vertex_array().vertex_binding(0).cloned() else {
            return Err(ContractViolation::NotPackable("no vertex buffer bound").into());
        };
        let source_indices = data.vertex_array().index_binding().cloned();
        if mode.is_indexed() && source_indices.is_none() {
            return Err(ContractViolation::NotPackable("indexed data without an index buffer").into());
        }

        // Reserve both ranges before recording any GPU work.
        let stride = u64::from(self.batch.vertex_stride()).max(1);
        let vertex_size = source_vertices.size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let vertex = allocate(&mut self.vertex_arena, vertex_size, vertex_alignment(stride))?;
        let index = match (mode, &source_indices) {
            (IndexMode::Stream(_), Some(source)) => {
                let size = source.size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
                match allocate(&mut self.index_arena, size, wgpu::COPY_BUFFER_ALIGNMENT) {
                    Ok(extent) => Some(extent),
                    Err(err) => {
                        self.vertex_arena.free(vertex.offset);
                        return Err(err);
                    }
                }
            }
            _ => None,
        };

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("MultiDraw Upload"),
        });

        let grown = grow_arena_buffer(
            &self.device,
            &mut encoder,
            &mut self.vertex_buffer,
            vertex.end(),
            &self.settings,
            wgpu::BufferUsages::VERTEX,
            "MultiDraw Vertices",
        );
        if let Some(buffer) = &self.vertex_buffer {
            encoder.copy_buffer_to_buffer(
                &source_vertices.buffer,
                source_vertices.offset,
                &buffer.buffer,
                vertex.offset,
                vertex_size,
            );
            if grown {
                self.vertex_array
                    .bind_vertex_buffer(0, VertexBinding::new(buffer.buffer.clone(), 0, buffer.size));
            }
        }

        let mut index_base = 0;
        match (mode, index, source_indices) {
            (IndexMode::Stream(format), Some(extent), Some(source)) => {
                let grown = grow_arena_buffer(
                    &self.device,
                    &mut encoder,
                    &mut self.index_buffer,
                    extent.end(),
                    &self.settings,
                    wgpu::BufferUsages::INDEX,
                    "MultiDraw Indices",
                );
                if let Some(buffer) = &self.index_buffer {
                    encoder.copy_buffer_to_buffer(
                        &source.buffer,
                        source.offset,
                        &buffer.buffer,
                        extent.offset,
                        extent.size,
                    );
                    if grown {
                        self.vertex_array.bind_index_buffer(IndexBinding {
                            buffer: buffer.buffer.clone(),
                            offset: 0,
                            size: buffer.size,
                            format: format.to_wgpu(),
                        });
                    }
                }
                index_base = (extent.offset / format.size() as u64) as u32;
            }
            (IndexMode::SharedQuads, _, Some(source)) => {
                // Quad buffer generations share their prefix, so the largest
                // one seen, bound whole, covers every packed sub-mesh.
                let full = source.buffer.size();
                if self.vertex_array.index_binding().is_none_or(|bound| bound.size < full) {
                    self.vertex_array.bind_index_buffer(IndexBinding {
                        buffer: source.buffer,
                        offset: 0,
                        size: full,
                        format: wgpu::IndexFormat::Uint32,
                    });
                }
            }
            _ => {}
        }

        self.queue.submit(Some(encoder.finish()));
        self.index_mode = Some(mode);

        let vertex_base = (vertex.offset / stride) as u32;
        let commands = data
            .commands()
            .iter()
            .map(|command| command.rebased(vertex_base, index_base))
            .collect();
        let id = self.table.insert(SubMeshRecord {
            vertex,
            index,
            commands,
        });
        log::trace!(
            "Sub-mesh {id:?} packed at vertex {vertex_base}, index {index_base} ({} bytes)",
            vertex.size
        );
        Ok(id)
    }

    /// Frees the arena extents of `id` and drops its commands. Returns
    /// `false` for an unknown id.
    pub fn remove_buffer(&mut self, id: SubMeshId) -> bool {
        self.thread.assert_current();
        let Some(record) = self.table.remove(id) else {
            return false;
        };
        self.vertex_arena.free(record.vertex.offset);
        if let Some(index) = record.index {
            self.index_arena.free(index.offset);
        }
        true
    }

    fn check_admissible(&self, data: &UploadedDrawBatchData) -> Result<()> {
        let reject = |reason| Err(Error::Contract(ContractViolation::NotPackable(reason)));
        if data.batch() != &self.batch {
            return reject("data belongs to a different batch");
        }
        if data.vertex_array().bound_vertex_buffers() != 1 {
            return reject("exactly one vertex buffer binding is required");
        }
        if data.batch().instance_layout().is_some() {
            return reject("per-instance data cannot be packed");
        }
        if data.has_blocks() {
            return reject("uniform and storage blocks cannot be packed");
        }
        if data
            .commands()
            .iter()
            .any(|command| command.instance_count() != 1 || command.base_instance() != 0)
        {
            return reject("commands must draw one instance at base instance 0");
        }
        Ok(())
    }

    // ─── Render list ──────────────────────────────────────────────────────

    pub fn add_to_render_list(&mut self, id: SubMeshId) -> bool {
        self.thread.assert_current();
        self.table.add_to_render_list(id)
    }

    pub fn remove_from_render_list(&mut self, id: SubMeshId) -> bool {
        self.thread.assert_current();
        self.table.remove_from_render_list(id)
    }

    pub fn clear_render_list(&mut self) {
        self.thread.assert_current();
        self.table.clear_render_list();
    }

    /// Re-encodes the commands of the render list into the indirect buffer.
    pub fn rebuild_command_buffer(&mut self) -> Result<()> {
        self.thread.assert_current();
        let commands = self.table.render_commands();
        self.command_count = commands.len() as u32;
        if commands.is_empty() {
            return Ok(());
        }

        let (bytes, indexed) = encode_indirect(&commands)?;
        self.indexed_commands = indexed;
        match &mut self.command_buffer {
            Some(buffer) => {
                buffer.ensure_capacity(&self.device, bytes.len() as u64);
            }
            None => {
                self.command_buffer = Some(GpuBuffer::new(
                    &self.device,
                    bytes.len() as u64,
                    wgpu::BufferUsages::INDIRECT | wgpu::BufferUsages::COPY_DST,
                    "MultiDraw Commands",
                ));
            }
        }
        if let Some(buffer) = &self.command_buffer {
            buffer.write(&self.queue, 0, &bytes);
        }
        Ok(())
    }

    /// Draws every sub-mesh of the last rebuilt command buffer.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        let Some(commands) = self.command_buffer.as_ref().filter(|_| self.command_count > 0) else {
            return;
        };
        self.batch.run_setup(pass);
        self.vertex_array.bind(pass);
        if self.indexed_commands {
            pass.multi_draw_indexed_indirect(&commands.buffer, 0, self.command_count);
        } else {
            pass.multi_draw_indirect(&commands.buffer, 0, self.command_count);
        }
        self.batch.run_cleanup(pass);
    }

    // ─── Queries ──────────────────────────────────────────────────────────

    #[must_use]
    pub fn batch(&self) -> &DrawBatch {
        &self.batch
    }

    #[must_use]
    pub fn index_mode(&self) -> Option<IndexMode> {
        self.index_mode
    }

    /// The packed buffers as bound for drawing.
    #[must_use]
    pub fn vertex_array(&self) -> &VertexArray {
        &self.vertex_array
    }

    #[must_use]
    pub fn command_table(&self) -> &CommandTable {
        &self.table
    }

    #[must_use]
    pub fn command_count(&self) -> u32 {
        self.command_count
    }

    #[must_use]
    pub fn contains(&self, id: SubMeshId) -> bool {
        self.table.contains(id)
    }

    #[must_use]
    pub fn is_in_render_list(&self, id: SubMeshId) -> bool {
        self.table.is_in_render_list(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    #[must_use]
    pub fn render_list_len(&self) -> usize {
        self.table.render_list_len()
    }

    /// Bytes of the vertex GPU buffer (zero before the first upload).
    #[must_use]
    pub fn vertex_capacity(&self) -> u64 {
        self.vertex_buffer.as_ref().map_or(0, |b| b.size)
    }

    #[must_use]
    pub fn index_capacity(&self) -> u64 {
        self.index_buffer.as_ref().map_or(0, |b| b.size)
    }
}

impl Drop for MultiDrawBuilder {
    fn drop(&mut self) {
        for buffer in [&self.vertex_buffer, &self.index_buffer, &self.command_buffer]
            .into_iter()
            .flatten()
        {
            buffer.destroy();
        }
    }
}

fn allocate(arena: &mut ArenaAllocator, size: u64, align: u64) -> Result<ArenaExtent> {
    arena.alloc_aligned(size, align).ok_or(Error::ArenaExhausted {
        requested: size,
        max_capacity: arena.max_capacity(),
    })
}

/// Makes `slot` hold at least `required_end` bytes, preserving contents.
/// Returns `true` if the buffer was created or replaced.
fn grow_arena_buffer(
    device: &wgpu::Device,
    encoder: &mut wgpu::CommandEncoder,
    slot: &mut Option<GpuBuffer>,
    required_end: u64,
    settings: &ArenaSettings,
    usage: wgpu::BufferUsages,
    label: &str,
) -> bool {
    let capacity = slot.as_ref().map_or(0, |b| b.size);
    if required_end <= capacity {
        return false;
    }
    let new_size = required_end
        .max(capacity + settings.min_growth)
        .min(settings.max_capacity);
    log::info!("{label} arena buffer grown: {capacity} -> {new_size} bytes");

    match slot {
        Some(buffer) => buffer.grow_preserving(device, encoder, new_size),
        None => {
            *slot = Some(GpuBuffer::new(
                device,
                new_size,
                usage | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
                label,
            ));
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_alignment_is_lcm_with_four() {
        assert_eq!(vertex_alignment(12), 12);
        assert_eq!(vertex_alignment(20), 20);
        assert_eq!(vertex_alignment(6), 12);
        assert_eq!(vertex_alignment(3), 12);
        assert_eq!(vertex_alignment(0), 4);
    }

    #[test]
    fn removed_sub_mesh_leaves_render_list() {
        let mut table = CommandTable::new();
        let record = SubMeshRecord {
            vertex: ArenaExtent { offset: 0, size: 48 },
            index: None,
            commands: vec![DrawCommand::arrays(0, 4)],
        };
        let id = table.insert(record);
        assert!(table.add_to_render_list(id));
        assert!(!table.add_to_render_list(id));

        assert!(table.remove(id).is_some());
        assert!(!table.is_in_render_list(id));
        assert!(table.render_commands().is_empty());
        assert!(!table.add_to_render_list(id));
    }
}
