//! Draw Batch Data Uploader
//!
//! Moves prepared CPU data to the GPU under one of two residency policies:
//!
//! | | Temporary | Persistent |
//! |---|---|---|
//! | vertices | appended to the layout's shared vertex buffer | dedicated, exact |
//! | instances / indices / blocks / commands | borrowed from the buffer pools | dedicated, exact |
//! | quad indices | shared quad buffer | shared quad buffer |
//! | lifetime | until [`RenderContext::release`] after submit | until dropped |
//!
//! An indirect command buffer is only created for batches with more than one
//! draw command; single-command batches draw directly.

use std::time::Instant;

use rustc_hash::FxHashMap;

use super::command::{DrawCommand, encode_indirect};
use super::descriptor::DrawBatch;
use super::prepare::{IndexSource, PreparedDrawBatchData};
use crate::context::RenderContext;
use crate::errors::Result;
use crate::gpu::buffer::{GpuBuffer, padded};
use crate::gpu::vertex_array::{IndexBinding, VertexArray, VertexBinding};
use crate::pool::gpu_buffer::{BufferClass, PooledBuffer};

/// Uniform bindings are sized in whole 16-byte rows.
const UNIFORM_ROW: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Residency {
    Temporary,
    Persistent,
}

/// A uniform or storage block on the GPU.
#[derive(Debug, Clone)]
pub struct BlockBuffer {
    pub buffer: wgpu::Buffer,
    pub size: u64,
}

impl BlockBuffer {
    /// The block as a bind group resource.
    #[must_use]
    pub fn binding(&self) -> wgpu::BindingResource<'_> {
        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer: &self.buffer,
            offset: 0,
            size: wgpu::BufferSize::new(self.size),
        })
    }
}

/// The indirect command buffer of a multi-command batch.
#[derive(Debug, Clone)]
pub struct IndirectCommands {
    pub buffer: wgpu::Buffer,
    pub indexed: bool,
    pub count: u32,
}

impl IndirectCommands {
    pub(crate) fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        if self.indexed {
            pass.multi_draw_indexed_indirect(&self.buffer, 0, self.count);
        } else {
            pass.multi_draw_indirect(&self.buffer, 0, self.count);
        }
    }
}

/// GPU-resident batch data, ready to draw.
#[derive(Debug)]
pub struct UploadedDrawBatchData {
    batch: DrawBatch,
    residency: Residency,
    vertex_array: VertexArray,
    uniforms: FxHashMap<String, BlockBuffer>,
    storage: FxHashMap<String, BlockBuffer>,
    indirect: Option<IndirectCommands>,
    commands: Vec<DrawCommand>,
    index_source: IndexSource,
    vertex_count: u32,
    /// Temporary residency: buffers on loan from the pools.
    leases: Vec<PooledBuffer>,
    /// Persistent residency: buffers owned outright.
    owned: Vec<GpuBuffer>,
}

impl UploadedDrawBatchData {
    #[inline]
    #[must_use]
    pub fn batch(&self) -> &DrawBatch {
        &self.batch
    }

    #[inline]
    #[must_use]
    pub fn residency(&self) -> Residency {
        self.residency
    }

    #[inline]
    #[must_use]
    pub fn vertex_array(&self) -> &VertexArray {
        &self.vertex_array
    }

    #[inline]
    #[must_use]
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    #[inline]
    #[must_use]
    pub fn index_source(&self) -> IndexSource {
        self.index_source
    }

    #[inline]
    #[must_use]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    #[must_use]
    pub fn uniform_buffer(&self, name: &str) -> Option<&BlockBuffer> {
        self.uniforms.get(name)
    }

    #[must_use]
    pub fn storage_buffer(&self, name: &str) -> Option<&BlockBuffer> {
        self.storage.get(name)
    }

    #[must_use]
    pub fn has_blocks(&self) -> bool {
        !self.uniforms.is_empty() || !self.storage.is_empty()
    }

    #[must_use]
    pub fn indirect_commands(&self) -> Option<&IndirectCommands> {
        self.indirect.as_ref()
    }

    /// Runs the setup hook, binds the vertex array, draws, then runs the
    /// cleanup hook. Bind groups for the blocks are the caller's business.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        self.batch.run_setup(pass);
        self.vertex_array.bind(pass);
        match &self.indirect {
            Some(indirect) => indirect.draw(pass),
            None => {
                for command in &self.commands {
                    command.draw(pass);
                }
            }
        }
        self.batch.run_cleanup(pass);
    }
}

impl RenderContext {
    /// Uploads `prepared` for use in the current frame only.
    pub fn upload_temporary(&mut self, prepared: PreparedDrawBatchData) -> Result<UploadedDrawBatchData> {
        self.assert_render_thread();
        let now = Instant::now();
        let batch = prepared.batch().clone();
        let mut vertex_array = VertexArray::new(batch.buffer_layouts()?);
        let mut leases = Vec::new();

        let vertices = self.vertex_arrays.append(
            &self.queue,
            batch.vertex_layout(),
            prepared.vertex_bytes(),
            now,
        )?;
        vertex_array.bind_vertex_buffer(0, vertices);

        if let Some(bytes) = prepared.instance_bytes() {
            let pooled = self.lend_buffer(BufferClass::Vertex, bytes);
            vertex_array.bind_vertex_buffer(
                1,
                VertexBinding::new(pooled.buffer.buffer.clone(), 0, bytes.len() as u64),
            );
            leases.push(pooled);
        }

        match prepared.index_source() {
            IndexSource::None => {}
            IndexSource::Stream(format) => {
                let bytes = prepared.index_bytes().unwrap_or_default();
                let pooled = self.lend_buffer(BufferClass::Index, bytes);
                vertex_array.bind_index_buffer(IndexBinding {
                    buffer: pooled.buffer.buffer.clone(),
                    offset: 0,
                    size: bytes.len() as u64,
                    format: format.to_wgpu(),
                });
                leases.push(pooled);
            }
            IndexSource::SharedQuads { index_count } => {
                vertex_array.bind_index_buffer(self.shared_quad_binding(index_count));
            }
        }

        let mut uniforms = FxHashMap::default();
        for (name, bytes) in prepared.uniform_blocks().filter(|(_, b)| !b.is_empty()) {
            let bytes = padded(bytes, UNIFORM_ROW);
            let pooled = self.lend_buffer(BufferClass::Uniform, &bytes);
            uniforms.insert(name.to_owned(), BlockBuffer {
                buffer: pooled.buffer.buffer.clone(),
                size: bytes.len() as u64,
            });
            leases.push(pooled);
        }

        let mut storage = FxHashMap::default();
        for (name, bytes) in prepared.storage_blocks().filter(|(_, b)| !b.is_empty()) {
            let pooled = self.lend_buffer(BufferClass::Storage, bytes);
            storage.insert(name.to_owned(), BlockBuffer {
                buffer: pooled.buffer.buffer.clone(),
                size: padded(bytes, 4).len() as u64,
            });
            leases.push(pooled);
        }

        let commands = prepared.commands().to_vec();
        let indirect = if commands.len() > 1 {
            let (bytes, indexed) = encode_indirect(&commands)?;
            let pooled = self.lend_buffer(BufferClass::Indirect, &bytes);
            let indirect = IndirectCommands {
                buffer: pooled.buffer.buffer.clone(),
                indexed,
                count: commands.len() as u32,
            };
            leases.push(pooled);
            Some(indirect)
        } else {
            None
        };

        self.stats.temporary_uploads += 1;
        self.stats.uploaded_bytes += prepared.total_bytes() as u64;

        Ok(UploadedDrawBatchData {
            batch,
            residency: Residency::Temporary,
            vertex_array,
            uniforms,
            storage,
            indirect,
            commands,
            index_source: prepared.index_source(),
            vertex_count: prepared.vertex_count(),
            leases,
            owned: Vec::new(),
        })
    }

    /// Uploads `prepared` into dedicated, exactly-sized buffers.
    pub fn upload_persistent(&mut self, prepared: PreparedDrawBatchData) -> Result<UploadedDrawBatchData> {
        use wgpu::BufferUsages as U;

        self.assert_render_thread();
        let batch = prepared.batch().clone();
        let label = batch.label().unwrap_or("Batch").to_string();
        let mut vertex_array = VertexArray::new(batch.buffer_layouts()?);
        let mut owned = Vec::new();

        let vertices = GpuBuffer::new_init(
            &self.device,
            prepared.vertex_bytes(),
            U::VERTEX | U::COPY_SRC,
            &format!("{label} Vertices"),
        );
        vertex_array.bind_vertex_buffer(
            0,
            VertexBinding::new(vertices.buffer.clone(), 0, prepared.vertex_bytes().len() as u64),
        );
        owned.push(vertices);

        if let Some(bytes) = prepared.instance_bytes() {
            let instances = GpuBuffer::new_init(
                &self.device,
                bytes,
                U::VERTEX | U::COPY_SRC,
                &format!("{label} Instances"),
            );
            vertex_array.bind_vertex_buffer(
                1,
                VertexBinding::new(instances.buffer.clone(), 0, bytes.len() as u64),
            );
            owned.push(instances);
        }

        match prepared.index_source() {
            IndexSource::None => {}
            IndexSource::Stream(format) => {
                let bytes = prepared.index_bytes().unwrap_or_default();
                let indices = GpuBuffer::new_init(
                    &self.device,
                    bytes,
                    U::INDEX | U::COPY_SRC,
                    &format!("{label} Indices"),
                );
                vertex_array.bind_index_buffer(IndexBinding {
                    buffer: indices.buffer.clone(),
                    offset: 0,
                    size: bytes.len() as u64,
                    format: format.to_wgpu(),
                });
                owned.push(indices);
            }
            IndexSource::SharedQuads { index_count } => {
                vertex_array.bind_index_buffer(self.shared_quad_binding(index_count));
            }
        }

        let mut uniforms = FxHashMap::default();
        for (name, bytes) in prepared.uniform_blocks().filter(|(_, b)| !b.is_empty()) {
            let bytes = padded(bytes, UNIFORM_ROW);
            let buffer = GpuBuffer::new_init(
                &self.device,
                &bytes,
                U::UNIFORM | U::COPY_DST,
                &format!("{label} Uniform {name}"),
            );
            uniforms.insert(name.to_owned(), BlockBuffer {
                buffer: buffer.buffer.clone(),
                size: buffer.size,
            });
            owned.push(buffer);
        }

        let mut storage = FxHashMap::default();
        for (name, bytes) in prepared.storage_blocks().filter(|(_, b)| !b.is_empty()) {
            let buffer = GpuBuffer::new_init(
                &self.device,
                bytes,
                U::STORAGE | U::COPY_DST | U::COPY_SRC,
                &format!("{label} Storage {name}"),
            );
            storage.insert(name.to_owned(), BlockBuffer {
                buffer: buffer.buffer.clone(),
                size: buffer.size,
            });
            owned.push(buffer);
        }

        let commands = prepared.commands().to_vec();
        let indirect = if commands.len() > 1 {
            let (bytes, indexed) = encode_indirect(&commands)?;
            let buffer = GpuBuffer::new_init(
                &self.device,
                &bytes,
                U::INDIRECT,
                &format!("{label} Commands"),
            );
            let indirect = IndirectCommands {
                buffer: buffer.buffer.clone(),
                indexed,
                count: commands.len() as u32,
            };
            owned.push(buffer);
            Some(indirect)
        } else {
            None
        };

        self.stats.persistent_uploads += 1;
        self.stats.uploaded_bytes += prepared.total_bytes() as u64;

        Ok(UploadedDrawBatchData {
            batch,
            residency: Residency::Persistent,
            vertex_array,
            uniforms,
            storage,
            indirect,
            commands,
            index_source: prepared.index_source(),
            vertex_count: prepared.vertex_count(),
            leases: Vec::new(),
            owned,
        })
    }

    /// Hands uploaded data back. Temporary buffers return to their pools;
    /// persistent buffers are destroyed. Call only after the command buffers
    /// that draw `data` have been submitted.
    pub fn release(&mut self, data: UploadedDrawBatchData) {
        self.assert_render_thread();
        let now = Instant::now();
        for pooled in data.leases {
            self.buffers.release(pooled, now);
        }
        for buffer in data.owned {
            buffer.destroy();
        }
    }

    fn shared_quad_binding(&mut self, index_count: u32) -> IndexBinding {
        IndexBinding {
            buffer: self.quads.gpu_buffer(&self.device),
            offset: 0,
            size: u64::from(index_count) * 4,
            format: wgpu::IndexFormat::Uint32,
        }
    }
}
